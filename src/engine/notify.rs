// src/engine/notify.rs

//! Notification events and the sink interface they are delivered through.
//!
//! Delivery (email, webhook, ...) is the sink's business. The runtime only
//! calls [`NotificationSink::notify`] for every event its [`NotifyPolicy`]
//! lets through.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::TaskId;

/// Something observable happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    TaskStarted {
        run_id: u64,
        task: TaskId,
        attempt: u32,
    },
    TaskSucceeded {
        run_id: u64,
        task: TaskId,
    },
    TaskFailed {
        run_id: u64,
        task: TaskId,
        /// True when the task never ran because a predecessor failed.
        upstream: bool,
        error: String,
    },
    TaskRetried {
        run_id: u64,
        task: TaskId,
        /// 1-based retry number.
        retry: u32,
        delay: Duration,
        error: String,
    },
    TaskSkipped {
        run_id: u64,
        task: TaskId,
    },
    SlaBreached {
        run_id: u64,
        task: TaskId,
        sla: Duration,
        elapsed: Duration,
    },
    RunCompleted {
        run_id: u64,
    },
    RunFailed {
        run_id: u64,
        /// Tasks that ended `Failed` or `UpstreamFailed`.
        failed: Vec<TaskId>,
    },
}

impl RunEvent {
    /// Task the event is about, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            RunEvent::TaskStarted { task, .. }
            | RunEvent::TaskSucceeded { task, .. }
            | RunEvent::TaskFailed { task, .. }
            | RunEvent::TaskRetried { task, .. }
            | RunEvent::TaskSkipped { task, .. }
            | RunEvent::SlaBreached { task, .. } => Some(task.as_str()),
            RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. } => None,
        }
    }
}

/// Which events reach the sink.
///
/// `TaskStarted`, `TaskSkipped` and `SlaBreached` are always delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPolicy {
    /// `TaskFailed` and `RunFailed`.
    pub on_failure: bool,
    /// `TaskSucceeded` and `RunCompleted`.
    pub on_success: bool,
    /// `TaskRetried`.
    pub on_retry: bool,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            on_failure: true,
            on_success: false,
            on_retry: true,
        }
    }
}

impl NotifyPolicy {
    /// Deliver everything.
    pub fn all() -> Self {
        Self {
            on_failure: true,
            on_success: true,
            on_retry: true,
        }
    }

    pub fn allows(&self, event: &RunEvent) -> bool {
        match event {
            RunEvent::TaskFailed { .. } | RunEvent::RunFailed { .. } => self.on_failure,
            RunEvent::TaskSucceeded { .. } | RunEvent::RunCompleted { .. } => self.on_success,
            RunEvent::TaskRetried { .. } => self.on_retry,
            RunEvent::TaskStarted { .. }
            | RunEvent::TaskSkipped { .. }
            | RunEvent::SlaBreached { .. } => true,
        }
    }
}

/// External collaborator receiving run notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &RunEvent);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::TaskFailed { .. } | RunEvent::RunFailed { .. } => {
                warn!(?event, "notification")
            }
            RunEvent::SlaBreached { task, sla, elapsed, .. } => {
                warn!(task = %task, ?sla, ?elapsed, "SLA breached")
            }
            _ => info!(?event, "notification"),
        }
    }
}

/// Sink that forwards every event to a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &RunEvent) {
        if self.tx.send(event.clone()).is_err() {
            warn!(?event, "notification receiver dropped; event lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_hides_success_but_not_sla() {
        let policy = NotifyPolicy::default();
        assert!(!policy.allows(&RunEvent::RunCompleted { run_id: 1 }));
        assert!(policy.allows(&RunEvent::RunFailed {
            run_id: 1,
            failed: vec![]
        }));
        assert!(policy.allows(&RunEvent::SlaBreached {
            run_id: 1,
            task: "A".into(),
            sla: Duration::from_secs(1),
            elapsed: Duration::from_secs(2),
        }));
    }

    #[test]
    fn retry_flag_controls_retried_events() {
        let event = RunEvent::TaskRetried {
            run_id: 1,
            task: "A".into(),
            retry: 1,
            delay: Duration::ZERO,
            error: "exit 1".into(),
        };
        let mut policy = NotifyPolicy::all();
        assert!(policy.allows(&event));
        policy.on_retry = false;
        assert!(!policy.allows(&event));
        assert_eq!(event.task(), Some("A"));
    }

    #[test]
    fn channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.notify(&RunEvent::RunCompleted { run_id: 7 });
        assert_eq!(rx.try_recv().unwrap(), RunEvent::RunCompleted { run_id: 7 });
    }
}
