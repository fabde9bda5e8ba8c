// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running tasks (shell commands via
//! `tokio::process::Command`, branch deciders, no-ops) and reporting back to
//! the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`command`] holds the `CommandRunner` seam and the shell runner.
//! - [`executor_loop`] owns the main executor loop which manages attempts.
//! - [`task_runner`] executes a single attempt and classifies its outcome.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use command::{CommandOutput, CommandRunner, ShellCommandRunner};
pub use executor_loop::{spawn_executor, ExecutorRequest};
pub use task_runner::execute;
