// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Branch task '{task}' chose '{chosen}', which is not one of its successors")]
    BranchResolution { task: String, chosen: String },

    #[error("Action for task '{task}' failed: {message}")]
    ActionExecution { task: String, message: String },

    #[error("Scheduling deadlock: {0}")]
    SchedulingDeadlock(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagError {
    /// True for errors that mean the DAG definition itself is unusable.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DagError::ConfigError(_) | DagError::DagCycle(_) | DagError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
