// src/config/mod.rs

//! Configuration loading and validation for branchdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into a runnable DAG (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BranchConfig, ConfigFile, ConfigSection, DagSection, DefaultSection, NotifySection,
    RawConfigFile, TaskConfig,
};
pub use validate::validate_config;
