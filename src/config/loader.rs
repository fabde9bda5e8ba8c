// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run full validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies `[default]` values to every task.
/// - Checks for:
///   - unknown `after` references,
///   - DAG cycles,
///   - contradictory task kinds and impossible branch tables,
///   - malformed durations.
///
/// A DAG without `[dag].name` is named after the file stem.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let stem = path.file_stem().and_then(|s| s.to_str());
    let config = validate_config(raw_config, stem)?;
    debug!(path = %path.display(), dag = %config.dag.name(), "loaded config");
    Ok(config)
}

/// Helper to resolve a default config path.
///
/// Respects `BRANCHDAG_CONFIG`, otherwise `Branchdag.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("BRANCHDAG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Branchdag.toml"))
}
