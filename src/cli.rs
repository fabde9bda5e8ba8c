// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `branchdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "branchdag",
    version,
    about = "Run a DAG of shell tasks with branching, trigger rules, retries and SLAs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Branchdag.toml` in the current working directory, or
    /// `BRANCHDAG_CONFIG` if set.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Run parameter override, `KEY=VALUE`. May be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Halt the run on the first task failure, overriding `[config].fail_fast`.
    #[arg(long)]
    pub fail_fast: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BRANCHDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print DAG, but don't execute any tasks.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse a `KEY=VALUE` run parameter.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_repeatable() {
        let args = CliArgs::try_parse_from([
            "branchdag",
            "--param",
            "destType=True",
            "--param",
            "run_date=2024-01-01",
            "--fail-fast",
        ])
        .unwrap();

        assert_eq!(
            args.params,
            vec![
                ("destType".to_string(), "True".to_string()),
                ("run_date".to_string(), "2024-01-01".to_string()),
            ]
        );
        assert!(args.fail_fast);
        assert!(args.config.is_none());
    }

    #[test]
    fn malformed_param_is_rejected() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
        assert_eq!(parse_param("a=b=c"), Ok(("a".into(), "b=c".into())));
    }
}
