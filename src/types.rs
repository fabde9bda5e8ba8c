use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Run parameters: supplied once at run start and read-only afterwards.
///
/// Branch deciders see these when choosing a successor.
pub type RunParams = BTreeMap<String, String>;

/// Policy deciding when a task may run, based on its direct predecessors.
///
/// - `AllSuccess` (default): every predecessor must have succeeded.
/// - `OneSuccess`: a single successful predecessor is enough; the others may
///   be skipped or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    #[default]
    AllSuccess,
    OneSuccess,
}

impl FromStr for TriggerRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_success" => Ok(TriggerRule::AllSuccess),
            "one_success" => Ok(TriggerRule::OneSuccess),
            other => Err(format!(
                "invalid trigger_rule: {other} (expected \"all_success\" or \"one_success\")"
            )),
        }
    }
}

impl fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerRule::AllSuccess => f.write_str("all_success"),
            TriggerRule::OneSuccess => f.write_str("one_success"),
        }
    }
}

/// Explicit task kind in config (`kind = "noop"` etc).
///
/// Usually omitted: the loader infers the kind from `cmd` / `branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKindName {
    Command,
    Branch,
    Noop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_rule_parses_snake_case() {
        assert_eq!("one_success".parse::<TriggerRule>(), Ok(TriggerRule::OneSuccess));
        assert_eq!(" ALL_SUCCESS ".parse::<TriggerRule>(), Ok(TriggerRule::AllSuccess));
        assert!("none_failed".parse::<TriggerRule>().is_err());
    }

    #[test]
    fn trigger_rule_defaults_to_all_success() {
        assert_eq!(TriggerRule::default(), TriggerRule::AllSuccess);
        assert_eq!(TriggerRule::OneSuccess.to_string(), "one_success");
    }
}
