//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::value::FormatOptions;

/// Tunables for one [`Runtime`](crate::Runtime).
///
/// Loadable from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Global display defaults, the lowest layer of every component's options.
    pub display: FormatOptions,

    /// Predicate re-evaluation rounds allowed per transaction.
    pub max_trigger_rounds: usize,

    /// Nesting limit for lazy evaluation and inversion planning.
    pub max_eval_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            display: FormatOptions::global_default(),
            max_trigger_rounds: 64,
            max_eval_depth: 4096,
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_trigger_rounds == 0 {
            return Err(EngineError::Config("maxTriggerRounds must be positive".into()));
        }
        if self.max_eval_depth == 0 {
            return Err(EngineError::Config("maxEvalDepth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_json(r#"{"maxTriggerRounds": 8}"#).unwrap();
        assert_eq!(config.max_trigger_rounds, 8);
        assert_eq!(config.max_eval_depth, 4096);
        assert_eq!(config.display, FormatOptions::global_default());
    }

    #[test]
    fn display_defaults_from_json() {
        let config = RuntimeConfig::from_json(r#"{"display": {"decimals": 2}}"#).unwrap();
        assert_eq!(config.display.decimals, Some(2));
        assert_eq!(config.display.digits, None);
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            RuntimeConfig::from_json(r#"{"maxTriggerRounds": 0}"#),
            Err(EngineError::Config(_))
        ));
        assert!(RuntimeConfig::from_json("not json").is_err());
    }
}
