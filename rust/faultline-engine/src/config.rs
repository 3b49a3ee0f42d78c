//! Engine configuration (`faultline.toml`).
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::constraint::{RuleKind, MAX_CASE_BITS};
use crate::selector::SelectionStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Propagation probability `p` shared by every rule.
    pub probability: f64,
    /// Largest belief change still considered converged.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Weight of the previous belief when updating, in `[0, 1)`.
    pub damping: f64,
    pub max_case_bits: usize,
    pub rules: Vec<RuleKind>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            probability: 0.95,
            tolerance: 1e-6,
            max_iterations: 50,
            damping: 0.5,
            max_case_bits: 16,
            rules: vec![RuleKind::A1, RuleKind::A2, RuleKind::A3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub strategy: SelectionStrategy,
    /// Used by [`SelectionStrategy::FirstBelow`].
    pub threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::MinProbability,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_rounds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { max_rounds: 100 }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.propagation;
        if !(p.probability > 0.0 && p.probability < 1.0) {
            return Err(invalid(
                "propagation.probability",
                format!("{} is not strictly between 0 and 1", p.probability),
            ));
        }
        if !(p.tolerance > 0.0) {
            return Err(invalid(
                "propagation.tolerance",
                format!("{} must be positive", p.tolerance),
            ));
        }
        if p.max_iterations == 0 {
            return Err(invalid("propagation.max_iterations", "must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&p.damping) {
            return Err(invalid(
                "propagation.damping",
                format!("{} is outside [0, 1)", p.damping),
            ));
        }
        if p.max_case_bits == 0 || p.max_case_bits > MAX_CASE_BITS {
            return Err(invalid(
                "propagation.max_case_bits",
                format!("{} is outside 1..={}", p.max_case_bits, MAX_CASE_BITS),
            ));
        }
        let t = self.selection.threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(invalid(
                "selection.threshold",
                format!("{} is outside [0, 1]", t),
            ));
        }
        if self.session.max_rounds == 0 {
            return Err(invalid("session.max_rounds", "must be at least 1".into()));
        }
        Ok(())
    }

    /// Commented `faultline.toml` written by `faultline init`.
    pub fn default_template() -> &'static str {
        r#"# faultline configuration

[propagation]
# Confidence of every inference rule, strictly between 0 and 1.
probability = 0.95
tolerance = 1e-6
max_iterations = 50
damping = 0.5
# Steps needing more case bits than this get no rule.
max_case_bits = 16
rules = ["a1", "a2", "a3"]

[selection]
# "min-probability" or "first-below"
strategy = "min-probability"
threshold = 0.5

[session]
max_rounds = 100
"#
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_returns_default() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.propagation.probability, 0.95);
        assert_eq!(cfg.session.max_rounds, 100);
    }

    #[test]
    fn default_template_round_trips() {
        let cfg = EngineConfig::from_toml_str(EngineConfig::default_template()).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
[propagation]
probability = 0.8
rules = ["a2"]

[selection]
strategy = "first-below"
"#,
        )
        .unwrap();
        assert_eq!(cfg.propagation.probability, 0.8);
        assert_eq!(cfg.propagation.rules, vec![RuleKind::A2]);
        assert_eq!(cfg.propagation.max_iterations, 50);
        assert_eq!(cfg.selection.strategy, SelectionStrategy::FirstBelow);
        assert_eq!(cfg.selection.threshold, 0.5);
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let err = EngineConfig::from_toml_str("[propagation]\nprobability = 1.0\n").unwrap_err();
        assert!(err.to_string().contains("propagation.probability"));
    }

    #[test]
    fn case_bit_limit_is_enforced() {
        let err = EngineConfig::from_toml_str("[propagation]\nmax_case_bits = 30\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "propagation.max_case_bits",
                ..
            }
        ));
    }

    #[test]
    fn unknown_rule_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[propagation]\nrules = [\"a9\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut cfg = EngineConfig::default();
        cfg.propagation.damping = 0.25;
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
