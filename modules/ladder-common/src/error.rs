use thiserror::Error;

use crate::types::Phase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalKeyError {
    #[error("Signal key '{0}' has no known namespace")]
    UnknownNamespace(String),

    #[error("Signal key '{0}' has an empty or invalid name")]
    InvalidName(String),
}

/// A single methodology violation, found at load time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Methodology defines no strategies")]
    EmptyStrategyList,

    #[error("Duplicate strategy name '{0}'")]
    DuplicateStrategy(String),

    #[error("Strategy '{strategy}' uses unknown technique '{technique}'")]
    UnknownTechnique { strategy: String, technique: String },

    #[error("Strategy '{strategy}' weights unregistered signal '{key}'")]
    UnknownSignal { strategy: String, key: String },

    #[error("Strategy '{strategy}' matches '{key}' against '{value}', which that signal never emits")]
    UnknownSignalValue {
        strategy: String,
        key: String,
        value: String,
    },

    #[error("Strategy '{strategy}' weight '{key}': {detail}")]
    KindMismatch {
        strategy: String,
        key: String,
        detail: String,
    },

    #[error("Strategy '{strategy}' weight '{key}' is not a finite number")]
    NonFiniteWeight { strategy: String, key: String },

    #[error("Unknown phase '{0}' (expected early, mid or late)")]
    UnknownPhase(String),

    #[error("Phase '{phase}' references unknown strategy '{strategy}'")]
    UnknownPhaseStrategy { phase: Phase, strategy: String },

    #[error("Phase '{phase}' value for strategy '{strategy}' is not a finite number")]
    NonFinitePhaseValue { phase: Phase, strategy: String },

    #[error("Phase thresholds invalid: early_max={early_max} must be <= mid_max={mid_max}")]
    InvalidPhaseThresholds { early_max: usize, mid_max: usize },

    #[error("Exhaustion config invalid: {0}")]
    InvalidExhaustion(String),

    #[error("No node-independent strategy defined; candidate selection could be empty")]
    NoFallbackStrategy,
}

/// Every violation found while loading one methodology.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} methodology configuration error(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}
