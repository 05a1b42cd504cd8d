pub mod error;
pub mod methodology;
pub mod signal;
pub mod types;

pub use error::{ConfigError, ConfigErrors, SignalKeyError};
pub use methodology::{
    ExhaustionConfig, Methodology, MethodologySpec, PhaseProfile, PhaseProfileSpec,
    PhaseThresholds, Strategy, StrategySpec, Technique, WeightTerm,
};
pub use signal::{
    keys, CostTier, Namespace, RefreshTrigger, Signal, SignalBag, SignalCatalog, SignalKey,
    SignalShape, SignalValue,
};
pub use types::*;
