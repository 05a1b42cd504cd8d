//! Per-turn decision engine for adaptive interviews.
//!
//! Each turn the pipeline folds the latest graph into the node tracker, runs
//! the signal pool in two passes, and scores every (strategy, node) pair.
//! Nothing here performs I/O: text analysis and persistence are reached
//! through the `TextAnalysisSource` and `DecisionSink` traits.

pub mod error;
pub mod history;
pub mod node_state;
pub mod phase;
pub mod pipeline;
pub mod scoring;
pub mod signals;
pub mod sink;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{ScoringError, SignalError, TrackerError, TurnError};
pub use history::StrategyHistory;
pub use node_state::{NodeOpportunity, NodeState, NodeStateTracker};
pub use phase::{determine_phase, PhaseDetector};
pub use pipeline::{DecisionRecord, TurnDecision, TurnInput, TurnPipeline};
pub use scoring::{ScoredCandidate, ScoringOutcome, StrategyScoringEngine, TermContribution};
pub use signals::{
    DetectionContext, DetectorOutput, DetectorSpec, Layer, MetaSignalDetector,
    ResponseSignalDetector, SignalDetector, SignalPool, TextAnalysis, TextAnalysisSource,
};
pub use sink::{DecisionSink, MemoryDecisionSink};
