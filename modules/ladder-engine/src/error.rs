use thiserror::Error;

use ladder_common::NodeId;

/// Misuse of the node tracker. These are programming errors and surface
/// immediately; nothing is auto-registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Node '{0}' is not registered with the tracker")]
    UnregisteredNode(NodeId),

    #[error("Turn {got} does not advance past turn {last}")]
    TurnRegression { last: u32, got: u32 },
}

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Detector '{detector}' failed: {source}")]
    DetectorFailed {
        detector: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Detector '{detector}' produced a malformed value for '{key}': {detail}")]
    Malformed {
        detector: String,
        key: String,
        detail: String,
    },

    #[error("Detector '{detector}' left tracked nodes without a '{key}' value: {missing:?}")]
    IncompleteNodeCoverage {
        detector: String,
        key: String,
        missing: Vec<NodeId>,
    },

    #[error("Detector '{detector}' needs pass-1 signal '{key}', which is absent")]
    MissingInput { detector: String, key: String },

    #[error("Detector registration rejected: {0}")]
    Registration(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Strategy '{strategy}' needs signal '{key}'{}, which was not detected", node_suffix(.node))]
    MissingSignal {
        strategy: String,
        key: String,
        node: Option<NodeId>,
    },

    #[error("Strategy '{strategy}' weight '{key}' expected a {expected} value, got {actual}")]
    KindMismatch {
        strategy: String,
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Interview phase signal is missing or unreadable: {0}")]
    Phase(String),

    #[error("No (strategy, node) candidate could be scored")]
    NoCandidates,
}

fn node_suffix(node: &Option<NodeId>) -> String {
    node.as_ref()
        .map(|n| format!(" for node '{n}'"))
        .unwrap_or_default()
}

/// Everything that can abort a turn. The tracker is left untouched when any
/// of these is returned.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
