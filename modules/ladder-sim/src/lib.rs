//! Offline replay of scripted interviews through the decision engine.

pub mod analysis;
pub mod file_config;
pub mod replay;
pub mod sink;
pub mod transcript;

pub use analysis::{LexicalAnalysis, ScriptedAnalysis};
pub use file_config::{load_methodology, load_methodology_spec};
pub use replay::{replay, GraphAccumulator, ReplaySummary};
pub use sink::JsonLinesSink;
pub use transcript::{load_transcript, ScriptedValues, Transcript, TranscriptTurn};
