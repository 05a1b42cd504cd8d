//! Scripted interview transcripts.
//!
//! Each turn carries the respondent's answer, the nodes and edges the
//! extraction collaborator would have produced from it, and optionally the
//! qualitative reading the text-analysis collaborator would have returned.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ladder_common::{GraphEdge, GraphNode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transcript {
    #[serde(default)]
    pub topic: String,
    pub turns: Vec<TranscriptTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptTurn {
    pub response: String,
    /// Nodes added by this answer.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Edges added by this answer.
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub analysis: Option<ScriptedValues>,
}

/// Raw text-analysis output. Labels are kept as strings so that a transcript
/// can script malformed upstream values as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedValues {
    pub response_depth: String,
    #[serde(default)]
    pub valence: f64,
    #[serde(default = "default_hedging")]
    pub hedging_language: String,
    #[serde(default = "default_trend")]
    pub response_quality_trend: String,
}

fn default_hedging() -> String {
    "none".to_string()
}

fn default_trend() -> String {
    "stable".to_string()
}

pub fn load_transcript(path: &Path) -> Result<Transcript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    let transcript: Transcript = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transcript: {}", path.display()))?;
    Ok(transcript)
}
