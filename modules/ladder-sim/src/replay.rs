//! Drives a pipeline through a scripted transcript.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use ladder_common::{GraphEdge, GraphNode, NodeId};
use ladder_engine::{DecisionSink, TurnInput, TurnPipeline};
use ladder_graph::GraphSnapshot;

use crate::transcript::{Transcript, TranscriptTurn};

/// Cumulative graph built from per-turn extraction deltas. A node id seen
/// twice keeps its first listing; duplicate edges are dropped.
#[derive(Debug, Default)]
pub struct GraphAccumulator {
    nodes: Vec<GraphNode>,
    node_ids: HashSet<NodeId>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(NodeId, NodeId, String)>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, turn: &TranscriptTurn) {
        for node in &turn.nodes {
            if self.node_ids.insert(node.id.clone()) {
                self.nodes.push(node.clone());
            }
        }
        for edge in &turn.edges {
            let key = (edge.source.clone(), edge.target.clone(), edge.edge_type.clone());
            if self.edge_keys.insert(key) {
                self.edges.push(edge.clone());
            }
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.nodes.clone(), self.edges.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub turns: usize,
    pub strategy_counts: BTreeMap<String, usize>,
    pub final_node_count: usize,
    pub final_phase: Option<String>,
}

/// Replays every turn in order, numbering them from 1, and persists each
/// decision. Stops at the first failed turn.
pub async fn replay(
    pipeline: &mut TurnPipeline,
    transcript: &Transcript,
    sink: &dyn DecisionSink,
) -> Result<ReplaySummary> {
    let mut graph = GraphAccumulator::new();
    let mut summary = ReplaySummary::default();

    if transcript.turns.is_empty() {
        warn!(topic = %transcript.topic, "Transcript has no turns");
    }

    for (index, scripted) in transcript.turns.iter().enumerate() {
        let turn = index as u32 + 1;
        graph.apply(scripted);

        let input = TurnInput::builder()
            .turn(turn)
            .response_text(scripted.response.as_str())
            .graph(graph.snapshot())
            .build();

        let decision = pipeline
            .process_turn(input)
            .await
            .with_context(|| format!("Turn {turn} failed"))?;

        *summary
            .strategy_counts
            .entry(decision.strategy.clone())
            .or_default() += 1;
        summary.final_phase = Some(decision.phase.to_string());
        summary.turns += 1;

        sink.persist(&pipeline.record(decision))
            .await
            .with_context(|| format!("Failed to persist turn {turn}"))?;
    }

    summary.final_node_count = pipeline.tracker().len();

    info!(
        session = %pipeline.session_id(),
        topic = %transcript.topic,
        turns = summary.turns,
        nodes = summary.final_node_count,
        "Replay complete"
    );

    Ok(summary)
}
