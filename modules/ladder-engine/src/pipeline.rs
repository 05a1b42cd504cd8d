//! One decision per respondent turn.
//!
//! Flow of `process_turn`:
//! 1. Stage copies of the tracker and strategy history
//! 2. Register new nodes, age every node, sync edge counts and depth
//! 3. Record a yield on the previous focus if the answer grew the graph
//! 4. Run the response detectors on this turn's text and attribute the
//!    response depth to the previous focus
//! 5. Base detectors, then meta detectors over the merged first pass
//! 6. Score, apply the winner's focus to the stage, commit the stage
//!
//! Any error before step 6 completes drops the stage: the session state is
//! exactly what it was before the call. The same holds if the future is
//! dropped while awaiting text analysis.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use ladder_common::{keys, DepthLabel, Methodology, NodeId, Phase, SignalBag, Technique};
use ladder_graph::{DepthReport, GraphDepthComputer, GraphSnapshot};

use crate::error::{ScoringError, SignalError, TrackerError, TurnError};
use crate::history::StrategyHistory;
use crate::node_state::NodeStateTracker;
use crate::scoring::{ScoredCandidate, StrategyScoringEngine};
use crate::signals::{DetectionContext, SignalPool};

#[derive(Debug, Clone, TypedBuilder)]
pub struct TurnInput {
    pub turn: u32,
    /// The respondent's answer to the previous question.
    #[builder(default, setter(into))]
    pub response_text: String,
    /// Full node/edge listing after this turn's extraction was applied.
    #[builder(default)]
    pub graph: GraphSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDecision {
    pub turn: u32,
    pub phase: Phase,
    pub strategy: String,
    pub technique: Technique,
    pub node_id: Option<NodeId>,
    pub final_score: f64,
    pub ranked: Vec<ScoredCandidate>,
    pub signals: SignalBag,
    pub new_nodes: Vec<NodeId>,
    /// The previous focus, when this turn's answer counted as a yield for it.
    pub yielded: Option<NodeId>,
}

/// Audit entry handed to a `DecisionSink`.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub session_id: Uuid,
    pub methodology: String,
    pub recorded_at: DateTime<Utc>,
    pub decision: TurnDecision,
}

pub struct TurnPipeline {
    session_id: Uuid,
    methodology: Arc<Methodology>,
    pool: SignalPool,
    scoring: StrategyScoringEngine,
    tracker: NodeStateTracker,
    history: StrategyHistory,
}

impl TurnPipeline {
    pub fn new(methodology: Arc<Methodology>, pool: SignalPool) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            tracker: NodeStateTracker::new(*methodology.exhaustion()),
            scoring: StrategyScoringEngine::new(methodology.clone()),
            history: StrategyHistory::new(),
            methodology,
            pool,
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn methodology(&self) -> &Methodology {
        &self.methodology
    }

    pub fn pool(&self) -> &SignalPool {
        &self.pool
    }

    pub fn tracker(&self) -> &NodeStateTracker {
        &self.tracker
    }

    pub fn history(&self) -> &StrategyHistory {
        &self.history
    }

    pub async fn process_turn(&mut self, input: TurnInput) -> Result<TurnDecision, TurnError> {
        let TurnInput {
            turn,
            response_text,
            graph,
        } = input;

        let mut tracker = self.tracker.clone();
        let mut history = self.history.clone();

        let new_nodes = sync_graph(&mut tracker, &graph, turn)?;
        let depth = GraphDepthComputer::compute(&graph);
        for (id, d) in &depth.node_depth {
            tracker.update_depth(id, *d)?;
        }

        let previous_focus = tracker.previous_focus().cloned();
        let yielded = match &previous_focus {
            Some(focus) if answer_yielded(&self.tracker, &tracker, focus, &new_nodes) => {
                tracker.record_yield(focus, turn)?;
                Some(focus.clone())
            }
            _ => None,
        };

        let response = self.pool.detect_response(turn, &response_text).await?;
        if let Some(focus) = &previous_focus {
            if let Some(label) = response_depth(&response)? {
                tracker.append_response_quality(focus, label)?;
            }
        }

        let signals = self.detect(&tracker, &history, &graph, &depth, turn, response)?;

        let outcome = self.scoring.score(&signals, &tracker.node_ids())?;
        let winner = outcome.winner().cloned().ok_or(ScoringError::NoCandidates)?;

        match &winner.node_id {
            Some(node) => tracker.record_focus(node, turn, &winner.strategy)?,
            None => tracker.clear_focus(),
        }
        history.record(turn, &winner.strategy);

        self.tracker = tracker;
        self.history = history;

        info!(
            session = %self.session_id,
            turn,
            phase = %outcome.phase,
            strategy = %winner.strategy,
            node = ?winner.node_id,
            score = winner.final_score,
            new_nodes = new_nodes.len(),
            yielded = yielded.is_some(),
            "Decision made"
        );

        Ok(TurnDecision {
            turn,
            phase: outcome.phase,
            strategy: winner.strategy.clone(),
            technique: winner.technique,
            node_id: winner.node_id.clone(),
            final_score: winner.final_score,
            ranked: outcome.ranked,
            signals,
            new_nodes,
            yielded,
        })
    }

    /// Both passes over the staged state. Response signals join the first
    /// pass before the meta layer runs.
    fn detect(
        &self,
        tracker: &NodeStateTracker,
        history: &StrategyHistory,
        graph: &GraphSnapshot,
        depth: &DepthReport,
        turn: u32,
        response: SignalBag,
    ) -> Result<SignalBag, SignalError> {
        let ctx = DetectionContext {
            turn,
            graph,
            depth,
            tracker,
            history,
            methodology: &self.methodology,
        };

        let mut first_pass = self.pool.detect_base(&ctx)?;
        first_pass.extend(response);
        let second_pass = self.pool.detect_meta(&ctx, &first_pass)?;
        first_pass.extend(second_pass);
        Ok(first_pass)
    }

    /// Wrap a decision for the persistence collaborator.
    pub fn record(&self, decision: TurnDecision) -> DecisionRecord {
        DecisionRecord {
            session_id: self.session_id,
            methodology: self.methodology.name().to_string(),
            recorded_at: Utc::now(),
            decision,
        }
    }
}

/// Register unseen nodes, advance the clocks and bring edge counts in line
/// with the snapshot. Returns the newly registered ids in listing order.
fn sync_graph(
    tracker: &mut NodeStateTracker,
    graph: &GraphSnapshot,
    turn: u32,
) -> Result<Vec<NodeId>, TrackerError> {
    let mut new_nodes = Vec::new();
    for node in &graph.nodes {
        if tracker.register_node(node, turn) {
            new_nodes.push(node.id.clone());
        }
    }

    tracker.tick(turn)?;

    for (id, degree) in graph.degrees() {
        let state = tracker.state(&id)?;
        let delta_out = degree.outgoing as i64 - state.edge_count_outgoing as i64;
        let delta_in = degree.incoming as i64 - state.edge_count_incoming as i64;
        if delta_out != 0 || delta_in != 0 {
            tracker.update_edge_counts(&id, delta_out, delta_in)?;
        }
    }

    if !new_nodes.is_empty() {
        debug!(turn, count = new_nodes.len(), "Registered new nodes");
    }
    Ok(new_nodes)
}

/// The answer to a question about `focus` yielded if it brought new nodes or
/// new links on the focus itself.
fn answer_yielded(
    before: &NodeStateTracker,
    after: &NodeStateTracker,
    focus: &NodeId,
    new_nodes: &[NodeId],
) -> bool {
    if !new_nodes.is_empty() {
        return true;
    }
    let degree = |t: &NodeStateTracker| {
        t.get(focus)
            .map(|s| s.edge_count_incoming + s.edge_count_outgoing)
            .unwrap_or(0)
    };
    degree(after) > degree(before)
}

fn response_depth(response: &SignalBag) -> Result<Option<DepthLabel>, SignalError> {
    let key = keys::response_depth();
    let Some(raw) = response.categorical(&key) else {
        return Ok(None);
    };
    raw.parse::<DepthLabel>()
        .map(Some)
        .map_err(|detail| SignalError::Malformed {
            detector: "pipeline".to_string(),
            key: key.to_string(),
            detail,
        })
}
