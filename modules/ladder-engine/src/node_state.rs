//! Per-node lifecycle tracking.
//!
//! One `NodeState` per graph node, created the first time the node is seen
//! and never removed for the life of the session: exhaustion has to stay
//! reversible, so an old node can always come back once it yields again.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::debug;

use ladder_common::{DepthLabel, ExhaustionConfig, GraphNode, NodeId};

use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOpportunity {
    /// Repeated engagement, no structural yield, shallow answers.
    Exhausted,
    /// Deep answers but no new structure: ask differently, don't abandon.
    ProbeDeeper,
    Fresh,
}

impl NodeOpportunity {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeOpportunity::Exhausted => "exhausted",
            NodeOpportunity::ProbeDeeper => "probe_deeper",
            NodeOpportunity::Fresh => "fresh",
        }
    }
}

impl std::fmt::Display for NodeOpportunity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub node_id: NodeId,
    pub node_type: String,
    pub label: String,
    pub created_turn: u32,
    /// Distance from the nearest root, as of the latest depth computation.
    pub depth: usize,
    pub focus_count: u32,
    pub last_focus_turn: Option<u32>,
    pub turns_since_last_focus: u32,
    pub current_focus_streak: u32,
    pub last_yield_turn: Option<u32>,
    pub turns_since_last_yield: u32,
    pub yield_count: u32,
    /// Most recent last, bounded by `ExhaustionConfig::history_capacity`.
    pub response_depth_history: VecDeque<DepthLabel>,
    pub edge_count_incoming: u32,
    pub edge_count_outgoing: u32,
    pub strategy_usage_count: BTreeMap<String, u32>,
    pub last_strategy_used: Option<String>,
    pub consecutive_same_strategy: u32,
}

impl NodeState {
    fn new(node: &GraphNode, turn: u32) -> Self {
        Self {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            label: node.label.clone(),
            created_turn: turn,
            depth: 0,
            focus_count: 0,
            last_focus_turn: None,
            turns_since_last_focus: 0,
            current_focus_streak: 0,
            last_yield_turn: None,
            turns_since_last_yield: 0,
            yield_count: 0,
            response_depth_history: VecDeque::new(),
            edge_count_incoming: 0,
            edge_count_outgoing: 0,
            strategy_usage_count: BTreeMap::new(),
            last_strategy_used: None,
            consecutive_same_strategy: 0,
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.edge_count_incoming + self.edge_count_outgoing == 0
    }

    pub fn latest_depth(&self) -> Option<DepthLabel> {
        self.response_depth_history.back().copied()
    }

    /// Fraction of the last `window` labels that are surface or shallow.
    /// With fewer labels recorded, the fraction is over what exists; with
    /// none it is 0.
    pub fn shallow_ratio(&self, window: usize) -> f64 {
        let recent: Vec<_> = self
            .response_depth_history
            .iter()
            .rev()
            .take(window)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        let shallow = recent.iter().filter(|d| d.is_shallow()).count();
        shallow as f64 / recent.len() as f64
    }

    pub fn is_exhausted(&self, config: &ExhaustionConfig) -> bool {
        self.turns_since_last_yield >= config.min_turns_since_yield
            && self.current_focus_streak >= config.min_focus_streak
            && self.shallow_ratio(config.window) >= config.shallow_ratio_threshold
    }

    /// Continuous blend of the three exhaustion inputs, in [0, 1].
    pub fn exhaustion_score(&self, config: &ExhaustionConfig) -> f64 {
        let yield_gap =
            (self.turns_since_last_yield as f64 / config.min_turns_since_yield as f64).min(1.0);
        let streak = (self.current_focus_streak as f64 / config.min_focus_streak as f64).min(1.0);
        let shallow = self.shallow_ratio(config.window);
        (0.4 * yield_gap + 0.3 * streak + 0.3 * shallow).clamp(0.0, 1.0)
    }

    pub fn opportunity(&self, config: &ExhaustionConfig) -> NodeOpportunity {
        if self.is_exhausted(config) {
            NodeOpportunity::Exhausted
        } else if self.current_focus_streak >= config.min_focus_streak
            && self.latest_depth() == Some(DepthLabel::Deep)
            && self.turns_since_last_yield > 0
        {
            NodeOpportunity::ProbeDeeper
        } else {
            NodeOpportunity::Fresh
        }
    }

    pub fn distinct_strategies(&self) -> usize {
        self.strategy_usage_count.len()
    }
}

/// Arena of node lifecycle records for one session.
#[derive(Debug, Clone)]
pub struct NodeStateTracker {
    config: ExhaustionConfig,
    nodes: BTreeMap<NodeId, NodeState>,
    previous_focus: Option<NodeId>,
    last_tick: Option<u32>,
}

impl NodeStateTracker {
    pub fn new(config: ExhaustionConfig) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            previous_focus: None,
            last_tick: None,
        }
    }

    pub fn config(&self) -> &ExhaustionConfig {
        &self.config
    }

    /// Returns `true` if the node was not tracked before. Idempotent.
    pub fn register_node(&mut self, node: &GraphNode, turn: u32) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        debug!(node = %node.id, turn, "Registered node");
        self.nodes.insert(node.id.clone(), NodeState::new(node, turn));
        true
    }

    pub fn record_focus(
        &mut self,
        node_id: &NodeId,
        turn: u32,
        strategy: &str,
    ) -> Result<(), TrackerError> {
        let state = self.state_mut(node_id)?;
        state.focus_count += 1;
        state.turns_since_last_focus = 0;
        state.current_focus_streak += 1;
        state.last_focus_turn = Some(turn);
        *state
            .strategy_usage_count
            .entry(strategy.to_string())
            .or_insert(0) += 1;
        if state.last_strategy_used.as_deref() == Some(strategy) {
            state.consecutive_same_strategy += 1;
        } else {
            state.consecutive_same_strategy = 1;
            state.last_strategy_used = Some(strategy.to_string());
        }
        self.previous_focus = Some(node_id.clone());
        Ok(())
    }

    /// New structure came out of engaging this node: restart its exhaustion clock.
    pub fn record_yield(&mut self, node_id: &NodeId, turn: u32) -> Result<(), TrackerError> {
        let state = self.state_mut(node_id)?;
        state.yield_count += 1;
        state.last_yield_turn = Some(turn);
        state.current_focus_streak = 0;
        state.turns_since_last_yield = 0;
        Ok(())
    }

    /// Attribute a response depth to `node_id`. Callers pass the focus of the
    /// previous turn: that is the node the answered question targeted.
    pub fn append_response_quality(
        &mut self,
        node_id: &NodeId,
        depth: DepthLabel,
    ) -> Result<(), TrackerError> {
        let capacity = self.config.history_capacity;
        let state = self.state_mut(node_id)?;
        state.response_depth_history.push_back(depth);
        while state.response_depth_history.len() > capacity {
            state.response_depth_history.pop_front();
        }
        Ok(())
    }

    /// Counts never drop below zero.
    pub fn update_edge_counts(
        &mut self,
        node_id: &NodeId,
        delta_out: i64,
        delta_in: i64,
    ) -> Result<(), TrackerError> {
        let state = self.state_mut(node_id)?;
        state.edge_count_outgoing = apply_delta(state.edge_count_outgoing, delta_out);
        state.edge_count_incoming = apply_delta(state.edge_count_incoming, delta_in);
        Ok(())
    }

    pub fn update_depth(&mut self, node_id: &NodeId, depth: usize) -> Result<(), TrackerError> {
        self.state_mut(node_id)?.depth = depth;
        Ok(())
    }

    /// Advance the per-node clocks. Nodes created on this turn are not aged;
    /// nodes focused or yielding on this turn keep their zeroed counters.
    pub fn tick(&mut self, turn: u32) -> Result<(), TrackerError> {
        if let Some(last) = self.last_tick {
            if turn <= last {
                return Err(TrackerError::TurnRegression { last, got: turn });
            }
        }
        for state in self.nodes.values_mut() {
            if state.created_turn == turn {
                continue;
            }
            if state.last_focus_turn != Some(turn) {
                state.turns_since_last_focus += 1;
            }
            if state.last_yield_turn != Some(turn) {
                state.turns_since_last_yield += 1;
            }
        }
        self.last_tick = Some(turn);
        Ok(())
    }

    /// The last turn ended on a node-independent strategy.
    pub fn clear_focus(&mut self) {
        self.previous_focus = None;
    }

    /// Focus chosen on the most recent decided turn.
    pub fn previous_focus(&self) -> Option<&NodeId> {
        self.previous_focus.as_ref()
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&NodeState> {
        self.nodes.get(node_id)
    }

    pub fn state(&self, node_id: &NodeId) -> Result<&NodeState, TrackerError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| TrackerError::UnregisteredNode(node_id.clone()))
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Tracked nodes in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn state_mut(&mut self, node_id: &NodeId) -> Result<&mut NodeState, TrackerError> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| TrackerError::UnregisteredNode(node_id.clone()))
    }
}

fn apply_delta(count: u32, delta: i64) -> u32 {
    (count as i64 + delta).clamp(0, u32::MAX as i64) as u32
}
