//! `graph.node.*` signals, one value per tracked node.

use std::collections::BTreeMap;

use ladder_common::{keys, CostTier, NodeId, RefreshTrigger, Signal, SignalKey, SignalShape, SignalValue};

use super::{DetectionContext, DetectorOutput, DetectorSpec, SignalDetector};
use crate::error::SignalError;
use crate::node_state::NodeState;

/// Collect one per-node signal for every tracked node.
pub(crate) fn per_node<F, V>(ctx: &DetectionContext<'_>, mut value: F) -> Signal
where
    F: FnMut(&NodeState) -> V,
    V: Into<SignalValue>,
{
    let values: BTreeMap<NodeId, SignalValue> = ctx
        .tracker
        .iter()
        .map(|state| (state.node_id.clone(), value(state).into()))
        .collect();
    Signal::PerNode(values)
}

/// Engagement and exhaustion state from the tracker.
pub struct NodeEngagementDetector {
    spec: DetectorSpec,
}

impl NodeEngagementDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("node_engagement", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::node_exhausted(), SignalShape::boolean())
            .produces(keys::node_exhaustion_score(), SignalShape::Numeric)
            .produces(keys::node_focus_streak(), SignalShape::Numeric)
            .produces(keys::node_turns_since_last_yield(), SignalShape::Numeric)
            .produces(keys::node_turns_since_last_focus(), SignalShape::Numeric)
            .produces(keys::node_is_current_focus(), SignalShape::boolean())
            .produces(keys::node_recency_score(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for NodeEngagementDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for NodeEngagementDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError> {
        let config = ctx.tracker.config();
        let focus = ctx.tracker.previous_focus();

        let entries: [(SignalKey, Signal); 7] = [
            (keys::node_exhausted(), per_node(ctx, |s| s.is_exhausted(config))),
            (keys::node_exhaustion_score(), per_node(ctx, |s| s.exhaustion_score(config))),
            (keys::node_focus_streak(), per_node(ctx, |s| s.current_focus_streak as f64)),
            (
                keys::node_turns_since_last_yield(),
                per_node(ctx, |s| s.turns_since_last_yield as f64),
            ),
            (
                keys::node_turns_since_last_focus(),
                per_node(ctx, |s| s.turns_since_last_focus as f64),
            ),
            (
                keys::node_is_current_focus(),
                per_node(ctx, |s| focus == Some(&s.node_id)),
            ),
            (keys::node_recency_score(), per_node(ctx, recency_score)),
        ];
        Ok(DetectorOutput::from(entries))
    }
}

/// `1 / (1 + turns since last focus)`, 0 for a node never focused.
fn recency_score(state: &NodeState) -> f64 {
    match state.last_focus_turn {
        Some(_) => 1.0 / (1.0 + state.turns_since_last_focus as f64),
        None => 0.0,
    }
}

/// Orphan flag and chain depth.
pub struct NodeStructureDetector {
    spec: DetectorSpec,
}

impl NodeStructureDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("node_structure", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::node_is_orphan(), SignalShape::boolean())
            .produces(keys::node_depth(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for NodeStructureDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for NodeStructureDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError> {
        Ok(DetectorOutput::from([
            (keys::node_is_orphan(), per_node(ctx, NodeState::is_orphan)),
            // Nodes missing from this turn's listing keep their last known depth.
            (keys::node_depth(), per_node(ctx, |s| s.depth as f64)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SessionFixture;
    use ladder_common::DepthLabel;

    #[test]
    fn covers_old_and_orphaned_nodes_not_just_recent_ones() {
        let mut fixture = SessionFixture::with_nodes(&["early", "late"]);
        fixture.tracker.register_node(&ladder_common::GraphNode::new("newest", "value", "newest"), 9);

        let output = fixture.with_context(9, |ctx| NodeEngagementDetector::new().detect(ctx)).unwrap();
        let Signal::PerNode(values) = &output[&keys::node_exhausted()] else {
            panic!("expected per-node output");
        };
        assert_eq!(values.len(), 3);
        assert!(values.contains_key(&NodeId::from("early")));
    }

    #[test]
    fn recency_is_zero_until_first_focus() {
        let mut fixture = SessionFixture::with_nodes(&["a", "b"]);
        fixture.tracker.tick(1).unwrap();
        fixture.tracker.record_focus(&NodeId::from("a"), 1, "deepen").unwrap();
        fixture.tracker.tick(2).unwrap();

        let output = fixture.with_context(2, |ctx| NodeEngagementDetector::new().detect(ctx)).unwrap();
        let Signal::PerNode(recency) = &output[&keys::node_recency_score()] else {
            panic!("expected per-node output");
        };
        assert_eq!(recency[&NodeId::from("a")], SignalValue::Numeric(0.5));
        assert_eq!(recency[&NodeId::from("b")], SignalValue::Numeric(0.0));

        let Signal::PerNode(focus) = &output[&keys::node_is_current_focus()] else {
            panic!("expected per-node output");
        };
        assert_eq!(focus[&NodeId::from("a")], SignalValue::from(true));
    }

    #[test]
    fn exhausted_flag_follows_the_tracker() {
        let mut fixture = SessionFixture::with_nodes(&["a"]);
        let a = NodeId::from("a");
        for turn in 1..=3 {
            fixture.tracker.tick(turn).unwrap();
            fixture.tracker.append_response_quality(&a, DepthLabel::Surface).unwrap();
            fixture.tracker.record_focus(&a, turn, "deepen").unwrap();
        }
        let output = fixture.with_context(3, |ctx| NodeEngagementDetector::new().detect(ctx)).unwrap();
        let Signal::PerNode(flags) = &output[&keys::node_exhausted()] else {
            panic!("expected per-node output");
        };
        assert_eq!(flags[&a], SignalValue::from(true));
    }
}
