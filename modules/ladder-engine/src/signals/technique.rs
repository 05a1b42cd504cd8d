use ladder_common::{keys, CostTier, RefreshTrigger, SignalShape};

use super::node::per_node;
use super::{DetectionContext, DetectorOutput, DetectorSpec, SignalDetector};
use crate::error::SignalError;

/// How strategies have been applied to each node so far.
pub struct NodeTechniqueDetector {
    spec: DetectorSpec,
}

impl NodeTechniqueDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("node_technique", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::node_strategy_repetition(), SignalShape::Numeric)
            .produces(keys::node_strategy_diversity(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for NodeTechniqueDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for NodeTechniqueDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError> {
        Ok(DetectorOutput::from([
            (
                keys::node_strategy_repetition(),
                per_node(ctx, |s| s.consecutive_same_strategy as f64),
            ),
            (
                keys::node_strategy_diversity(),
                per_node(ctx, |s| s.distinct_strategies() as f64),
            ),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SessionFixture;
    use ladder_common::{NodeId, Signal, SignalValue};

    #[test]
    fn counts_repetition_and_distinct_strategies_per_node() {
        let mut fixture = SessionFixture::with_nodes(&["a", "b"]);
        let a = NodeId::from("a");
        fixture.tracker.record_focus(&a, 1, "deepen").unwrap();
        fixture.tracker.record_focus(&a, 2, "deepen").unwrap();
        fixture.tracker.record_focus(&a, 3, "clarify").unwrap();
        fixture.tracker.record_focus(&a, 4, "clarify").unwrap();

        let output = fixture
            .with_context(4, |ctx| NodeTechniqueDetector::new().detect(ctx))
            .unwrap();

        let Signal::PerNode(repetition) = &output[&keys::node_strategy_repetition()] else {
            panic!("expected per-node output");
        };
        assert_eq!(repetition[&a], SignalValue::Numeric(2.0));
        assert_eq!(repetition[&NodeId::from("b")], SignalValue::Numeric(0.0));

        let Signal::PerNode(diversity) = &output[&keys::node_strategy_diversity()] else {
            panic!("expected per-node output");
        };
        assert_eq!(diversity[&a], SignalValue::Numeric(2.0));
    }
}
