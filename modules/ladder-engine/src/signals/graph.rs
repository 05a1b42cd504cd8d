use ladder_common::{keys, CostTier, RefreshTrigger, Signal, SignalShape};

use super::{DetectionContext, DetectorOutput, DetectorSpec, SignalDetector};
use crate::error::SignalError;

/// Whole-graph counts and depth aggregates.
pub struct GraphStructureDetector {
    spec: DetectorSpec,
}

impl GraphStructureDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("graph_structure", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::node_count(), SignalShape::Numeric)
            .produces(keys::edge_count(), SignalShape::Numeric)
            .produces(keys::orphan_count(), SignalShape::Numeric)
            .produces(keys::max_depth(), SignalShape::Numeric)
            .produces(keys::avg_depth(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for GraphStructureDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for GraphStructureDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError> {
        let global = |v: f64| Signal::Global(v.into());
        Ok(DetectorOutput::from([
            (keys::node_count(), global(ctx.graph.node_count() as f64)),
            (keys::edge_count(), global(ctx.graph.edge_count() as f64)),
            (keys::orphan_count(), global(ctx.graph.orphan_count() as f64)),
            (keys::max_depth(), global(ctx.depth.max_depth as f64)),
            (keys::avg_depth(), global(ctx.depth.avg_depth)),
        ]))
    }
}
