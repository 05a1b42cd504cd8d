//! Second-pass signals derived from first-pass output.

use std::collections::BTreeMap;

use ladder_common::{
    keys, CostTier, NodeId, Phase, RefreshTrigger, Signal, SignalBag, SignalShape, SignalValue,
};

use super::{DetectionContext, DetectorOutput, DetectorSpec, MetaSignalDetector};
use crate::error::SignalError;
use crate::node_state::NodeOpportunity;
use crate::phase::PhaseDetector;

/// `meta.interview.phase` and `meta.interview.progress` from `graph.node_count`.
pub struct InterviewPhaseDetector {
    spec: DetectorSpec,
}

impl InterviewPhaseDetector {
    pub fn new() -> Self {
        let phases: Vec<&str> = Phase::ALL.iter().map(|p| p.as_str()).collect();
        let spec = DetectorSpec::new("interview_phase", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::interview_phase(), SignalShape::categorical(&phases))
            .produces(keys::interview_progress(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for InterviewPhaseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaSignalDetector for InterviewPhaseDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(
        &self,
        ctx: &DetectionContext<'_>,
        base: &SignalBag,
    ) -> Result<DetectorOutput, SignalError> {
        let key = keys::node_count();
        let node_count = base.numeric(&key).ok_or_else(|| SignalError::MissingInput {
            detector: self.spec.name.clone(),
            key: key.to_string(),
        })?;
        let node_count = node_count.max(0.0) as usize;

        let detector = PhaseDetector::new(ctx.methodology.thresholds());
        Ok(DetectorOutput::from([
            (
                keys::interview_phase(),
                Signal::Global(detector.detect(node_count).into()),
            ),
            (
                keys::interview_progress(),
                Signal::Global(detector.progress(node_count).into()),
            ),
        ]))
    }
}

/// `meta.node.opportunity`: exhausted, worth probing differently, or fresh.
pub struct NodeOpportunityDetector {
    spec: DetectorSpec,
}

impl NodeOpportunityDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("node_opportunity", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(
                keys::node_opportunity(),
                SignalShape::categorical(&["exhausted", "probe_deeper", "fresh"]),
            );
        Self { spec }
    }
}

impl Default for NodeOpportunityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaSignalDetector for NodeOpportunityDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(
        &self,
        ctx: &DetectionContext<'_>,
        base: &SignalBag,
    ) -> Result<DetectorOutput, SignalError> {
        let exhausted_key = keys::node_exhausted();
        let config = ctx.tracker.config();

        let mut values: BTreeMap<NodeId, SignalValue> = BTreeMap::new();
        for state in ctx.tracker.iter() {
            let flag = base
                .node_value(&exhausted_key, &state.node_id)
                .and_then(SignalValue::as_categorical)
                .ok_or_else(|| SignalError::MissingInput {
                    detector: self.spec.name.clone(),
                    key: format!("{exhausted_key}[{}]", state.node_id),
                })?;

            let opportunity = if flag == "true" {
                NodeOpportunity::Exhausted
            } else if state.opportunity(config) == NodeOpportunity::ProbeDeeper {
                NodeOpportunity::ProbeDeeper
            } else {
                NodeOpportunity::Fresh
            };
            values.insert(state.node_id.clone(), opportunity.as_str().into());
        }

        Ok(DetectorOutput::from([(
            keys::node_opportunity(),
            Signal::PerNode(values),
        )]))
    }
}
