use ladder_common::{keys, CostTier, RefreshTrigger, Signal, SignalShape};

use super::{DetectionContext, DetectorOutput, DetectorSpec, SignalDetector};
use crate::error::SignalError;

/// Session-level strategy repetition.
pub struct StrategyHistoryDetector {
    spec: DetectorSpec,
}

impl StrategyHistoryDetector {
    pub fn new() -> Self {
        let spec = DetectorSpec::new("strategy_history", CostTier::Free, RefreshTrigger::PerTurn)
            .produces(keys::strategy_repetition_count(), SignalShape::Numeric)
            .produces(keys::turns_since_strategy_change(), SignalShape::Numeric);
        Self { spec }
    }
}

impl Default for StrategyHistoryDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector for StrategyHistoryDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError> {
        let repetition = ctx.history.repetition_count() as f64;
        let since_change = ctx.history.turns_since_change(ctx.turn) as f64;
        Ok(DetectorOutput::from([
            (keys::strategy_repetition_count(), Signal::Global(repetition.into())),
            (keys::turns_since_strategy_change(), Signal::Global(since_change.into())),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SessionFixture;

    #[test]
    fn reads_the_session_history() {
        let mut fixture = SessionFixture::with_nodes(&[]);
        fixture.history.record(1, "deepen");
        fixture.history.record(2, "deepen");

        let output = fixture
            .with_context(4, |ctx| StrategyHistoryDetector::new().detect(ctx))
            .unwrap();
        assert_eq!(
            output[&keys::strategy_repetition_count()],
            Signal::Global(2.0.into())
        );
        assert_eq!(
            output[&keys::turns_since_strategy_change()],
            Signal::Global(3.0.into())
        );
    }
}
