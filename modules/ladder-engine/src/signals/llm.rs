//! `llm.*` signals.
//!
//! The qualitative reading of a response (depth, valence, hedging, trend) is
//! produced by an external text-analysis collaborator. This detector asks it
//! once per turn, validates what comes back, and never remembers it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ladder_common::{
    keys, CostTier, DepthLabel, RefreshTrigger, Signal, SignalKey, SignalShape, SignalValue,
};

use super::{DetectorOutput, DetectorSpec, ResponseSignalDetector};
use crate::error::SignalError;

pub const HEDGING_LEVELS: &[&str] = &["none", "low", "medium", "high"];
pub const QUALITY_TRENDS: &[&str] = &["improving", "stable", "declining"];

/// Raw per-response values as handed over by the collaborator, keyed by
/// signal. Nothing in here has been checked yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextAnalysis(pub BTreeMap<SignalKey, SignalValue>);

impl TextAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: SignalKey, value: impl Into<SignalValue>) -> Self {
        self.0.insert(key, value.into());
        self
    }
}

/// External source of qualitative response signals.
#[async_trait]
pub trait TextAnalysisSource: Send + Sync {
    async fn analyze(&self, response_text: &str) -> anyhow::Result<TextAnalysis>;
}

pub struct LlmSignalDetector {
    source: Arc<dyn TextAnalysisSource>,
    spec: DetectorSpec,
}

impl LlmSignalDetector {
    pub fn new(source: Arc<dyn TextAnalysisSource>) -> Self {
        let depth_labels: Vec<&str> = DepthLabel::ALL.iter().map(|d| d.as_str()).collect();
        let spec = DetectorSpec::new("llm_response", CostTier::High, RefreshTrigger::PerResponse)
            .produces(keys::response_depth(), SignalShape::categorical(&depth_labels))
            .produces(keys::valence(), SignalShape::Numeric)
            .produces(keys::hedging_language(), SignalShape::categorical(HEDGING_LEVELS))
            .produces(
                keys::response_quality_trend(),
                SignalShape::categorical(QUALITY_TRENDS),
            );
        Self { source, spec }
    }

    fn malformed(&self, key: &SignalKey, detail: impl Into<String>) -> SignalError {
        SignalError::Malformed {
            detector: self.spec.name.clone(),
            key: key.to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl ResponseSignalDetector for LlmSignalDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    async fn detect(&self, turn: u32, response_text: &str) -> Result<DetectorOutput, SignalError> {
        let TextAnalysis(mut values) =
            self.source
                .analyze(response_text)
                .await
                .map_err(|source| SignalError::DetectorFailed {
                    detector: self.spec.name.clone(),
                    source,
                })?;

        let mut output = DetectorOutput::new();
        for (key, shape) in &self.spec.produces {
            let Some(value) = values.remove(key) else {
                return Err(self.malformed(key, "missing from text analysis"));
            };
            if !shape.accepts(&value) {
                return Err(self.malformed(key, format!("unexpected value {value}")));
            }
            if *key == keys::valence() {
                let v = value.as_numeric().unwrap_or(f64::NAN);
                if !(-1.0..=1.0).contains(&v) {
                    return Err(self.malformed(key, format!("valence {v} is outside [-1, 1]")));
                }
            }
            output.insert(key.clone(), Signal::Global(value));
        }

        for key in values.keys() {
            warn!(turn, key = %key, "Ignoring text analysis value no detector declares");
        }
        debug!(turn, signals = output.len(), "Text analysis accepted");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTextAnalysis;

    #[tokio::test]
    async fn passes_validated_values_through() {
        let mock = Arc::new(MockTextAnalysis::new().on_text(
            "because it keeps me calm",
            MockTextAnalysis::analysis(DepthLabel::Deep, 0.4, "low", "improving"),
        ));
        let detector = LlmSignalDetector::new(mock.clone());

        let output = detector.detect(2, "because it keeps me calm").await.unwrap();

        assert_eq!(
            output[&keys::response_depth()],
            Signal::Global(SignalValue::from("deep"))
        );
        assert_eq!(output[&keys::valence()], Signal::Global(0.4.into()));
        assert_eq!(mock.calls(), vec!["because it keeps me calm".to_string()]);
    }

    #[tokio::test]
    async fn unknown_label_is_malformed_not_defaulted() {
        let analysis = MockTextAnalysis::analysis(DepthLabel::Deep, 0.0, "none", "stable")
            .with(keys::response_depth(), "profound");
        let mock = Arc::new(MockTextAnalysis::new().on_text("x", analysis));
        let detector = LlmSignalDetector::new(mock);

        let err = detector.detect(1, "x").await.unwrap_err();
        assert!(matches!(err, SignalError::Malformed { ref key, .. } if key == "llm.response_depth"));
    }

    #[tokio::test]
    async fn valence_out_of_range_is_rejected() {
        let analysis = MockTextAnalysis::analysis(DepthLabel::Moderate, 1.5, "none", "stable");
        let mock = Arc::new(MockTextAnalysis::new().on_text("x", analysis));
        let err = LlmSignalDetector::new(mock).detect(1, "x").await.unwrap_err();
        assert!(err.to_string().contains("outside [-1, 1]"));
    }

    #[tokio::test]
    async fn missing_value_is_rejected() {
        let mut analysis = MockTextAnalysis::analysis(DepthLabel::Moderate, 0.0, "none", "stable");
        analysis.0.remove(&keys::hedging_language());
        let mock = Arc::new(MockTextAnalysis::new().on_text("x", analysis));
        let err = LlmSignalDetector::new(mock).detect(1, "x").await.unwrap_err();
        assert!(err.to_string().contains("llm.hedging_language"));
    }

    #[tokio::test]
    async fn source_failure_is_wrapped() {
        let mock = Arc::new(MockTextAnalysis::new().fail_on("boom"));
        let err = LlmSignalDetector::new(mock).detect(1, "boom").await.unwrap_err();
        assert!(matches!(err, SignalError::DetectorFailed { .. }));
    }
}
