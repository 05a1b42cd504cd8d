//! Signal pool.
//!
//! Detectors are registered into one of three layers and evaluated in that
//! order every turn:
//!
//! 1. response: `llm.*`, awaited concurrently over the turn's response text
//! 2. base: `graph.*`, `graph.node.*`, `temporal.*`, `technique.node.*`
//! 3. meta: `meta.*` and `meta.node.*`, reading the merged output of 1 and 2
//!
//! Layers 1 and 2 together form the first pass; layer 3 is the second pass.
//! Every value a detector returns is checked against the shape it declared
//! before it lands in the bag, and node-scoped output must cover every
//! tracked node.

pub mod graph;
pub mod llm;
pub mod meta;
pub mod node;
pub mod technique;
pub mod temporal;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use ladder_common::{
    CostTier, Methodology, Namespace, NodeId, RefreshTrigger, Signal, SignalBag, SignalCatalog,
    SignalKey, SignalShape,
};
use ladder_graph::{DepthReport, GraphSnapshot};

use crate::error::SignalError;
use crate::history::StrategyHistory;
use crate::node_state::NodeStateTracker;

pub use graph::GraphStructureDetector;
pub use llm::{LlmSignalDetector, TextAnalysis, TextAnalysisSource};
pub use meta::{InterviewPhaseDetector, NodeOpportunityDetector};
pub use node::{NodeEngagementDetector, NodeStructureDetector};
pub use technique::NodeTechniqueDetector;
pub use temporal::StrategyHistoryDetector;

/// What one detector returned for one turn, keyed by signal.
pub type DetectorOutput = BTreeMap<SignalKey, Signal>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Response,
    Base,
    Meta,
}

impl Layer {
    fn admits(self, namespace: Namespace) -> bool {
        match self {
            Layer::Response => namespace == Namespace::Llm,
            Layer::Base => namespace != Namespace::Llm && !namespace.is_meta(),
            Layer::Meta => namespace.is_meta(),
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Layer::Response => "response",
            Layer::Base => "base",
            Layer::Meta => "meta",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSpec {
    pub name: String,
    pub produces: Vec<(SignalKey, SignalShape)>,
    pub cost: CostTier,
    pub refresh: RefreshTrigger,
}

impl DetectorSpec {
    pub fn new(name: impl Into<String>, cost: CostTier, refresh: RefreshTrigger) -> Self {
        Self {
            name: name.into(),
            produces: Vec::new(),
            cost,
            refresh,
        }
    }

    pub fn produces(mut self, key: SignalKey, shape: SignalShape) -> Self {
        self.produces.push((key, shape));
        self
    }

    pub fn shape_of(&self, key: &SignalKey) -> Option<&SignalShape> {
        self.produces
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, shape)| shape)
    }
}

/// Read-only view of the session handed to base and meta detectors.
/// Everything in it already reflects the current turn's graph.
#[derive(Clone, Copy)]
pub struct DetectionContext<'a> {
    pub turn: u32,
    pub graph: &'a GraphSnapshot,
    pub depth: &'a DepthReport,
    pub tracker: &'a NodeStateTracker,
    pub history: &'a StrategyHistory,
    pub methodology: &'a Methodology,
}

/// Structural detector over graph, tracker and history state.
pub trait SignalDetector: Send + Sync {
    fn spec(&self) -> &DetectorSpec;
    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<DetectorOutput, SignalError>;
}

/// Second-pass detector. `base` holds every first-pass signal of the turn.
pub trait MetaSignalDetector: Send + Sync {
    fn spec(&self) -> &DetectorSpec;
    fn detect(
        &self,
        ctx: &DetectionContext<'_>,
        base: &SignalBag,
    ) -> Result<DetectorOutput, SignalError>;
}

/// Detector over the respondent's latest answer. Implementations must not
/// keep values between calls.
#[async_trait]
pub trait ResponseSignalDetector: Send + Sync {
    fn spec(&self) -> &DetectorSpec;
    async fn detect(&self, turn: u32, response_text: &str) -> Result<DetectorOutput, SignalError>;
}

#[derive(Default)]
pub struct SignalPool {
    response: Vec<Box<dyn ResponseSignalDetector>>,
    base: Vec<Box<dyn SignalDetector>>,
    meta: Vec<Box<dyn MetaSignalDetector>>,
    catalog: SignalCatalog,
    owners: BTreeMap<SignalKey, String>,
}

impl SignalPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool with every built-in detector; `llm.*` values come from `analysis`.
    pub fn standard(analysis: Arc<dyn TextAnalysisSource>) -> Result<Self, SignalError> {
        let mut pool = Self::new();
        pool.register_response(LlmSignalDetector::new(analysis))?;
        pool.register(GraphStructureDetector::new())?;
        pool.register(NodeEngagementDetector::new())?;
        pool.register(NodeStructureDetector::new())?;
        pool.register(StrategyHistoryDetector::new())?;
        pool.register(NodeTechniqueDetector::new())?;
        pool.register_meta(InterviewPhaseDetector::new())?;
        pool.register_meta(NodeOpportunityDetector::new())?;
        Ok(pool)
    }

    pub fn register(&mut self, detector: impl SignalDetector + 'static) -> Result<(), SignalError> {
        self.claim(detector.spec(), Layer::Base)?;
        self.base.push(Box::new(detector));
        Ok(())
    }

    pub fn register_meta(
        &mut self,
        detector: impl MetaSignalDetector + 'static,
    ) -> Result<(), SignalError> {
        self.claim(detector.spec(), Layer::Meta)?;
        self.meta.push(Box::new(detector));
        Ok(())
    }

    pub fn register_response(
        &mut self,
        detector: impl ResponseSignalDetector + 'static,
    ) -> Result<(), SignalError> {
        self.claim(detector.spec(), Layer::Response)?;
        self.response.push(Box::new(detector));
        Ok(())
    }

    /// Every signal this pool can produce. Strategy weights are resolved
    /// against it when a methodology is loaded.
    pub fn catalog(&self) -> &SignalCatalog {
        &self.catalog
    }

    pub fn detectors(&self) -> impl Iterator<Item = (Layer, &DetectorSpec)> {
        let response = self.response.iter().map(|d| (Layer::Response, d.spec()));
        let base = self.base.iter().map(|d| (Layer::Base, d.spec()));
        let meta = self.meta.iter().map(|d| (Layer::Meta, d.spec()));
        response.chain(base).chain(meta)
    }

    pub async fn detect_response(
        &self,
        turn: u32,
        response_text: &str,
    ) -> Result<SignalBag, SignalError> {
        let outputs = try_join_all(self.response.iter().map(|detector| async move {
            let output = detector.detect(turn, response_text).await?;
            Ok::<_, SignalError>((detector.spec(), output))
        }))
        .await?;

        let mut bag = SignalBag::new();
        for (spec, output) in outputs {
            accept(spec, output, &[], &mut bag)?;
        }
        Ok(bag)
    }

    pub fn detect_base(&self, ctx: &DetectionContext<'_>) -> Result<SignalBag, SignalError> {
        let tracked = ctx.tracker.node_ids();
        let mut bag = SignalBag::new();
        for detector in &self.base {
            let output = detector.detect(ctx)?;
            accept(detector.spec(), output, &tracked, &mut bag)?;
        }
        Ok(bag)
    }

    pub fn detect_meta(
        &self,
        ctx: &DetectionContext<'_>,
        base: &SignalBag,
    ) -> Result<SignalBag, SignalError> {
        let tracked = ctx.tracker.node_ids();
        let mut bag = SignalBag::new();
        for detector in &self.meta {
            let output = detector.detect(ctx, base)?;
            accept(detector.spec(), output, &tracked, &mut bag)?;
        }
        Ok(bag)
    }

    fn claim(&mut self, spec: &DetectorSpec, layer: Layer) -> Result<(), SignalError> {
        if spec.produces.is_empty() {
            return Err(SignalError::Registration(format!(
                "detector '{}' declares no signals",
                spec.name
            )));
        }
        if layer == Layer::Response && spec.refresh != RefreshTrigger::PerResponse {
            return Err(SignalError::Registration(format!(
                "response detector '{}' must refresh per response",
                spec.name
            )));
        }

        let mut own = BTreeSet::new();
        for (key, _) in &spec.produces {
            if !layer.admits(key.namespace()) {
                return Err(SignalError::Registration(format!(
                    "detector '{}' registers '{key}' in the {layer} layer",
                    spec.name
                )));
            }
            if let Some(owner) = self.owners.get(key) {
                return Err(SignalError::Registration(format!(
                    "signal '{key}' of detector '{}' is already produced by '{owner}'",
                    spec.name
                )));
            }
            if !own.insert(key) {
                return Err(SignalError::Registration(format!(
                    "detector '{}' declares '{key}' twice",
                    spec.name
                )));
            }
        }

        for (key, shape) in &spec.produces {
            self.owners.insert(key.clone(), spec.name.clone());
            self.catalog.insert(key.clone(), shape.clone());
        }
        debug!(detector = %spec.name, %layer, signals = spec.produces.len(), "Registered detector");
        Ok(())
    }
}

/// Check one detector's output against its declaration and move it into `bag`.
fn accept(
    spec: &DetectorSpec,
    output: DetectorOutput,
    tracked: &[NodeId],
    bag: &mut SignalBag,
) -> Result<(), SignalError> {
    let malformed = |key: &SignalKey, detail: String| SignalError::Malformed {
        detector: spec.name.clone(),
        key: key.to_string(),
        detail,
    };

    for (key, _) in &spec.produces {
        if !output.contains_key(key) {
            return Err(malformed(key, "declared signal was not produced".to_string()));
        }
    }

    for (key, signal) in output {
        let Some(shape) = spec.shape_of(&key) else {
            return Err(malformed(&key, "signal is not declared by this detector".to_string()));
        };

        match &signal {
            Signal::Global(value) => {
                if key.is_node_scoped() {
                    return Err(malformed(&key, "node-scoped signal returned a single value".to_string()));
                }
                if !shape.accepts(value) {
                    return Err(malformed(&key, format!("value {value} does not fit {shape:?}")));
                }
            }
            Signal::PerNode(values) => {
                if !key.is_node_scoped() {
                    return Err(malformed(&key, "global signal returned per-node values".to_string()));
                }
                let missing: Vec<NodeId> = tracked
                    .iter()
                    .filter(|id| !values.contains_key(*id))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(SignalError::IncompleteNodeCoverage {
                        detector: spec.name.clone(),
                        key: key.to_string(),
                        missing,
                    });
                }
                for (node, value) in values {
                    if tracked.binary_search(node).is_err() {
                        return Err(malformed(&key, format!("value for untracked node '{node}'")));
                    }
                    if !shape.accepts(value) {
                        return Err(malformed(
                            &key,
                            format!("value {value} for node '{node}' does not fit {shape:?}"),
                        ));
                    }
                }
            }
        }

        bag.insert(key, signal);
    }

    debug!(detector = %spec.name, "Accepted detector output");
    Ok(())
}
