// Test doubles and fixtures for the decision engine.
//
// - MockTextAnalysis (TextAnalysisSource): text -> analysis map, records every call
// - SessionFixture: tracker + history + graph for driving detectors directly
// - methodology builders over a given signal catalog

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use ladder_common::{
    keys, DepthLabel, ExhaustionConfig, GraphEdge, GraphNode, Methodology, MethodologySpec,
    PhaseProfileSpec, PhaseThresholds, SignalCatalog, StrategySpec,
};
use ladder_graph::{DepthReport, GraphDepthComputer, GraphSnapshot};

use crate::history::StrategyHistory;
use crate::node_state::NodeStateTracker;
use crate::signals::{DetectionContext, TextAnalysis, TextAnalysisSource};

// ---------------------------------------------------------------------------
// MockTextAnalysis
// ---------------------------------------------------------------------------

/// Returns a canned analysis per response text, or a neutral default.
/// Builder pattern: `.on_text()`, `.fail_on()`, `.with_default()`.
pub struct MockTextAnalysis {
    default: TextAnalysis,
    by_text: HashMap<String, TextAnalysis>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTextAnalysis {
    pub fn new() -> Self {
        Self {
            default: Self::analysis(DepthLabel::Moderate, 0.0, "none", "stable"),
            by_text: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn analysis(depth: DepthLabel, valence: f64, hedging: &str, trend: &str) -> TextAnalysis {
        TextAnalysis::new()
            .with(keys::response_depth(), depth)
            .with(keys::valence(), valence)
            .with(keys::hedging_language(), hedging)
            .with(keys::response_quality_trend(), trend)
    }

    pub fn on_text(mut self, text: &str, analysis: TextAnalysis) -> Self {
        self.by_text.insert(text.to_string(), analysis);
        self
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn with_default(mut self, analysis: TextAnalysis) -> Self {
        self.default = analysis;
        self
    }

    /// Every text analyzed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTextAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextAnalysisSource for MockTextAnalysis {
    async fn analyze(&self, response_text: &str) -> Result<TextAnalysis> {
        self.calls.lock().unwrap().push(response_text.to_string());
        if self.failing.contains(response_text) {
            bail!("MockTextAnalysis: configured to fail for {response_text:?}");
        }
        Ok(self
            .by_text
            .get(response_text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

// ---------------------------------------------------------------------------
// Graph helpers
// ---------------------------------------------------------------------------

/// Snapshot over `nodes` (type "attribute", label = id) and directed `edges`.
pub fn snapshot(nodes: &[&str], edges: &[(&str, &str)]) -> GraphSnapshot {
    GraphSnapshot::new(
        nodes
            .iter()
            .map(|id| GraphNode::new(*id, "attribute", *id))
            .collect(),
        edges.iter().map(|(s, t)| GraphEdge::new(*s, *t)).collect(),
    )
}

// ---------------------------------------------------------------------------
// SessionFixture
// ---------------------------------------------------------------------------

/// Session state for driving detectors without a pipeline.
pub struct SessionFixture {
    pub tracker: NodeStateTracker,
    pub history: StrategyHistory,
    pub graph: GraphSnapshot,
    pub depth: DepthReport,
    pub methodology: Methodology,
}

impl SessionFixture {
    /// Nodes registered on turn 0, no edges.
    pub fn with_nodes(ids: &[&str]) -> Self {
        let graph = snapshot(ids, &[]);
        let mut tracker = NodeStateTracker::new(ExhaustionConfig::default());
        for node in &graph.nodes {
            tracker.register_node(node, 0);
        }
        Self {
            tracker,
            history: StrategyHistory::new(),
            depth: GraphDepthComputer::compute(&graph),
            graph,
            methodology: methodology(&SignalCatalog::new()),
        }
    }

    pub fn with_context<R>(&self, turn: u32, f: impl FnOnce(&DetectionContext<'_>) -> R) -> R {
        let ctx = DetectionContext {
            turn,
            graph: &self.graph,
            depth: &self.depth,
            tracker: &self.tracker,
            history: &self.history,
            methodology: &self.methodology,
        };
        f(&ctx)
    }
}

// ---------------------------------------------------------------------------
// Methodologies
// ---------------------------------------------------------------------------

pub fn strategy(name: &str, technique: &str, weights: &[(&str, f64)]) -> StrategySpec {
    StrategySpec {
        name: name.to_string(),
        technique: technique.to_string(),
        description: String::new(),
        signal_weights: weights.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
        targets_node: true,
    }
}

pub fn closing(name: &str, weights: &[(&str, f64)]) -> StrategySpec {
    StrategySpec {
        targets_node: false,
        ..strategy(name, "closing", weights)
    }
}

pub fn spec_with(strategies: Vec<StrategySpec>) -> MethodologySpec {
    MethodologySpec {
        name: "fixture".to_string(),
        description: String::new(),
        strategies,
        phase_thresholds: PhaseThresholds {
            early_max: 5,
            mid_max: 15,
        },
        phases: BTreeMap::new(),
        exhaustion: ExhaustionConfig::default(),
    }
}

/// Weightless two-strategy methodology; loads against any catalog.
pub fn methodology(catalog: &SignalCatalog) -> Methodology {
    let spec = spec_with(vec![strategy("deepen", "laddering", &[]), closing("close", &[])]);
    Methodology::load(spec, catalog).expect("fixture methodology is valid")
}

/// Means-end laddering over the built-in signals.
pub fn laddering_spec() -> MethodologySpec {
    let mut spec = spec_with(vec![
        strategy(
            "deepen",
            "laddering",
            &[
                ("graph.node.exhausted.false", 1.0),
                ("graph.node.is_current_focus.true", 0.5),
                ("graph.node.recency_score", 0.5),
                ("llm.response_depth.surface", -0.3),
            ],
        ),
        strategy(
            "clarify",
            "clarification",
            &[
                ("llm.hedging_language.high", 1.2),
                ("graph.node.is_current_focus.true", 0.6),
            ],
        ),
        strategy(
            "revisit",
            "probing",
            &[
                ("graph.node.is_orphan.true", 0.8),
                ("graph.node.exhausted.false", 0.4),
                ("graph.node.turns_since_last_focus", 0.05),
            ],
        ),
        strategy(
            "rephrase",
            "elaboration",
            &[("meta.node.opportunity.probe_deeper", 1.6)],
        ),
        closing("close", &[("meta.interview.progress", 1.0)]),
    ]);
    spec.name = "means_end_chain".to_string();
    spec.phases = BTreeMap::from([
        (
            "early".to_string(),
            PhaseProfileSpec {
                signal_weights: BTreeMap::from([("deepen".to_string(), 1.2)]),
                phase_bonuses: BTreeMap::new(),
            },
        ),
        (
            "late".to_string(),
            PhaseProfileSpec {
                signal_weights: BTreeMap::from([("deepen".to_string(), 0.8)]),
                phase_bonuses: BTreeMap::from([("close".to_string(), 1.0)]),
            },
        ),
    ]);
    spec
}
