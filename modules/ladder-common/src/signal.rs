//! Namespaced, typed signals.
//!
//! A signal key is `<namespace>.<name>`. The namespace decides the evaluation
//! layer (`meta*` runs in the second pass) and the scope (`*.node` namespaces
//! carry one value per tracked node). Values are either categorical labels or
//! numbers; booleans travel as the labels `"true"` / `"false"`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SignalKeyError;
use crate::types::{DepthLabel, NodeId, Phase};

// --- Namespaces ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Graph,
    GraphNode,
    Llm,
    Temporal,
    TechniqueNode,
    Meta,
    MetaNode,
}

impl Namespace {
    /// Longest prefix first, so `graph.node.x` never parses as `graph` + `node.x`.
    const BY_PREFIX_LEN: [Namespace; 7] = [
        Namespace::TechniqueNode,
        Namespace::GraphNode,
        Namespace::MetaNode,
        Namespace::Temporal,
        Namespace::Graph,
        Namespace::Meta,
        Namespace::Llm,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Graph => "graph",
            Namespace::GraphNode => "graph.node",
            Namespace::Llm => "llm",
            Namespace::Temporal => "temporal",
            Namespace::TechniqueNode => "technique.node",
            Namespace::Meta => "meta",
            Namespace::MetaNode => "meta.node",
        }
    }

    /// Node-scoped namespaces carry one value per tracked node.
    pub fn is_node_scoped(self) -> bool {
        matches!(
            self,
            Namespace::GraphNode | Namespace::TechniqueNode | Namespace::MetaNode
        )
    }

    /// Meta namespaces are evaluated in the second pass.
    pub fn is_meta(self) -> bool {
        matches!(self, Namespace::Meta | Namespace::MetaNode)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

// --- Keys ---

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalKey {
    namespace: Namespace,
    name: String,
}

impl SignalKey {
    /// Build a key from a typed namespace. Used for built-in signals.
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Parse a dotted key such as `graph.node.exhausted`.
    pub fn parse(raw: &str) -> Result<Self, SignalKeyError> {
        for ns in Namespace::BY_PREFIX_LEN {
            let Some(rest) = raw
                .strip_prefix(ns.prefix())
                .and_then(|r| r.strip_prefix('.'))
            else {
                continue;
            };
            if !is_valid_name(rest) {
                return Err(SignalKeyError::InvalidName(raw.to_string()));
            }
            return Ok(Self::new(ns, rest));
        }
        Err(SignalKeyError::UnknownNamespace(raw.to_string()))
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_node_scoped(&self) -> bool {
        self.namespace.is_node_scoped()
    }

    pub fn is_meta(&self) -> bool {
        self.namespace.is_meta()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
}

impl std::fmt::Display for SignalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace.prefix(), self.name)
    }
}

impl FromStr for SignalKey {
    type Err = SignalKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKey::parse(s)
    }
}

impl Serialize for SignalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SignalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SignalKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Keys of the built-in detectors.
pub mod keys {
    use super::{Namespace, SignalKey};

    macro_rules! key {
        ($fn_name:ident, $ns:ident, $name:literal) => {
            pub fn $fn_name() -> SignalKey {
                SignalKey::new(Namespace::$ns, $name)
            }
        };
    }

    key!(node_count, Graph, "node_count");
    key!(edge_count, Graph, "edge_count");
    key!(orphan_count, Graph, "orphan_count");
    key!(max_depth, Graph, "max_depth");
    key!(avg_depth, Graph, "avg_depth");

    key!(node_exhausted, GraphNode, "exhausted");
    key!(node_exhaustion_score, GraphNode, "exhaustion_score");
    key!(node_focus_streak, GraphNode, "focus_streak");
    key!(node_turns_since_last_yield, GraphNode, "turns_since_last_yield");
    key!(node_turns_since_last_focus, GraphNode, "turns_since_last_focus");
    key!(node_is_orphan, GraphNode, "is_orphan");
    key!(node_is_current_focus, GraphNode, "is_current_focus");
    key!(node_recency_score, GraphNode, "recency_score");
    key!(node_depth, GraphNode, "depth");

    key!(response_depth, Llm, "response_depth");
    key!(valence, Llm, "valence");
    key!(hedging_language, Llm, "hedging_language");
    key!(response_quality_trend, Llm, "response_quality_trend");

    key!(strategy_repetition_count, Temporal, "strategy_repetition_count");
    key!(turns_since_strategy_change, Temporal, "turns_since_strategy_change");

    key!(node_strategy_repetition, TechniqueNode, "strategy_repetition");
    key!(node_strategy_diversity, TechniqueNode, "strategy_diversity");

    key!(interview_phase, Meta, "interview.phase");
    key!(interview_progress, Meta, "interview.progress");

    key!(node_opportunity, MetaNode, "opportunity");
}

// --- Values ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Numeric(f64),
    Categorical(String),
}

impl SignalValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            SignalValue::Numeric(v) => Some(*v),
            SignalValue::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            SignalValue::Categorical(v) => Some(v),
            SignalValue::Numeric(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SignalValue::Numeric(_) => "numeric",
            SignalValue::Categorical(_) => "categorical",
        }
    }
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalValue::Numeric(v) => write!(f, "{v}"),
            SignalValue::Categorical(v) => f.write_str(v),
        }
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Numeric(v)
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Categorical(if v { "true" } else { "false" }.to_string())
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Categorical(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::Categorical(v)
    }
}

impl From<DepthLabel> for SignalValue {
    fn from(v: DepthLabel) -> Self {
        SignalValue::Categorical(v.as_str().to_string())
    }
}

impl From<Phase> for SignalValue {
    fn from(v: Phase) -> Self {
        SignalValue::Categorical(v.as_str().to_string())
    }
}

/// Output of one detector for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Global(SignalValue),
    PerNode(BTreeMap<NodeId, SignalValue>),
}

// --- Shapes & catalog ---

/// What a registered signal may hold. Checked when strategy weights are
/// resolved and when detector output is accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalShape {
    Numeric,
    /// Allowed labels; empty means an open vocabulary.
    Categorical(Vec<String>),
}

impl SignalShape {
    pub fn categorical(labels: &[&str]) -> Self {
        SignalShape::Categorical(labels.iter().map(|l| l.to_string()).collect())
    }

    pub fn boolean() -> Self {
        Self::categorical(&["true", "false"])
    }

    pub fn accepts(&self, value: &SignalValue) -> bool {
        match (self, value) {
            (SignalShape::Numeric, SignalValue::Numeric(v)) => v.is_finite(),
            (SignalShape::Categorical(labels), SignalValue::Categorical(v)) => {
                labels.is_empty() || labels.iter().any(|l| l == v)
            }
            _ => false,
        }
    }

    pub fn allows_label(&self, label: &str) -> bool {
        match self {
            SignalShape::Numeric => false,
            SignalShape::Categorical(labels) => labels.is_empty() || labels.iter().any(|l| l == label),
        }
    }
}

/// Every signal a pool can produce, with its shape.
#[derive(Debug, Clone, Default)]
pub struct SignalCatalog {
    entries: BTreeMap<SignalKey, SignalShape>,
}

impl SignalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous shape if the key was already present.
    pub fn insert(&mut self, key: SignalKey, shape: SignalShape) -> Option<SignalShape> {
        self.entries.insert(key, shape)
    }

    pub fn get(&self, key: &SignalKey) -> Option<&SignalShape> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SignalKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SignalKey, &SignalShape)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Free,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    PerResponse,
    PerTurn,
    PerSession,
}

// --- Bag ---

/// All signals computed for one turn. Never outlives the turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalBag {
    global: BTreeMap<SignalKey, SignalValue>,
    per_node: BTreeMap<SignalKey, BTreeMap<NodeId, SignalValue>>,
}

impl SignalBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SignalKey, signal: Signal) {
        match signal {
            Signal::Global(value) => {
                self.global.insert(key, value);
            }
            Signal::PerNode(values) => {
                self.per_node.insert(key, values);
            }
        }
    }

    pub fn insert_global(&mut self, key: SignalKey, value: impl Into<SignalValue>) {
        self.global.insert(key, value.into());
    }

    pub fn insert_node_value(&mut self, key: SignalKey, node: NodeId, value: impl Into<SignalValue>) {
        self.per_node.entry(key).or_default().insert(node, value.into());
    }

    pub fn global(&self, key: &SignalKey) -> Option<&SignalValue> {
        self.global.get(key)
    }

    pub fn node_map(&self, key: &SignalKey) -> Option<&BTreeMap<NodeId, SignalValue>> {
        self.per_node.get(key)
    }

    pub fn node_value(&self, key: &SignalKey, node: &NodeId) -> Option<&SignalValue> {
        self.per_node.get(key).and_then(|m| m.get(node))
    }

    /// Value of `key` as seen for `node`: a node-scoped value wins over a
    /// global value with the same key.
    pub fn lookup(&self, key: &SignalKey, node: Option<&NodeId>) -> Option<&SignalValue> {
        node.and_then(|n| self.node_value(key, n))
            .or_else(|| self.global.get(key))
    }

    pub fn numeric(&self, key: &SignalKey) -> Option<f64> {
        self.global.get(key).and_then(SignalValue::as_numeric)
    }

    pub fn categorical(&self, key: &SignalKey) -> Option<&str> {
        self.global.get(key).and_then(SignalValue::as_categorical)
    }

    pub fn contains(&self, key: &SignalKey) -> bool {
        self.global.contains_key(key) || self.per_node.contains_key(key)
    }

    pub fn extend(&mut self, other: SignalBag) {
        self.global.extend(other.global);
        self.per_node.extend(other.per_node);
    }

    pub fn global_entries(&self) -> impl Iterator<Item = (&SignalKey, &SignalValue)> {
        self.global.iter()
    }

    pub fn node_entries(&self) -> impl Iterator<Item = (&SignalKey, &BTreeMap<NodeId, SignalValue>)> {
        self.per_node.iter()
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefers_longest_namespace() {
        let key = SignalKey::parse("graph.node.exhausted").unwrap();
        assert_eq!(key.namespace(), Namespace::GraphNode);
        assert_eq!(key.name(), "exhausted");

        let key = SignalKey::parse("graph.node_count").unwrap();
        assert_eq!(key.namespace(), Namespace::Graph);
        assert_eq!(key.name(), "node_count");

        let key = SignalKey::parse("meta.interview.phase").unwrap();
        assert_eq!(key.namespace(), Namespace::Meta);
        assert_eq!(key.name(), "interview.phase");
    }

    #[test]
    fn parse_rejects_unknown_namespace_and_bad_names() {
        assert_eq!(
            SignalKey::parse("grpah.node_count"),
            Err(SignalKeyError::UnknownNamespace("grpah.node_count".into()))
        );
        assert!(matches!(
            SignalKey::parse("llm."),
            Err(SignalKeyError::InvalidName(_))
        ));
        assert!(matches!(
            SignalKey::parse("llm.Response"),
            Err(SignalKeyError::InvalidName(_))
        ));
        assert!(matches!(
            SignalKey::parse("llm.a..b"),
            Err(SignalKeyError::InvalidName(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for key in [keys::node_exhausted(), keys::interview_phase(), keys::node_strategy_diversity()] {
            assert_eq!(SignalKey::parse(&key.to_string()).unwrap(), key);
        }
    }

    #[test]
    fn node_value_takes_precedence_over_global() {
        let key = SignalKey::new(Namespace::Graph, "shared");
        let x = NodeId::from("x");
        let y = NodeId::from("y");
        let mut bag = SignalBag::new();
        bag.insert_global(key.clone(), 1.0);
        bag.insert_node_value(key.clone(), x.clone(), 5.0);

        assert_eq!(bag.lookup(&key, Some(&x)), Some(&SignalValue::Numeric(5.0)));
        assert_eq!(bag.lookup(&key, Some(&y)), Some(&SignalValue::Numeric(1.0)));
        assert_eq!(bag.lookup(&key, None), Some(&SignalValue::Numeric(1.0)));
    }

    #[test]
    fn boolean_shape_accepts_only_true_false() {
        let shape = SignalShape::boolean();
        assert!(shape.accepts(&true.into()));
        assert!(shape.accepts(&SignalValue::from("false")));
        assert!(!shape.accepts(&SignalValue::from("maybe")));
        assert!(!shape.accepts(&SignalValue::Numeric(1.0)));
    }

    #[test]
    fn numeric_shape_rejects_nan() {
        assert!(!SignalShape::Numeric.accepts(&SignalValue::Numeric(f64::NAN)));
    }

    #[test]
    fn bag_serializes_keys_as_dotted_strings() {
        let mut bag = SignalBag::new();
        bag.insert_global(keys::node_count(), 3.0);
        bag.insert_node_value(keys::node_exhausted(), NodeId::from("n1"), false);
        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json["global"]["graph.node_count"], 3.0);
        assert_eq!(json["per_node"]["graph.node.exhausted"]["n1"], "false");
    }
}
