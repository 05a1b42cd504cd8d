use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Graph Types ---

/// Stable identifier of a knowledge-graph node, as assigned by the extraction
/// collaborator. Ordering is lexicographic and is used for tie-breaking.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A node of the interview knowledge graph (attribute, consequence, value...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphNode {
    pub id: NodeId,
    /// Methodology-defined node type, e.g. `attribute` or `terminal_value`.
    pub node_type: String,
    pub label: String,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: label.into(),
        }
    }
}

/// A directed reasoning link between two nodes (e.g. attribute -> consequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub edge_type: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: String::new(),
        }
    }
}

// --- Enums ---

/// Categorical depth of a respondent answer, as judged by the text-analysis
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepthLabel {
    Surface,
    Shallow,
    Moderate,
    Deep,
}

impl DepthLabel {
    pub const ALL: [DepthLabel; 4] = [
        DepthLabel::Surface,
        DepthLabel::Shallow,
        DepthLabel::Moderate,
        DepthLabel::Deep,
    ];

    /// Surface and shallow answers count towards exhaustion.
    pub fn is_shallow(self) -> bool {
        matches!(self, DepthLabel::Surface | DepthLabel::Shallow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DepthLabel::Surface => "surface",
            DepthLabel::Shallow => "shallow",
            DepthLabel::Moderate => "moderate",
            DepthLabel::Deep => "deep",
        }
    }
}

impl std::fmt::Display for DepthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepthLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "surface" => Ok(DepthLabel::Surface),
            "shallow" => Ok(DepthLabel::Shallow),
            "moderate" => Ok(DepthLabel::Moderate),
            "deep" => Ok(DepthLabel::Deep),
            other => Err(format!("unknown response depth '{other}'")),
        }
    }
}

/// Coarse interview stage, derived from node count alone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Early,
    Mid,
    Late,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Early, Phase::Mid, Phase::Late];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Early => "early",
            Phase::Mid => "mid",
            Phase::Late => "late",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "early" => Ok(Phase::Early),
            "mid" => Ok(Phase::Mid),
            "late" => Ok(Phase::Late),
            other => Err(format!("unknown interview phase '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_surface_and_shallow_count_as_shallow() {
        let shallow: Vec<_> = DepthLabel::ALL.iter().filter(|d| d.is_shallow()).collect();
        assert_eq!(shallow, vec![&DepthLabel::Surface, &DepthLabel::Shallow]);
    }

    #[test]
    fn depth_label_parses_its_display_form() {
        for label in DepthLabel::ALL {
            assert_eq!(label.to_string().parse::<DepthLabel>(), Ok(label));
        }
        assert!("profound".parse::<DepthLabel>().is_err());
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::Mid).unwrap();
        assert_eq!(json, "\"mid\"");
    }

    #[test]
    fn node_ids_order_lexicographically() {
        let mut ids = vec![NodeId::from("n10"), NodeId::from("n2"), NodeId::from("a")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("n10"), NodeId::from("n2")]);
    }
}
