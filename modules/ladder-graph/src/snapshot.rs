use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use ladder_common::{GraphEdge, GraphNode, NodeId};

/// In/out edge counts of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Degree {
    pub incoming: u32,
    pub outgoing: u32,
}

impl Degree {
    pub fn total(&self) -> u32 {
        self.incoming + self.outgoing
    }
}

/// The committed graph state for the turn being scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self { nodes, edges }
    }

    /// Distinct node ids. A node listed twice counts once.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(|n| &n.id).collect::<HashSet<_>>().len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Degree of every listed node. Edges whose endpoints are not listed are
    /// skipped.
    pub fn degrees(&self) -> BTreeMap<NodeId, Degree> {
        let (degrees, dangling) = self.count_degrees();
        if dangling > 0 {
            warn!(dangling, "Skipped edges referencing unlisted nodes");
        }
        degrees
    }

    /// Nodes with no incident listed edge.
    pub fn orphan_count(&self) -> usize {
        let (degrees, _) = self.count_degrees();
        degrees.values().filter(|d| d.total() == 0).count()
    }

    fn count_degrees(&self) -> (BTreeMap<NodeId, Degree>, usize) {
        let mut degrees: BTreeMap<NodeId, Degree> = self
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Degree::default()))
            .collect();

        let mut dangling = 0usize;
        for edge in &self.edges {
            if !degrees.contains_key(&edge.source) || !degrees.contains_key(&edge.target) {
                dangling += 1;
                continue;
            }
            if let Some(d) = degrees.get_mut(&edge.source) {
                d.outgoing += 1;
            }
            if let Some(d) = degrees.get_mut(&edge.target) {
                d.incoming += 1;
            }
        }
        (degrees, dangling)
    }
}
