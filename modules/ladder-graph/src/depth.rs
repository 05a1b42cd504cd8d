//! Chain depth of the interview graph.
//!
//! Algorithm:
//! 1. Build a directed adjacency list over listed nodes (dangling edges dropped)
//! 2. Roots are nodes with no incoming edge; if there are none, every node is a root
//! 3. Nodes no root reaches (root-less cyclic components) become roots as well
//! 4. From each root run a BFS that never revisits a node within that traversal
//! 5. `max_depth` is the largest distance seen in any traversal
//! 6. `avg_depth` is the mean over non-root nodes of their shortest distance
//!    from any root. A fully cyclic graph has only roots, so its `avg_depth`
//!    is 0
//!
//! Each traversal is O(V+E), so the whole computation is O(V×(V+E)). Longest
//! simple path is deliberately not computed: it is NP-hard and a few dozen
//! nodes are enough to make exhaustive search stall a turn.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use tracing::debug;

use ladder_common::NodeId;

use crate::snapshot::GraphSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthReport {
    pub max_depth: usize,
    pub avg_depth: f64,
    /// Shortest distance from the nearest root, for every listed node.
    pub node_depth: BTreeMap<NodeId, usize>,
    pub root_count: usize,
    /// True when every node had an incoming edge.
    pub fully_cyclic: bool,
}

pub struct GraphDepthComputer;

impl GraphDepthComputer {
    pub fn compute(snapshot: &GraphSnapshot) -> DepthReport {
        let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(snapshot.node_count());
        let mut ids: Vec<&NodeId> = Vec::with_capacity(snapshot.node_count());
        for node in &snapshot.nodes {
            if !index.contains_key(&node.id) {
                index.insert(&node.id, ids.len());
                ids.push(&node.id);
            }
        }

        let n = ids.len();
        if n == 0 {
            return DepthReport::default();
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0u32; n];
        for edge in &snapshot.edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) else {
                continue;
            };
            adjacency[from].push(to);
            indegree[to] += 1;
        }

        let mut roots: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let fully_cyclic = roots.is_empty();
        if fully_cyclic {
            roots = (0..n).collect();
        }

        let mut best: Vec<Option<usize>> = vec![None; n];
        let mut walk = Traversal::new(n);
        for &root in &roots {
            walk.run(root, &adjacency, &mut best);
        }

        // Components that only contain cycles are unreachable from any source root.
        let stranded: Vec<usize> = (0..n).filter(|&i| best[i].is_none()).collect();
        for &root in &stranded {
            walk.run(root, &adjacency, &mut best);
        }
        let root_count = roots.len() + stranded.len();

        let mut is_root = vec![false; n];
        for &root in roots.iter().chain(&stranded) {
            is_root[root] = true;
        }
        let depths: Vec<usize> = (0..n)
            .filter(|&i| !is_root[i])
            .filter_map(|i| best[i])
            .collect();
        let avg_depth = if depths.is_empty() {
            0.0
        } else {
            depths.iter().sum::<usize>() as f64 / depths.len() as f64
        };

        let node_depth = ids
            .iter()
            .zip(&best)
            .map(|(id, d)| ((*id).clone(), d.unwrap_or(0)))
            .collect();

        debug!(
            nodes = n,
            roots = root_count,
            max_depth = walk.max_depth,
            avg_depth,
            fully_cyclic,
            "Computed graph depth"
        );

        DepthReport {
            max_depth: walk.max_depth,
            avg_depth,
            node_depth,
            root_count,
            fully_cyclic,
        }
    }
}

/// Reusable BFS buffers plus the deepest distance seen over all traversals.
struct Traversal {
    visited: Vec<bool>,
    queue: VecDeque<(usize, usize)>,
    max_depth: usize,
}

impl Traversal {
    fn new(n: usize) -> Self {
        Self {
            visited: vec![false; n],
            queue: VecDeque::with_capacity(n),
            max_depth: 0,
        }
    }

    fn run(&mut self, root: usize, adjacency: &[Vec<usize>], best: &mut [Option<usize>]) {
        self.visited.fill(false);
        self.queue.clear();
        self.visited[root] = true;
        self.queue.push_back((root, 0));

        while let Some((node, dist)) = self.queue.pop_front() {
            self.max_depth = self.max_depth.max(dist);
            best[node] = Some(best[node].map_or(dist, |b| b.min(dist)));

            for &next in &adjacency[node] {
                if !self.visited[next] {
                    self.visited[next] = true;
                    self.queue.push_back((next, dist + 1));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_common::{GraphEdge, GraphNode};

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> GraphSnapshot {
        GraphSnapshot::new(
            nodes.iter().map(|id| GraphNode::new(*id, "concept", *id)).collect(),
            edges.iter().map(|(s, t)| GraphEdge::new(*s, *t)).collect(),
        )
    }

    #[test]
    fn empty_graph_has_zero_depth() {
        let report = GraphDepthComputer::compute(&GraphSnapshot::default());
        assert_eq!(report, DepthReport::default());
    }

    #[test]
    fn diamond_uses_shortest_distance_per_node() {
        // a -> b -> d, a -> c -> d, a -> d
        let report = GraphDepthComputer::compute(&graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "d"), ("a", "c"), ("c", "d"), ("a", "d")],
        ));
        assert_eq!(report.max_depth, 1);
        assert_eq!(report.node_depth[&NodeId::from("d")], 1);
        assert_eq!(report.root_count, 1);
    }

    #[test]
    fn stranded_cycle_is_traversed_from_each_of_its_nodes() {
        // a -> b is rooted; x -> y -> z -> x has no root.
        let report = GraphDepthComputer::compute(&graph(
            &["a", "b", "x", "y", "z"],
            &[("a", "b"), ("x", "y"), ("y", "z"), ("z", "x")],
        ));
        assert!(!report.fully_cyclic);
        assert_eq!(report.root_count, 4);
        assert_eq!(report.max_depth, 2);
        assert_eq!(report.node_depth[&NodeId::from("y")], 0);
    }

    #[test]
    fn avg_depth_averages_shortest_distances() {
        // a -> b -> c: b at 1, c at 2.
        let report = GraphDepthComputer::compute(&graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]));
        assert!((report.avg_depth - 1.5).abs() < 1e-12);
    }
}
