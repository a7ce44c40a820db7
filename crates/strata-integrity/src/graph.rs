//! In-memory prerequisite graph for cycle detection.
//!
//! Builds a compact adjacency list over PREREQ edges only, with dense
//! indices for cheap traversal.

use std::collections::{BTreeSet, HashMap};

use strata_core::changeset::ChangeEdge;
use strata_core::types::EdgeType;

/// The PREREQ subgraph of a changeset plus its store context.
#[derive(Debug, Default)]
pub struct PrereqGraph {
    /// Node uids, indexed by dense index.
    pub ids: Vec<String>,
    /// Adjacency list: `adjacency[i]` = sorted, deduplicated successors of `i`.
    pub adjacency: Vec<Vec<usize>>,
    /// Map from node uid to dense index.
    pub node_index: HashMap<String, usize>,
}

impl PrereqGraph {
    /// Build from any edges; non-PREREQ edges are ignored.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a ChangeEdge>) -> Self {
        let mut graph = Self::default();
        let mut successors: Vec<BTreeSet<usize>> = Vec::new();

        for edge in edges {
            if edge.rel_type != EdgeType::Prereq.as_str() {
                continue;
            }
            let from = graph.intern(&edge.from, &mut successors);
            let to = graph.intern(&edge.to, &mut successors);
            successors[from].insert(to);
        }

        graph.adjacency = successors
            .into_iter()
            .map(|s| s.into_iter().collect())
            .collect();
        graph
    }

    fn intern(&mut self, uid: &str, successors: &mut Vec<BTreeSet<usize>>) -> usize {
        if let Some(&idx) = self.node_index.get(uid) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(uid.to_string());
        self.node_index.insert(uid.to_string(), idx);
        successors.push(BTreeSet::new());
        idx
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Marks every node reachable from `starts`, the starts included.
    pub fn reachable_from(&self, starts: impl IntoIterator<Item = usize>) -> Vec<bool> {
        walk(&self.adjacency, starts)
    }

    /// Marks every node from which one of `targets` is reachable.
    pub fn reaching(&self, targets: impl IntoIterator<Item = usize>) -> Vec<bool> {
        let mut reverse = vec![Vec::new(); self.node_count()];
        for (from, succ) in self.adjacency.iter().enumerate() {
            for &to in succ {
                reverse[to].push(from);
            }
        }
        walk(&reverse, targets)
    }
}

fn walk(adjacency: &[Vec<usize>], starts: impl IntoIterator<Item = usize>) -> Vec<bool> {
    let mut seen = vec![false; adjacency.len()];
    let mut stack: Vec<usize> = Vec::new();
    for s in starts {
        if !seen[s] {
            seen[s] = true;
            stack.push(s);
        }
    }
    while let Some(node) = stack.pop() {
        for &next in &adjacency[node] {
            if !seen[next] {
                seen[next] = true;
                stack.push(next);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_prereq_edges_and_dedupes() {
        let edges = vec![
            ChangeEdge::new("PREREQ", "A", "B"),
            ChangeEdge::new("PREREQ", "A", "B"),
            ChangeEdge::new("CONTAINS", "B", "C"),
            ChangeEdge::new("PREREQ", "B", "A"),
        ];
        let g = PrereqGraph::from_edges(&edges);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.adjacency[g.node_index["A"]], vec![g.node_index["B"]]);
    }

    #[test]
    fn reachability_in_both_directions() {
        let edges = vec![
            ChangeEdge::new("PREREQ", "A", "B"),
            ChangeEdge::new("PREREQ", "B", "C"),
            ChangeEdge::new("PREREQ", "D", "C"),
        ];
        let g = PrereqGraph::from_edges(&edges);
        let idx = |uid: &str| g.node_index[uid];

        let forward = g.reachable_from([idx("B")]);
        assert!(forward[idx("B")] && forward[idx("C")]);
        assert!(!forward[idx("A")] && !forward[idx("D")]);

        let backward = g.reaching([idx("C")]);
        assert!(backward.iter().all(|&r| r));
        let backward = g.reaching([idx("A")]);
        assert!(backward[idx("A")] && !backward[idx("B")]);
    }
}
