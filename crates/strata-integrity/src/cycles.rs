//! Simple-cycle enumeration over the prerequisite graph.

use serde::{Deserialize, Serialize};

use crate::graph::PrereqGraph;

/// One simple cycle: its nodes in order and every edge along it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// Enumerate every simple cycle, up to `max_cycles`.
///
/// Each cycle is found exactly once, rooted at its lowest-index node: the
/// DFS from `start` only walks nodes with a higher index and records a cycle
/// whenever an edge returns to `start`. A self-loop is a one-node cycle.
pub fn simple_cycles(graph: &PrereqGraph, max_cycles: usize) -> Vec<Cycle> {
    simple_cycles_matching(graph, max_cycles, |_| true)
}

/// Like [`simple_cycles`], keeping only cycles accepted by `keep`. Rejected
/// cycles do not count towards `max_cycles`.
pub fn simple_cycles_matching(graph: &PrereqGraph, max_cycles: usize, mut keep: impl FnMut(&Cycle) -> bool) -> Vec<Cycle> {
    let n = graph.node_count();
    let mut cycles = Vec::new();
    let mut on_path = vec![false; n];

    for start in 0..n {
        let mut path = vec![start];
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        on_path[start] = true;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&next) = graph.adjacency[node].get(frame.1) else {
                stack.pop();
                path.pop();
                on_path[node] = false;
                continue;
            };
            frame.1 += 1;

            if next == start {
                let cycle = to_cycle(graph, &path);
                if keep(&cycle) {
                    cycles.push(cycle);
                    if cycles.len() >= max_cycles {
                        return cycles;
                    }
                }
                continue;
            }
            if next < start || on_path[next] {
                continue;
            }
            on_path[next] = true;
            path.push(next);
            stack.push((next, 0));
        }
    }

    cycles
}

fn to_cycle(graph: &PrereqGraph, path: &[usize]) -> Cycle {
    let nodes: Vec<String> = path.iter().map(|&i| graph.ids[i].clone()).collect();
    let edges = (0..nodes.len())
        .map(|i| (nodes[i].clone(), nodes[(i + 1) % nodes.len()].clone()))
        .collect();
    Cycle { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::changeset::ChangeEdge;

    fn graph(pairs: &[(&str, &str)]) -> PrereqGraph {
        let edges: Vec<ChangeEdge> = pairs
            .iter()
            .map(|(a, b)| ChangeEdge::new("PREREQ", a, b))
            .collect();
        PrereqGraph::from_edges(&edges)
    }

    #[test]
    fn three_node_cycle_reports_three_edges() {
        let cycles = simple_cycles(&graph(&[("A", "B"), ("B", "C"), ("C", "A")]), 100);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, vec!["A", "B", "C"]);
        assert_eq!(
            cycles[0].edges,
            vec![
                ("A".to_string(), "B".to_string()),
                ("B".to_string(), "C".to_string()),
                ("C".to_string(), "A".to_string()),
            ]
        );
    }

    #[test]
    fn self_loop_is_one_node_cycle() {
        let cycles = simple_cycles(&graph(&[("A", "A")]), 100);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, vec!["A"]);
        assert_eq!(cycles[0].edges, vec![("A".to_string(), "A".to_string())]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let cycles = simple_cycles(&graph(&[("A", "B"), ("B", "C"), ("A", "C")]), 100);
        assert!(cycles.is_empty());
    }

    #[test]
    fn overlapping_cycles_are_each_reported_once() {
        let cycles = simple_cycles(
            &graph(&[("A", "B"), ("B", "A"), ("B", "C"), ("C", "B"), ("C", "A")]),
            100,
        );
        // A-B-A, B-C-B, and A-B-C-A.
        assert_eq!(cycles.len(), 3);
        let mut sizes: Vec<usize> = cycles.iter().map(|c| c.nodes.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 2, 3]);
    }

    #[test]
    fn filter_keeps_only_matching_cycles() {
        let g = graph(&[("A", "B"), ("B", "A"), ("B", "C"), ("C", "B")]);
        let cycles = simple_cycles_matching(&g, 1, |c| c.nodes.contains(&"C".to_string()));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, vec!["B", "C"]);
    }

    #[test]
    fn enumeration_respects_cap() {
        let cycles = simple_cycles(
            &graph(&[("A", "B"), ("B", "A"), ("B", "C"), ("C", "B"), ("C", "A")]),
            2,
        );
        assert_eq!(cycles.len(), 2);
    }
}
