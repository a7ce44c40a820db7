//! Changeset planning: temp-id resolution, touched targets, and the plain
//! node/edge view the integrity checker runs on.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    generate_node_uid, Operation, Target, DEFAULT_EDGE_TYPE, DEFAULT_NODE_LABEL,
};

/// Keys that may hold a reference to another node's uid.
const REFERENCE_KEYS: [&str; 5] = ["uid", "from_uid", "to_uid", "start_uid", "end_uid"];

/// Assign real uids to temp ids and rewrite every reference to them.
///
/// Returns the rewritten operations and the `temp_id -> uid` mapping.
pub fn resolve_temp_ids(operations: &[Operation]) -> (Vec<Operation>, HashMap<String, String>) {
    let mut mapping = HashMap::new();
    for op in operations {
        if !(op.op_type.is_node() && op.op_type.is_upsert()) {
            continue;
        }
        let Some(temp) = op.temp_id.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let has_uid = op
            .properties_delta
            .get("uid")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        let has_target = op.target_id.as_deref().is_some_and(|s| !s.is_empty());
        if !has_uid && !has_target {
            mapping
                .entry(temp.to_string())
                .or_insert_with(generate_node_uid);
        }
    }

    if mapping.is_empty() {
        return (operations.to_vec(), mapping);
    }

    let resolved = operations
        .iter()
        .map(|op| {
            let mut op = op.clone();
            if let Some(real) = op.temp_id.as_ref().and_then(|t| mapping.get(t)) {
                if op.op_type.is_node() && op.op_type.is_upsert() {
                    op.target_id = Some(real.clone());
                    op.properties_delta
                        .insert("uid".to_string(), Value::String(real.clone()));
                }
            }
            if let Some(real) = op.target_id.as_ref().and_then(|t| mapping.get(t)) {
                op.target_id = Some(real.clone());
            }
            rewrite_refs(&mut op.properties_delta, &mapping);
            rewrite_refs(&mut op.match_criteria, &mapping);
            op
        })
        .collect();

    (resolved, mapping)
}

fn rewrite_refs(map: &mut BTreeMap<String, Value>, mapping: &HashMap<String, String>) {
    for key in REFERENCE_KEYS {
        let replacement = match map.get(key) {
            Some(Value::String(current)) => mapping.get(current).cloned(),
            _ => None,
        };
        if let Some(real) = replacement {
            map.insert(key.to_string(), Value::String(real));
        }
    }
}

/// Every id touched by `operations`, deduplicated in first-seen order.
pub fn touched_targets(operations: &[Operation]) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for op in operations {
        if let Some(id) = op.target_key() {
            if seen.insert(id.clone()) {
                targets.push(Target {
                    id,
                    change_type: op.op_type.change_type(),
                });
            }
        }
    }
    targets
}

/// A node introduced by the changeset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNode {
    pub uid: String,
    pub label: String,
}

/// An edge introduced by the changeset, or already present in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEdge {
    pub rel_type: String,
    pub from: String,
    pub to: String,
}

impl ChangeEdge {
    pub fn new(rel_type: &str, from: &str, to: &str) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Plain node/edge collections the integrity rules run on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub nodes: Vec<ChangeNode>,
    pub edges: Vec<ChangeEdge>,
    /// Edges that already exist in the store. They extend paths for the cycle
    /// check and are neither validated nor counted in [`size`](Self::size).
    #[serde(default)]
    pub context_edges: Vec<ChangeEdge>,
}

impl Changeset {
    /// Collect the nodes and edges created or merged by `operations`.
    ///
    /// A node upserted twice keeps the last label it was given.
    pub fn from_operations(operations: &[Operation]) -> Self {
        let mut nodes: Vec<ChangeNode> = Vec::new();
        let mut node_index: HashMap<String, usize> = HashMap::new();
        let mut edges = Vec::new();
        let mut edge_seen = HashSet::new();

        for op in operations.iter().filter(|op| op.op_type.is_upsert()) {
            if op.op_type.is_node() {
                let Some(uid) = op.node_uid() else { continue };
                let label = op.declared_type().unwrap_or(DEFAULT_NODE_LABEL).to_string();
                match node_index.get(uid) {
                    Some(&idx) => nodes[idx].label = label,
                    None => {
                        node_index.insert(uid.to_string(), nodes.len());
                        nodes.push(ChangeNode {
                            uid: uid.to_string(),
                            label,
                        });
                    }
                }
            } else if let Some((from, to)) = op.rel_endpoints() {
                let edge = ChangeEdge::new(op.declared_type().unwrap_or(DEFAULT_EDGE_TYPE), from, to);
                if edge_seen.insert(edge.clone()) {
                    edges.push(edge);
                }
            }
        }

        Self {
            nodes,
            edges,
            context_edges: Vec::new(),
        }
    }

    /// Add store-side edges to consider alongside the changeset's own.
    pub fn with_context_edges(mut self, edges: Vec<ChangeEdge>) -> Self {
        self.context_edges = edges;
        self
    }

    /// Number of introduced elements, the unit of integrity cost.
    pub fn size(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeType, OpType};

    #[test]
    fn temp_ids_resolve_and_references_follow() {
        let ops = vec![
            Operation::new("o1", OpType::CreateNode)
                .with_temp_id("tmp-skill")
                .with_prop("type", "Skill"),
            Operation::new("o2", OpType::CreateRel)
                .with_prop("type", "BASED_ON")
                .with_prop("from_uid", "tmp-skill")
                .with_prop("to_uid", "C1"),
        ];
        let (resolved, mapping) = resolve_temp_ids(&ops);
        let real = mapping.get("tmp-skill").unwrap();
        assert!(real.starts_with("N-"));
        assert_eq!(resolved[0].node_uid(), Some(real.as_str()));
        assert_eq!(resolved[0].target_id.as_deref(), Some(real.as_str()));
        assert_eq!(resolved[1].rel_endpoints(), Some((real.as_str(), "C1")));
    }

    #[test]
    fn temp_id_with_explicit_uid_is_left_alone() {
        let ops = vec![Operation::node("o1", OpType::CreateNode, "Concept", "C1").with_temp_id("tmp")];
        let (resolved, mapping) = resolve_temp_ids(&ops);
        assert!(mapping.is_empty());
        assert_eq!(resolved, ops);
    }

    #[test]
    fn touched_targets_dedupe_in_order() {
        let ops = vec![
            Operation::node("o1", OpType::CreateNode, "Concept", "C1"),
            Operation::node("o2", OpType::CreateNode, "Skill", "S1"),
            Operation::rel("o3", OpType::CreateRel, "BASED_ON", "S1", "C1"),
            Operation::new("o4", OpType::UpdateNode).with_target("C1"),
        ];
        let targets = touched_targets(&ops);
        let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "S1", "S1|BASED_ON|C1"]);
        assert_eq!(targets[2].change_type, ChangeType::Rel);
    }

    #[test]
    fn changeset_collects_upserts_only() {
        let ops = vec![
            Operation::new("o1", OpType::CreateNode).with_target("X1"),
            Operation::node("o2", OpType::MergeNode, "Skill", "S1"),
            Operation::rel("o3", OpType::MergeRel, "BASED_ON", "S1", "X1"),
            Operation::rel("o4", OpType::MergeRel, "BASED_ON", "S1", "X1"),
            Operation::new("o5", OpType::DeleteNode).with_target("Z"),
        ];
        let cs = Changeset::from_operations(&ops);
        assert_eq!(cs.nodes.len(), 2);
        assert_eq!(cs.nodes[0].label, "Concept");
        assert_eq!(cs.edges, vec![ChangeEdge::new("BASED_ON", "S1", "X1")]);
        assert_eq!(cs.size(), 3);

        let with_store = cs.with_context_edges(vec![
            ChangeEdge::new("PREREQ", "A", "B"),
            ChangeEdge::new("PREREQ", "B", "C"),
        ]);
        assert_eq!(with_store.size(), 3);
    }
}
