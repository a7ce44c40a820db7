//! Revert computation.
//!
//! Given the state an entity had before an operation was applied, produce the
//! operations that undo it. Pure; the commit pipeline snapshots before-states
//! from the graph store and records the result in the audit log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{OpType, Operation, DEFAULT_EDGE_TYPE, IDENTITY_KEYS};

/// An edge attached to a node snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    pub rel_type: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// Stored state of a node or relationship at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
    Node {
        uid: String,
        label: String,
        properties: BTreeMap<String, Value>,
        /// Incident edges, needed to restore a deleted node.
        #[serde(default)]
        edges: Vec<EdgeState>,
    },
    Rel(EdgeState),
}

impl EntityState {
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        match self {
            EntityState::Node { properties, .. } => properties,
            EntityState::Rel(edge) => &edge.properties,
        }
    }
}

/// The operations that undo `op`, given the entity state before it ran.
pub fn revert_operation(before: Option<&EntityState>, op: &Operation) -> Vec<Operation> {
    let revert_id = format!("{}:revert", op.op_id);
    match (op.op_type, before) {
        (OpType::CreateNode | OpType::MergeNode, None) => op
            .node_uid()
            .map(|uid| vec![Operation::new(revert_id, OpType::DeleteNode).with_target(uid)])
            .unwrap_or_default(),

        (OpType::CreateRel | OpType::MergeRel, None) => rel_address(op)
            .map(|(typ, from, to)| {
                vec![Operation::rel(revert_id, OpType::DeleteRel, &typ, &from, &to)]
            })
            .unwrap_or_default(),

        (
            OpType::CreateNode | OpType::MergeNode | OpType::UpdateNode,
            Some(EntityState::Node {
                uid, properties, ..
            }),
        ) => {
            let restore = restore_delta(properties, op);
            if restore.is_empty() {
                return Vec::new();
            }
            let mut inverse = Operation::new(revert_id, OpType::UpdateNode).with_target(uid.as_str());
            inverse.properties_delta = restore;
            vec![inverse]
        }

        (
            OpType::CreateRel | OpType::MergeRel | OpType::UpdateRel,
            Some(EntityState::Rel(edge)),
        ) => {
            let restore = restore_delta(&edge.properties, op);
            if restore.is_empty() {
                return Vec::new();
            }
            let mut inverse = Operation::rel(revert_id, OpType::UpdateRel, &edge.rel_type, &edge.from, &edge.to);
            inverse.properties_delta.extend(restore);
            vec![inverse]
        }

        (
            OpType::DeleteNode,
            Some(EntityState::Node {
                uid,
                label,
                properties,
                edges,
            }),
        ) => {
            let mut node = Operation::node(revert_id.clone(), OpType::CreateNode, label, uid);
            for (k, v) in properties {
                if !IDENTITY_KEYS.contains(&k.as_str()) {
                    node.properties_delta.insert(k.clone(), v.clone());
                }
            }
            let mut restored = vec![node];
            for (i, edge) in edges.iter().enumerate() {
                restored.push(recreate_edge(format!("{revert_id}:{i}"), edge));
            }
            restored
        }

        (OpType::DeleteRel, Some(EntityState::Rel(edge))) => {
            vec![recreate_edge(revert_id, edge)]
        }

        // Updates and deletes of entities that did not exist changed nothing.
        _ => Vec::new(),
    }
}

/// Inverses of `operations`, last operation first.
///
/// `befores[i]` is the state of the entity `operations[i]` addresses, as
/// read before any of the operations were applied.
pub fn revert_operations(befores: &[Option<EntityState>], operations: &[Operation]) -> Vec<Operation> {
    operations
        .iter()
        .enumerate()
        .rev()
        .flat_map(|(i, op)| revert_operation(befores.get(i).and_then(Option::as_ref), op))
        .collect()
}

/// Prior values of every key `op` writes; absent keys restore to null.
fn restore_delta(prior: &BTreeMap<String, Value>, op: &Operation) -> BTreeMap<String, Value> {
    op.payload_properties()
        .into_keys()
        .map(|k| {
            let v = prior.get(&k).cloned().unwrap_or(Value::Null);
            (k, v)
        })
        .collect()
}

fn rel_address(op: &Operation) -> Option<(String, String, String)> {
    let (from, to) = op.rel_endpoints()?;
    let typ = op.declared_type().unwrap_or(DEFAULT_EDGE_TYPE);
    Some((typ.to_string(), from.to_string(), to.to_string()))
}

fn recreate_edge(op_id: String, edge: &EdgeState) -> Operation {
    let mut op = Operation::rel(op_id, OpType::CreateRel, &edge.rel_type, &edge.from, &edge.to);
    for (k, v) in &edge.properties {
        if !IDENTITY_KEYS.contains(&k.as_str()) {
            op.properties_delta.insert(k.clone(), v.clone());
        }
    }
    op
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_state(uid: &str, props: &[(&str, Value)]) -> EntityState {
        EntityState::Node {
            uid: uid.into(),
            label: "Concept".into(),
            properties: props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn create_of_new_node_reverts_to_delete() {
        let op = Operation::node("o1", OpType::CreateNode, "Concept", "C1").with_prop("title", "x");
        let inv = revert_operation(None, &op);
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].op_type, OpType::DeleteNode);
        assert_eq!(inv[0].target_id.as_deref(), Some("C1"));
    }

    #[test]
    fn merge_over_existing_node_restores_prior_values() {
        let before = node_state("C1", &[("title", json!("old"))]);
        let op = Operation::node("o1", OpType::MergeNode, "Concept", "C1")
            .with_prop("title", "new")
            .with_prop("level", 3);
        let inv = revert_operation(Some(&before), &op);
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].op_type, OpType::UpdateNode);
        assert_eq!(inv[0].properties_delta.get("title"), Some(&json!("old")));
        assert_eq!(inv[0].properties_delta.get("level"), Some(&Value::Null));
        assert!(!inv[0].properties_delta.contains_key("uid"));
    }

    #[test]
    fn create_rel_reverts_to_delete_rel() {
        let op = Operation::rel("o1", OpType::CreateRel, "BASED_ON", "S1", "C1");
        let inv = revert_operation(None, &op);
        assert_eq!(inv[0].op_type, OpType::DeleteRel);
        assert_eq!(inv[0].rel_endpoints(), Some(("S1", "C1")));
        assert_eq!(inv[0].declared_type(), Some("BASED_ON"));
    }

    #[test]
    fn delete_node_restores_node_and_edges() {
        let before = EntityState::Node {
            uid: "S1".into(),
            label: "Skill".into(),
            properties: [("uid".to_string(), json!("S1")), ("title".to_string(), json!("Add"))]
                .into_iter()
                .collect(),
            edges: vec![EdgeState {
                rel_type: "BASED_ON".into(),
                from: "S1".into(),
                to: "C1".into(),
                properties: BTreeMap::new(),
            }],
        };
        let op = Operation::new("d1", OpType::DeleteNode).with_target("S1");
        let inv = revert_operation(Some(&before), &op);
        assert_eq!(inv.len(), 2);
        assert_eq!(inv[0].op_type, OpType::CreateNode);
        assert_eq!(inv[0].declared_type(), Some("Skill"));
        assert_eq!(inv[0].properties_delta.get("title"), Some(&json!("Add")));
        assert_eq!(inv[1].op_type, OpType::CreateRel);
        assert_eq!(inv[1].rel_endpoints(), Some(("S1", "C1")));
    }

    #[test]
    fn update_or_delete_of_missing_entity_has_no_inverse() {
        let upd = Operation::new("u1", OpType::UpdateNode).with_target("X").with_prop("a", 1);
        let del = Operation::new("d1", OpType::DeleteRel).with_target("A|LINKED|B");
        assert!(revert_operation(None, &upd).is_empty());
        assert!(revert_operation(None, &del).is_empty());
    }

    #[test]
    fn inverses_come_back_in_reverse_order() {
        let ops = vec![
            Operation::node("o1", OpType::CreateNode, "Concept", "C1"),
            Operation::node("o2", OpType::CreateNode, "Skill", "S1"),
        ];
        let inv = revert_operations(&[None, None], &ops);
        let targets: Vec<_> = inv.iter().map(|o| o.target_id.as_deref().unwrap()).collect();
        assert_eq!(targets, vec!["S1", "C1"]);
    }

    #[test]
    fn entity_state_tags_kind() {
        let v = serde_json::to_value(node_state("C1", &[])).unwrap();
        assert_eq!(v["kind"], "NODE");
    }
}
