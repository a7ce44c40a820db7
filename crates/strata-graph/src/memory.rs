//! In-memory [`GraphStore`] with the same semantics as the Neo4j backend.
//!
//! Used by the pipeline's tests and by local runs without a graph server.
//! A changeset is applied to a copy of the tenant graph and swapped in only
//! when every operation succeeded.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use strata_core::changeset::ChangeEdge;
use strata_core::revert::{EdgeState, EntityState};
use strata_core::types::{EdgeType, OpType, Operation, TenantId, EVIDENCED_BY, SOURCE_CHUNK_LABEL};

use crate::client::{GraphError, Result};
use crate::store::{
    node_uid, upsert_label, EdgeRecord, GraphStore, NodeRecord, RelAddress, Subgraph, MAX_NEIGHBOR_DEPTH,
};

#[derive(Debug, Clone)]
struct MemNode {
    label: String,
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct TenantGraph {
    nodes: BTreeMap<String, MemNode>,
    rels: Vec<EdgeState>,
}

impl TenantGraph {
    fn find_rel(&self, addr: &RelAddress) -> Option<usize> {
        self.rels.iter().position(|r| match addr {
            RelAddress::Endpoints { rel_type, from, to } => {
                &r.from == from
                    && &r.to == to
                    && r.rel_type != EVIDENCED_BY
                    && rel_type.map_or(true, |t| r.rel_type == t.as_str())
            }
            RelAddress::Uid(uid) => r.properties.get("uid").and_then(Value::as_str) == Some(uid.as_str()),
        })
    }

    fn apply(&mut self, op: &Operation, now: &str) -> Result<()> {
        match op.op_type {
            OpType::CreateNode | OpType::MergeNode => {
                let label = upsert_label(op)?;
                let uid = node_uid(op)?.to_string();
                let node = self.nodes.entry(uid.clone()).or_insert_with(|| MemNode {
                    label: label.as_str().to_string(),
                    properties: BTreeMap::from([("created_at".to_string(), Value::from(now))]),
                });
                node.label = label.as_str().to_string();
                patch(&mut node.properties, op.payload_properties());
                node.properties.insert("uid".to_string(), Value::from(uid.clone()));
                stamp(&mut node.properties, now);
                self.link_evidence(op, &uid);
            }
            OpType::UpdateNode => {
                if let Some(node) = self.nodes.get_mut(node_uid(op)?) {
                    patch(&mut node.properties, op.payload_properties());
                    node.properties.insert("updated_at".to_string(), Value::from(now));
                }
            }
            OpType::DeleteNode => {
                let uid = node_uid(op)?;
                if self.nodes.remove(uid).is_some() {
                    self.rels.retain(|r| r.from != uid && r.to != uid);
                }
            }
            OpType::CreateRel | OpType::MergeRel => {
                let RelAddress::Endpoints { rel_type, from, to } = RelAddress::from_operation(op)? else {
                    return Err(GraphError::Unaddressable {
                        op_id: op.op_id.clone(),
                        reason: "relationship upsert needs endpoints".to_string(),
                    });
                };
                if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
                    return Ok(());
                }
                let rel_type = rel_type.unwrap_or(EdgeType::Linked);
                let addr = RelAddress::Endpoints {
                    rel_type: Some(rel_type),
                    from: from.clone(),
                    to: to.clone(),
                };
                let idx = match self.find_rel(&addr) {
                    Some(idx) => idx,
                    None => {
                        self.rels.push(EdgeState {
                            rel_type: rel_type.as_str().to_string(),
                            from: from.clone(),
                            to: to.clone(),
                            properties: BTreeMap::from([("created_at".to_string(), Value::from(now))]),
                        });
                        self.rels.len() - 1
                    }
                };
                let uid = op.rel_uid().unwrap_or_else(|| format!("{from}|{rel_type}|{to}"));
                let rel = &mut self.rels[idx];
                patch(&mut rel.properties, op.payload_properties());
                rel.properties.entry("uid".to_string()).or_insert(Value::from(uid));
                stamp(&mut rel.properties, now);
                self.link_evidence(op, &from);
            }
            OpType::UpdateRel => {
                if let Some(idx) = self.find_rel(&RelAddress::from_operation(op)?) {
                    let rel = &mut self.rels[idx];
                    patch(&mut rel.properties, op.payload_properties());
                    rel.properties.insert("updated_at".to_string(), Value::from(now));
                }
            }
            OpType::DeleteRel => {
                if let Some(idx) = self.find_rel(&RelAddress::from_operation(op)?) {
                    self.rels.remove(idx);
                }
            }
        }
        Ok(())
    }

    fn link_evidence(&mut self, op: &Operation, anchor: &str) {
        if !op.evidence.is_complete() {
            return;
        }
        let (Some(chunk_id), Some(quote)) = (&op.evidence.source_chunk_id, &op.evidence.quote) else {
            return;
        };
        let chunk = self.nodes.entry(chunk_id.clone()).or_insert_with(|| MemNode {
            label: SOURCE_CHUNK_LABEL.to_string(),
            properties: BTreeMap::new(),
        });
        chunk.properties.insert("quote".to_string(), Value::from(quote.as_str()));

        let exists = self
            .rels
            .iter()
            .any(|r| r.rel_type == EVIDENCED_BY && r.from == anchor && &r.to == chunk_id);
        if !exists {
            self.rels.push(EdgeState {
                rel_type: EVIDENCED_BY.to_string(),
                from: anchor.to_string(),
                to: chunk_id.clone(),
                properties: BTreeMap::new(),
            });
        }
    }

    fn is_evidence(&self, uid: &str) -> bool {
        self.nodes.get(uid).is_some_and(|n| n.label == SOURCE_CHUNK_LABEL)
    }
}

/// Null removes a key, anything else overwrites it.
fn patch(target: &mut BTreeMap<String, Value>, delta: BTreeMap<String, Value>) {
    for (k, v) in delta {
        if v.is_null() {
            target.remove(&k);
        } else {
            target.insert(k, v);
        }
    }
}

fn stamp(props: &mut BTreeMap<String, Value>, now: &str) {
    props
        .entry("lifecycle_status".to_string())
        .or_insert_with(|| Value::from("ACTIVE"));
    props.insert("updated_at".to_string(), Value::from(now));
}

/// Graph store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    tenants: RwLock<HashMap<TenantId, TenantGraph>>,
    failing_applies: AtomicUsize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `apply` fail as if the store were unreachable.
    pub fn fail_next_applies(&self, n: usize) {
        self.failing_applies.store(n, Ordering::SeqCst);
    }

    /// Number of canon nodes (source chunks excluded) stored for `tenant`.
    pub async fn node_count(&self, tenant: &TenantId) -> usize {
        let tenants = self.tenants.read().await;
        tenants.get(tenant).map_or(0, |g| {
            g.nodes.values().filter(|n| n.label != SOURCE_CHUNK_LABEL).count()
        })
    }

    /// Whether a relationship of `rel_type` from `from` to `to` exists.
    pub async fn has_rel(&self, tenant: &TenantId, rel_type: &str, from: &str, to: &str) -> bool {
        let tenants = self.tenants.read().await;
        tenants.get(tenant).is_some_and(|g| {
            g.rels
                .iter()
                .any(|r| r.rel_type == rel_type && r.from == from && r.to == to)
        })
    }

    /// Source-chunk ids linked to `uid` as evidence.
    pub async fn evidence_chunks(&self, tenant: &TenantId, uid: &str) -> Vec<String> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant).map_or_else(Vec::new, |g| {
            g.rels
                .iter()
                .filter(|r| r.rel_type == EVIDENCED_BY && r.from == uid)
                .map(|r| r.to.clone())
                .collect()
        })
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn snapshot_node(&self, tenant: &TenantId, uid: &str) -> Result<Option<EntityState>> {
        let tenants = self.tenants.read().await;
        let Some(graph) = tenants.get(tenant) else {
            return Ok(None);
        };
        let Some(node) = graph.nodes.get(uid).filter(|n| n.label != SOURCE_CHUNK_LABEL) else {
            return Ok(None);
        };
        let edges = graph
            .rels
            .iter()
            .filter(|r| r.rel_type != EVIDENCED_BY && (r.from == uid || r.to == uid))
            .cloned()
            .collect();
        Ok(Some(EntityState::Node {
            uid: uid.to_string(),
            label: node.label.clone(),
            properties: node.properties.clone(),
            edges,
        }))
    }

    async fn snapshot_rel(&self, tenant: &TenantId, addr: &RelAddress) -> Result<Option<EntityState>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .and_then(|g| g.find_rel(addr).map(|idx| EntityState::Rel(g.rels[idx].clone()))))
    }

    async fn apply(&self, tenant: &TenantId, ops: &[Operation]) -> Result<()> {
        let pending = self.failing_applies.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_applies.store(pending - 1, Ordering::SeqCst);
            return Err(GraphError::Unavailable("injected apply failure".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let mut tenants = self.tenants.write().await;
        let mut working = tenants.get(tenant).cloned().unwrap_or_default();
        for op in ops {
            working.apply(op, &now)?;
        }
        tenants.insert(tenant.clone(), working);
        Ok(())
    }

    async fn neighbors(&self, tenant: &TenantId, uid: &str, depth: u32) -> Result<Subgraph> {
        let depth = depth.clamp(1, MAX_NEIGHBOR_DEPTH);
        let tenants = self.tenants.read().await;
        let Some(graph) = tenants.get(tenant) else {
            return Ok(Subgraph::default());
        };
        if !graph.nodes.contains_key(uid) {
            return Ok(Subgraph::default());
        }

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen: HashMap<&str, u32> = HashMap::from([(uid, 0)]);
        let mut queue = VecDeque::from([uid]);

        while let Some(current) = queue.pop_front() {
            let hops = seen[current];
            if hops >= depth {
                continue;
            }
            for rel in graph.rels.iter().filter(|r| r.from == current || r.to == current) {
                if rel.rel_type == EVIDENCED_BY || graph.is_evidence(&rel.from) || graph.is_evidence(&rel.to) {
                    continue;
                }
                edges.push(EdgeRecord {
                    rel_type: rel.rel_type.clone(),
                    from: rel.from.clone(),
                    to: rel.to.clone(),
                });
                for end in [rel.from.as_str(), rel.to.as_str()] {
                    if let Some(node) = graph.nodes.get(end) {
                        nodes.push(NodeRecord {
                            uid: end.to_string(),
                            label: node.label.clone(),
                        });
                    }
                    if !seen.contains_key(end) {
                        seen.insert(end, hops + 1);
                        queue.push_back(end);
                    }
                }
            }
        }

        let mut subgraph = Subgraph::default();
        subgraph.merge(Subgraph { nodes, edges });
        Ok(subgraph)
    }

    async fn prereq_edges(&self, tenant: &TenantId) -> Result<Vec<ChangeEdge>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant).map_or_else(Vec::new, |g| {
            g.rels
                .iter()
                .filter(|r| r.rel_type == EdgeType::Prereq.as_str())
                .map(|r| ChangeEdge::new(&r.rel_type, &r.from, &r.to))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::types::Evidence;

    fn tenant() -> TenantId {
        TenantId::new("t1")
    }

    fn concept(uid: &str) -> Operation {
        Operation::node(format!("op-{uid}"), OpType::CreateNode, "Concept", uid)
            .with_evidence(Evidence::new("chunk-1", "quoted"))
    }

    #[tokio::test]
    async fn apply_stamps_lifecycle_and_links_evidence() {
        let g = MemoryGraph::new();
        g.apply(&tenant(), &[concept("C1").with_prop("title", "Fractions")])
            .await
            .unwrap();

        let Some(EntityState::Node { label, properties, .. }) = g.snapshot_node(&tenant(), "C1").await.unwrap() else {
            panic!("node missing");
        };
        assert_eq!(label, "Concept");
        assert_eq!(properties["lifecycle_status"], json!("ACTIVE"));
        assert_eq!(properties["title"], json!("Fractions"));
        assert!(properties.contains_key("created_at"));
        assert_eq!(g.evidence_chunks(&tenant(), "C1").await, vec!["chunk-1"]);
        assert_eq!(g.node_count(&tenant()).await, 1);
    }

    #[tokio::test]
    async fn failed_operation_leaves_graph_untouched() {
        let g = MemoryGraph::new();
        let bad = Operation::node("bad", OpType::CreateNode, "Widget", "W1");
        let err = g.apply(&tenant(), &[concept("C1"), bad]).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidType(_)));
        assert_eq!(g.node_count(&tenant()).await, 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let g = MemoryGraph::new();
        g.fail_next_applies(1);
        assert!(matches!(
            g.apply(&tenant(), &[concept("C1")]).await,
            Err(GraphError::Unavailable(_))
        ));
        g.apply(&tenant(), &[concept("C1")]).await.unwrap();
    }

    #[tokio::test]
    async fn rel_lifecycle_update_and_delete() {
        let g = MemoryGraph::new();
        let t = tenant();
        g.apply(
            &t,
            &[
                concept("A"),
                concept("B"),
                Operation::rel("r1", OpType::CreateRel, "PREREQ", "A", "B")
                    .with_evidence(Evidence::new("chunk-2", "A before B")),
            ],
        )
        .await
        .unwrap();
        assert!(g.has_rel(&t, "PREREQ", "A", "B").await);
        assert_eq!(g.prereq_edges(&t).await.unwrap().len(), 1);

        g.apply(&t, &[Operation::new("u1", OpType::UpdateRel).with_target("A|PREREQ|B").with_prop("weight", 2)])
            .await
            .unwrap();
        let Some(EntityState::Rel(edge)) = g
            .snapshot_rel(&t, &RelAddress::Uid("A|PREREQ|B".into()))
            .await
            .unwrap()
        else {
            panic!("edge missing");
        };
        assert_eq!(edge.properties["weight"], json!(2));

        g.apply(&t, &[Operation::new("d1", OpType::DeleteNode).with_target("A")])
            .await
            .unwrap();
        assert!(!g.has_rel(&t, "PREREQ", "A", "B").await);
    }

    #[tokio::test]
    async fn neighbors_skip_evidence_and_respect_depth() {
        let g = MemoryGraph::new();
        let t = tenant();
        g.apply(
            &t,
            &[
                concept("A"),
                concept("B"),
                concept("C"),
                Operation::rel("r1", OpType::CreateRel, "LINKED", "A", "B")
                    .with_evidence(Evidence::new("chunk-9", "q")),
                Operation::rel("r2", OpType::CreateRel, "LINKED", "B", "C")
                    .with_evidence(Evidence::new("chunk-9", "q")),
            ],
        )
        .await
        .unwrap();

        let one = g.neighbors(&t, "A", 1).await.unwrap();
        assert_eq!(one.edges.len(), 1);
        assert!(one.nodes.iter().all(|n| n.label != SOURCE_CHUNK_LABEL));

        let two = g.neighbors(&t, "A", 2).await.unwrap();
        assert_eq!(two.edges.len(), 2);
        assert_eq!(two.nodes.len(), 3);
    }

    #[tokio::test]
    async fn null_delta_removes_property() {
        let g = MemoryGraph::new();
        let t = tenant();
        g.apply(&t, &[concept("C1").with_prop("title", "x")]).await.unwrap();
        g.apply(&t, &[Operation::new("u", OpType::UpdateNode).with_target("C1").with_prop("title", Value::Null)])
            .await
            .unwrap();
        let state = g.snapshot_node(&t, "C1").await.unwrap().unwrap();
        assert!(!state.properties().contains_key("title"));
    }
}
