//! Review diffs, impact subgraphs and audit lookups. Read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use strata_core::revert::{EdgeState, EntityState};
use strata_core::types::{
    ChangeType, Evidence, OpType, Operation, ProposalId, ProposalStatus, TenantId, DEFAULT_EDGE_TYPE,
    DEFAULT_NODE_LABEL,
};
use strata_graph::{GraphStore, Subgraph};
use strata_ledger::{AuditRecord, LedgerStore};

use crate::error::Result;

/// Looks up the text of an evidence chunk.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn chunk_text(&self, tenant: &TenantId, chunk_id: &str) -> Result<Option<String>>;
}

#[async_trait]
impl ChunkSource for LedgerStore {
    async fn chunk_text(&self, tenant: &TenantId, chunk_id: &str) -> Result<Option<String>> {
        Ok(LedgerStore::chunk_text(self, tenant, chunk_id).await?)
    }
}

/// Before/after view of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct DiffItem {
    pub op_id: String,
    pub op_type: OpType,
    pub kind: ChangeType,
    pub key: String,
    pub before: Option<EntityState>,
    pub after: Option<EntityState>,
    pub evidence: Evidence,
    /// Text of the evidence chunk, when the chunk store has it.
    pub evidence_chunk: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalDiff {
    pub proposal_id: ProposalId,
    pub tenant_id: TenantId,
    pub status: ProposalStatus,
    pub items: Vec<DiffItem>,
}

type NeighborKey = (TenantId, String, u32);

pub struct DiffBuilder {
    ledger: LedgerStore,
    graph: Arc<dyn GraphStore>,
    chunks: Arc<dyn ChunkSource>,
    neighbor_cache: DashMap<NeighborKey, (Instant, Subgraph)>,
    cache_ttl: Duration,
}

impl DiffBuilder {
    pub fn new(
        ledger: LedgerStore,
        graph: Arc<dyn GraphStore>,
        chunks: Arc<dyn ChunkSource>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            graph,
            chunks,
            neighbor_cache: DashMap::new(),
            cache_ttl,
        }
    }

    /// Per-operation diff of a proposal against the current graph.
    ///
    /// Each `before` is read from the store as it is now; `after` is the
    /// state the operation would leave on its own.
    pub async fn build_diff(&self, id: &ProposalId) -> Result<ProposalDiff> {
        let proposal = self.ledger.require_proposal(id).await?.proposal;
        let tenant = &proposal.tenant_id;

        let mut items = Vec::with_capacity(proposal.operations.len());
        for op in &proposal.operations {
            let before = self.graph.snapshot(tenant, op).await?;
            let after = project_after(before.as_ref(), op);
            let evidence_chunk = match op.evidence.source_chunk_id.as_deref() {
                Some(chunk_id) => self.chunks.chunk_text(tenant, chunk_id).await?,
                None => None,
            };
            items.push(DiffItem {
                op_id: op.op_id.clone(),
                op_type: op.op_type,
                kind: op.op_type.change_type(),
                key: op.target_key().unwrap_or_else(|| op.op_id.clone()),
                before,
                after,
                evidence: op.evidence.clone(),
                evidence_chunk,
            });
        }

        Ok(ProposalDiff {
            proposal_id: proposal.proposal_id.clone(),
            tenant_id: proposal.tenant_id.clone(),
            status: proposal.status,
            items,
        })
    }

    /// Stored neighborhood, `depth` hops out, of every entity a proposal touches.
    pub async fn impact_subgraph(&self, id: &ProposalId, depth: u32) -> Result<Subgraph> {
        let proposal = self.ledger.require_proposal(id).await?.proposal;

        let mut anchors = BTreeSet::new();
        for op in &proposal.operations {
            if op.op_type.is_node() {
                if let Some(uid) = op.node_uid() {
                    anchors.insert(uid.to_string());
                }
            } else if let Some((from, to)) = op.rel_endpoints() {
                anchors.insert(from.to_string());
                anchors.insert(to.to_string());
            }
        }

        let mut subgraph = Subgraph::default();
        for uid in anchors {
            subgraph.merge(self.cached_neighbors(&proposal.tenant_id, &uid, depth).await?);
        }
        Ok(subgraph)
    }

    async fn cached_neighbors(&self, tenant: &TenantId, uid: &str, depth: u32) -> Result<Subgraph> {
        let key = (tenant.clone(), uid.to_string(), depth);
        let cached = self
            .neighbor_cache
            .get(&key)
            .filter(|entry| entry.0.elapsed() < self.cache_ttl)
            .map(|entry| entry.1.clone());
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let fresh = self.graph.neighbors(tenant, uid, depth).await?;
        self.neighbor_cache.insert(key, (Instant::now(), fresh.clone()));
        Ok(fresh)
    }

    /// Drop cached neighborhoods older than the TTL. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        let before = self.neighbor_cache.len();
        self.neighbor_cache
            .retain(|_, (at, _)| at.elapsed() < self.cache_ttl);
        before.saturating_sub(self.neighbor_cache.len())
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn cached_entries(&self) -> usize {
        self.neighbor_cache.len()
    }

    /// Audit rows recorded for a proposal.
    pub async fn audit_for(&self, id: &ProposalId) -> Result<Vec<AuditRecord>> {
        Ok(self.ledger.list_audit_for_proposal(id).await?)
    }
}

/// The state `op` would leave behind, given `before`.
fn project_after(before: Option<&EntityState>, op: &Operation) -> Option<EntityState> {
    let delta = op.payload_properties();
    match (op.op_type, before) {
        (OpType::DeleteNode | OpType::DeleteRel, _) => None,
        (OpType::UpdateNode | OpType::UpdateRel, None) => None,

        (_, Some(EntityState::Node { uid, label, properties, edges })) => Some(EntityState::Node {
            uid: uid.clone(),
            label: op
                .declared_type()
                .filter(|_| op.op_type.is_upsert())
                .unwrap_or(label.as_str())
                .to_string(),
            properties: patched(properties, delta),
            edges: edges.clone(),
        }),

        (_, Some(EntityState::Rel(edge))) => Some(EntityState::Rel(EdgeState {
            properties: patched(&edge.properties, delta),
            ..edge.clone()
        })),

        (OpType::CreateNode | OpType::MergeNode, None) => Some(EntityState::Node {
            uid: op.node_uid().unwrap_or_default().to_string(),
            label: op.declared_type().unwrap_or(DEFAULT_NODE_LABEL).to_string(),
            properties: patched(&BTreeMap::new(), delta),
            edges: Vec::new(),
        }),

        (OpType::CreateRel | OpType::MergeRel, None) => {
            let (from, to) = op.rel_endpoints().unwrap_or_default();
            Some(EntityState::Rel(EdgeState {
                rel_type: op.declared_type().unwrap_or(DEFAULT_EDGE_TYPE).to_string(),
                from: from.to_string(),
                to: to.to_string(),
                properties: patched(&BTreeMap::new(), delta),
            }))
        }
    }
}

fn patched(base: &BTreeMap<String, Value>, delta: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut out = base.clone();
    for (k, v) in delta {
        if v.is_null() {
            out.remove(&k);
        } else {
            out.insert(k, v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_graph::MemoryGraph;

    async fn setup() -> (DiffBuilder, LedgerStore, Arc<MemoryGraph>) {
        let ledger = LedgerStore::memory().await.unwrap();
        let graph = Arc::new(MemoryGraph::new());
        let builder = DiffBuilder::new(
            ledger.clone(),
            graph.clone(),
            Arc::new(ledger.clone()),
            Duration::from_secs(60),
        );
        (builder, ledger, graph)
    }

    #[test]
    fn after_state_of_update_patches_before() {
        let before = EntityState::Node {
            uid: "C1".into(),
            label: "Concept".into(),
            properties: BTreeMap::from([
                ("title".to_string(), json!("old")),
                ("note".to_string(), json!("drop me")),
            ]),
            edges: vec![],
        };
        let op = Operation::new("o1", OpType::UpdateNode)
            .with_target("C1")
            .with_prop("title", "new")
            .with_prop("note", Value::Null);

        let after = project_after(Some(&before), &op).unwrap();
        assert_eq!(after.properties().get("title"), Some(&json!("new")));
        assert!(!after.properties().contains_key("note"));
    }

    #[test]
    fn after_state_of_create_and_delete() {
        let create = Operation::rel("o1", OpType::CreateRel, "PREREQ", "A", "B").with_prop("weight", 2);
        let Some(EntityState::Rel(edge)) = project_after(None, &create) else {
            panic!("expected a relationship");
        };
        assert_eq!((edge.rel_type.as_str(), edge.from.as_str()), ("PREREQ", "A"));
        assert_eq!(edge.properties.get("weight"), Some(&json!(2)));

        let delete = Operation::new("o2", OpType::DeleteNode).with_target("A");
        assert!(project_after(None, &delete).is_none());
        let update_missing = Operation::new("o3", OpType::UpdateNode).with_target("Z").with_prop("x", 1);
        assert!(project_after(None, &update_missing).is_none());
    }

    #[tokio::test]
    async fn diff_reads_before_state_and_chunk_text() {
        let (builder, ledger, graph) = setup().await;
        let tenant = TenantId::new("t1");
        graph
            .apply(
                &tenant,
                &[Operation::node("seed", OpType::CreateNode, "Concept", "C1").with_prop("title", "old")],
            )
            .await
            .unwrap();
        ledger.put_chunk(&tenant, "chunk-9", "The full passage.").await.unwrap();

        let ops = vec![Operation::node("o1", OpType::MergeNode, "Concept", "C1")
            .with_prop("title", "new")
            .with_evidence(Evidence::new("chunk-9", "passage"))];
        let proposal = strata_core::proposal::create_draft(tenant.clone(), 0, ops).unwrap();
        ledger.insert_proposal(&proposal).await.unwrap();

        let diff = builder.build_diff(&proposal.proposal_id).await.unwrap();
        let item = &diff.items[0];
        assert_eq!(item.key, "C1");
        assert_eq!(item.kind, ChangeType::Node);
        assert_eq!(item.before.as_ref().unwrap().properties()["title"], "old");
        assert_eq!(item.after.as_ref().unwrap().properties()["title"], "new");
        assert_eq!(item.evidence_chunk.as_deref(), Some("The full passage."));

        // Nothing was written.
        let now = graph.snapshot_node(&tenant, "C1").await.unwrap().unwrap();
        assert_eq!(now.properties()["title"], "old");
    }

    #[tokio::test]
    async fn impact_uses_cached_neighborhoods() {
        let (builder, ledger, graph) = setup().await;
        let tenant = TenantId::new("t1");
        graph
            .apply(
                &tenant,
                &[
                    Operation::node("a", OpType::CreateNode, "Concept", "A"),
                    Operation::node("b", OpType::CreateNode, "Concept", "B"),
                    Operation::rel("ab", OpType::CreateRel, "PREREQ", "A", "B"),
                ],
            )
            .await
            .unwrap();

        let ops = vec![Operation::new("o1", OpType::UpdateNode).with_target("A").with_prop("x", 1)];
        let proposal = strata_core::proposal::create_draft(tenant.clone(), 0, ops).unwrap();
        ledger.insert_proposal(&proposal).await.unwrap();

        let sub = builder.impact_subgraph(&proposal.proposal_id, 1).await.unwrap();
        assert_eq!(sub.edges.len(), 1);
        assert_eq!(builder.cached_entries(), 1);

        // A later graph change is not visible until the entry expires.
        graph
            .apply(&tenant, &[Operation::new("d", OpType::DeleteNode).with_target("B")])
            .await
            .unwrap();
        let again = builder.impact_subgraph(&proposal.proposal_id, 1).await.unwrap();
        assert_eq!(again.edges.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let ledger = LedgerStore::memory().await.unwrap();
        let graph = Arc::new(MemoryGraph::new());
        let builder = DiffBuilder::new(ledger.clone(), graph, Arc::new(ledger), Duration::ZERO);
        builder
            .cached_neighbors(&TenantId::new("t1"), "A", 1)
            .await
            .unwrap();
        assert_eq!(builder.evict_expired(), 1);
        assert_eq!(builder.cached_entries(), 0);
        assert_eq!(builder.evict_expired(), 0);
    }
}
