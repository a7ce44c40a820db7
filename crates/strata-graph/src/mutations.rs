//! Write operations for the graph.
//!
//! Every changeset is applied inside one Neo4j transaction. Nodes are
//! identified by (tenant_id, uid); labels and relationship types are taken
//! from the canon enums only, never from raw operation strings, so they can
//! be interpolated into Cypher safely. Property maps travel as JSON and are
//! merged with `apoc.convert.fromJsonMap`; a null value removes the key.

use chrono::Utc;
use neo4rs::{query, Query};

use strata_core::types::{EdgeType, OpType, Operation, TenantId, EVIDENCED_BY, SOURCE_CHUNK_LABEL};

use crate::client::{GraphClient, GraphError, Result};
use crate::store::{node_uid, upsert_label, RelAddress};

impl GraphClient {
    /// Apply a changeset in a single transaction, rolling back on any failure.
    pub async fn apply_operations(&self, tenant: &TenantId, ops: &[Operation]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut queries = Vec::new();
        for op in ops {
            queries.extend(operation_queries(tenant, op, &now)?);
        }

        let mut txn = self.start_txn().await?;
        for q in queries {
            if let Err(e) = txn.run(q).await {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback after failed graph write also failed");
                }
                return Err(e.into());
            }
        }
        txn.commit().await?;

        tracing::debug!(tenant_id = %tenant, operations = ops.len(), "Applied changeset to Neo4j");
        Ok(())
    }
}

/// The queries that carry out one operation, evidence linking included.
pub fn operation_queries(tenant: &TenantId, op: &Operation, now: &str) -> Result<Vec<Query>> {
    let props = props_json(op)?;
    let mut out = Vec::with_capacity(2);

    match op.op_type {
        OpType::CreateNode | OpType::MergeNode => {
            let label = upsert_label(op)?;
            let uid = node_uid(op)?;
            out.push(
                query(&node_upsert_cypher(label.as_str()))
                    .param("tenant_id", tenant.as_str().to_string())
                    .param("uid", uid.to_string())
                    .param("props", props)
                    .param("now", now.to_string()),
            );
            if let Some(q) = evidence_query(tenant, op, uid) {
                out.push(q);
            }
        }
        OpType::UpdateNode => {
            out.push(
                query(NODE_UPDATE_CYPHER)
                    .param("tenant_id", tenant.as_str().to_string())
                    .param("uid", node_uid(op)?.to_string())
                    .param("props", props)
                    .param("now", now.to_string()),
            );
        }
        OpType::DeleteNode => {
            out.push(
                query(NODE_DELETE_CYPHER)
                    .param("tenant_id", tenant.as_str().to_string())
                    .param("uid", node_uid(op)?.to_string()),
            );
        }
        OpType::CreateRel | OpType::MergeRel => {
            let RelAddress::Endpoints { rel_type, from, to } = RelAddress::from_operation(op)? else {
                return Err(GraphError::Unaddressable {
                    op_id: op.op_id.clone(),
                    reason: "relationship upsert needs endpoints".to_string(),
                });
            };
            let rel_type = rel_type.unwrap_or(EdgeType::Linked);
            let uid = op.rel_uid().unwrap_or_else(|| format!("{from}|{rel_type}|{to}"));
            out.push(
                query(&rel_upsert_cypher(rel_type.as_str()))
                    .param("tenant_id", tenant.as_str().to_string())
                    .param("from", from.clone())
                    .param("to", to.clone())
                    .param("uid", uid)
                    .param("props", props)
                    .param("now", now.to_string()),
            );
            if let Some(q) = evidence_query(tenant, op, &from) {
                out.push(q);
            }
        }
        OpType::UpdateRel => {
            let addr = RelAddress::from_operation(op)?;
            let cypher = format!(
                "{}
                 SET r += apoc.convert.fromJsonMap($props)
                 SET r.updated_at = $now",
                rel_match_cypher(&addr)
            );
            out.push(
                bind_rel_address(query(&cypher), &addr)
                    .param("tenant_id", tenant.as_str().to_string())
                    .param("props", props)
                    .param("now", now.to_string()),
            );
        }
        OpType::DeleteRel => {
            let addr = RelAddress::from_operation(op)?;
            let cypher = format!("{}\n DELETE r", rel_match_cypher(&addr));
            out.push(
                bind_rel_address(query(&cypher), &addr)
                    .param("tenant_id", tenant.as_str().to_string()),
            );
        }
    }

    Ok(out)
}

/// MERGE a node by (label, tenant, uid), stamping lifecycle metadata once.
pub fn node_upsert_cypher(label: &str) -> String {
    format!(
        "MERGE (n:{label} {{tenant_id: $tenant_id, uid: $uid}})
         ON CREATE SET n.created_at = $now
         SET n += apoc.convert.fromJsonMap($props)
         SET n.lifecycle_status = coalesce(n.lifecycle_status, 'ACTIVE'),
             n.updated_at = $now"
    )
}

const NODE_UPDATE_CYPHER: &str = "MATCH (n {tenant_id: $tenant_id, uid: $uid})
     SET n += apoc.convert.fromJsonMap($props)
     SET n.updated_at = $now";

const NODE_DELETE_CYPHER: &str = "MATCH (n {tenant_id: $tenant_id, uid: $uid})
     DETACH DELETE n";

/// MERGE a typed edge between two existing nodes of the tenant.
pub fn rel_upsert_cypher(rel_type: &str) -> String {
    format!(
        "MATCH (a {{tenant_id: $tenant_id, uid: $from}})
         MATCH (b {{tenant_id: $tenant_id, uid: $to}})
         MERGE (a)-[r:{rel_type}]->(b)
         ON CREATE SET r.tenant_id = $tenant_id, r.created_at = $now
         SET r += apoc.convert.fromJsonMap($props)
         SET r.uid = coalesce(r.uid, $uid),
             r.lifecycle_status = coalesce(r.lifecycle_status, 'ACTIVE'),
             r.updated_at = $now"
    )
}

/// MATCH clause binding `r` for an addressed relationship.
pub fn rel_match_cypher(addr: &RelAddress) -> String {
    match addr {
        RelAddress::Endpoints { rel_type, .. } => {
            let typed = rel_type.map(|t| format!(":{}", t.as_str())).unwrap_or_default();
            format!(
                "MATCH (a {{tenant_id: $tenant_id, uid: $from}})-[r{typed}]->(b {{tenant_id: $tenant_id, uid: $to}})"
            )
        }
        RelAddress::Uid(_) => {
            "MATCH (a)-[r {tenant_id: $tenant_id, uid: $rel_uid}]->(b)".to_string()
        }
    }
}

pub fn bind_rel_address(q: Query, addr: &RelAddress) -> Query {
    match addr {
        RelAddress::Endpoints { from, to, .. } => q.param("from", from.clone()).param("to", to.clone()),
        RelAddress::Uid(uid) => q.param("rel_uid", uid.clone()),
    }
}

/// MERGE the source-chunk node for `op`'s evidence and link `anchor_uid` to it.
fn evidence_query(tenant: &TenantId, op: &Operation, anchor_uid: &str) -> Option<Query> {
    if !op.evidence.is_complete() {
        return None;
    }
    let chunk_id = op.evidence.source_chunk_id.as_deref()?;
    let quote = op.evidence.quote.as_deref()?;
    Some(
        query(&evidence_cypher())
            .param("tenant_id", tenant.as_str().to_string())
            .param("uid", anchor_uid.to_string())
            .param("chunk_id", chunk_id.to_string())
            .param("quote", quote.to_string()),
    )
}

pub fn evidence_cypher() -> String {
    format!(
        "MATCH (n {{tenant_id: $tenant_id, uid: $uid}})
         MERGE (c:{SOURCE_CHUNK_LABEL} {{tenant_id: $tenant_id, uid: $chunk_id}})
         SET c.quote = $quote
         MERGE (n)-[:{EVIDENCED_BY}]->(c)"
    )
}

fn props_json(op: &Operation) -> Result<String> {
    serde_json::to_string(&op.payload_properties()).map_err(|e| GraphError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::Evidence;

    #[test]
    fn node_upsert_merges_on_tenant_and_uid() {
        let cypher = node_upsert_cypher("Skill");
        assert!(cypher.contains("MERGE (n:Skill {tenant_id: $tenant_id, uid: $uid})"));
        assert!(cypher.contains("lifecycle_status = coalesce(n.lifecycle_status, 'ACTIVE')"));
        assert!(cypher.contains("ON CREATE SET n.created_at = $now"));
    }

    #[test]
    fn rel_match_uses_canon_type_only() {
        let addr = RelAddress::Endpoints {
            rel_type: Some(EdgeType::BasedOn),
            from: "S1".into(),
            to: "C1".into(),
        };
        assert!(rel_match_cypher(&addr).contains("-[r:BASED_ON]->"));
        let untyped = RelAddress::Endpoints { rel_type: None, from: "a".into(), to: "b".into() };
        assert!(rel_match_cypher(&untyped).contains("-[r]->"));
        assert!(rel_match_cypher(&RelAddress::Uid("x".into())).contains("uid: $rel_uid"));
    }

    #[test]
    fn evidence_links_to_source_chunk() {
        let cypher = evidence_cypher();
        assert!(cypher.contains("MERGE (c:SourceChunk {tenant_id: $tenant_id, uid: $chunk_id})"));
        assert!(cypher.contains("MERGE (n)-[:EVIDENCED_BY]->(c)"));
    }

    #[test]
    fn upserts_emit_evidence_query() {
        let tenant = TenantId::new("t1");
        let with = Operation::node("o1", OpType::CreateNode, "Concept", "C1")
            .with_evidence(Evidence::new("chunk-1", "quote"));
        assert_eq!(operation_queries(&tenant, &with, "now").unwrap().len(), 2);

        let update = Operation::new("o2", OpType::UpdateNode).with_target("C1").with_prop("t", 1);
        assert_eq!(operation_queries(&tenant, &update, "now").unwrap().len(), 1);
    }

    #[test]
    fn invalid_label_fails_before_any_query() {
        let tenant = TenantId::new("t1");
        let op = Operation::node("o1", OpType::CreateNode, "Widget) DETACH DELETE (x", "C1");
        assert!(matches!(
            operation_queries(&tenant, &op, "now"),
            Err(GraphError::InvalidType(_))
        ));
    }
}
