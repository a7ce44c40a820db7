//! Read operations for the graph, and the [`GraphStore`] implementation
//! backed by Neo4j.

use std::collections::BTreeMap;

use async_trait::async_trait;
use neo4rs::query;
use serde_json::Value;

use strata_core::changeset::ChangeEdge;
use strata_core::revert::{EdgeState, EntityState};
use strata_core::types::{EdgeType, Operation, TenantId, EVIDENCED_BY, SOURCE_CHUNK_LABEL};

use crate::client::{GraphClient, GraphError, Result};
use crate::mutations::{bind_rel_address, rel_match_cypher};
use crate::store::{EdgeRecord, GraphStore, NodeRecord, RelAddress, Subgraph, MAX_NEIGHBOR_DEPTH};

impl GraphClient {
    // ── Snapshots ────────────────────────────────────────────────

    /// Read a node with its properties and incident (non-evidence) edges.
    pub async fn get_node_state(&self, tenant: &TenantId, uid: &str) -> Result<Option<EntityState>> {
        let cypher = format!(
            "MATCH (n {{tenant_id: $tenant_id, uid: $uid}})
             WHERE NOT n:{SOURCE_CHUNK_LABEL}
             OPTIONAL MATCH (n)-[r]-(m {{tenant_id: $tenant_id}})
             WHERE type(r) <> '{EVIDENCED_BY}'
             WITH n, collect(CASE WHEN r IS NULL THEN NULL ELSE apoc.convert.toJson({{
               rel_type: type(r), from: startNode(r).uid, to: endNode(r).uid,
               properties: properties(r)
             }}) END) AS edges
             RETURN labels(n) AS labels, apoc.convert.toJson(properties(n)) AS props, edges
             LIMIT 1"
        );

        let q = query(&cypher)
            .param("tenant_id", tenant.as_str().to_string())
            .param("uid", uid.to_string());

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };

        let labels: Vec<String> = row.get("labels").unwrap_or_default();
        let props: String = row
            .get("props")
            .map_err(|e| GraphError::Serialization(format!("Failed to read node properties: {e}")))?;
        let edge_json: Vec<String> = row.get("edges").unwrap_or_default();

        let mut edges = Vec::with_capacity(edge_json.len());
        for raw in edge_json {
            let mut edge: EdgeState = serde_json::from_str(&raw)
                .map_err(|e| GraphError::Serialization(format!("Failed to decode edge: {e}")))?;
            edge.properties.remove("tenant_id");
            edges.push(edge);
        }

        Ok(Some(EntityState::Node {
            uid: uid.to_string(),
            label: labels.into_iter().next().unwrap_or_default(),
            properties: decode_props(&props)?,
            edges,
        }))
    }

    /// Read a relationship and its properties.
    pub async fn get_rel_state(&self, tenant: &TenantId, addr: &RelAddress) -> Result<Option<EntityState>> {
        let cypher = format!(
            "{}
             RETURN type(r) AS rel_type, a.uid AS from_uid, b.uid AS to_uid,
                    apoc.convert.toJson(properties(r)) AS props
             LIMIT 1",
            rel_match_cypher(addr)
        );
        let q = bind_rel_address(query(&cypher), addr).param("tenant_id", tenant.as_str().to_string());

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };
        let props: String = row
            .get("props")
            .map_err(|e| GraphError::Serialization(format!("Failed to read edge properties: {e}")))?;

        Ok(Some(EntityState::Rel(EdgeState {
            rel_type: row.get("rel_type").unwrap_or_default(),
            from: row.get("from_uid").unwrap_or_default(),
            to: row.get("to_uid").unwrap_or_default(),
            properties: decode_props(&props)?,
        })))
    }

    // ── Neighborhoods ────────────────────────────────────────────

    /// Every edge on a path of up to `depth` hops from `uid`, evidence excluded.
    pub async fn get_neighbors(&self, tenant: &TenantId, uid: &str, depth: u32) -> Result<Subgraph> {
        let depth = depth.clamp(1, MAX_NEIGHBOR_DEPTH);
        let cypher = format!(
            "MATCH p = (s {{tenant_id: $tenant_id, uid: $uid}})-[*1..{depth}]-(x)
             WHERE none(n IN nodes(p) WHERE n:{SOURCE_CHUNK_LABEL})
             UNWIND relationships(p) AS r
             WITH DISTINCT r
             RETURN type(r) AS rel_type,
                    startNode(r).uid AS from_uid, endNode(r).uid AS to_uid,
                    labels(startNode(r)) AS from_labels, labels(endNode(r)) AS to_labels"
        );

        let q = query(&cypher)
            .param("tenant_id", tenant.as_str().to_string())
            .param("uid", uid.to_string());

        let rows = self.query_rows(q).await?;
        let mut nodes = Vec::new();
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let from: String = row.get("from_uid").unwrap_or_default();
            let to: String = row.get("to_uid").unwrap_or_default();
            let from_labels: Vec<String> = row.get("from_labels").unwrap_or_default();
            let to_labels: Vec<String> = row.get("to_labels").unwrap_or_default();
            nodes.push(NodeRecord {
                uid: from.clone(),
                label: from_labels.into_iter().next().unwrap_or_default(),
            });
            nodes.push(NodeRecord {
                uid: to.clone(),
                label: to_labels.into_iter().next().unwrap_or_default(),
            });
            edges.push(EdgeRecord {
                rel_type: row.get("rel_type").unwrap_or_default(),
                from,
                to,
            });
        }

        let mut subgraph = Subgraph::default();
        subgraph.merge(Subgraph { nodes, edges });
        Ok(subgraph)
    }

    /// All PREREQ edges for a tenant, for cycle checks against the stored graph.
    pub async fn get_prereq_edges(&self, tenant: &TenantId) -> Result<Vec<ChangeEdge>> {
        let cypher = format!(
            "MATCH (a {{tenant_id: $tenant_id}})-[:{}]->(b {{tenant_id: $tenant_id}})
             RETURN a.uid AS from_uid, b.uid AS to_uid",
            EdgeType::Prereq.as_str()
        );
        let q = query(&cypher).param("tenant_id", tenant.as_str().to_string());

        let rows = self.query_rows(q).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let from: String = row.get("from_uid").unwrap_or_default();
                let to: String = row.get("to_uid").unwrap_or_default();
                ChangeEdge::new(EdgeType::Prereq.as_str(), &from, &to)
            })
            .collect())
    }
}

fn decode_props(raw: &str) -> Result<BTreeMap<String, Value>> {
    let mut props: BTreeMap<String, Value> = serde_json::from_str(raw)
        .map_err(|e| GraphError::Serialization(format!("Failed to decode properties: {e}")))?;
    props.remove("tenant_id");
    Ok(props)
}

// ── GraphStore ───────────────────────────────────────────────────

#[async_trait]
impl GraphStore for GraphClient {
    async fn snapshot_node(&self, tenant: &TenantId, uid: &str) -> Result<Option<EntityState>> {
        self.get_node_state(tenant, uid).await
    }

    async fn snapshot_rel(&self, tenant: &TenantId, addr: &RelAddress) -> Result<Option<EntityState>> {
        self.get_rel_state(tenant, addr).await
    }

    async fn apply(&self, tenant: &TenantId, ops: &[Operation]) -> Result<()> {
        self.apply_operations(tenant, ops).await
    }

    async fn neighbors(&self, tenant: &TenantId, uid: &str, depth: u32) -> Result<Subgraph> {
        self.get_neighbors(tenant, uid, depth).await
    }

    async fn prereq_edges(&self, tenant: &TenantId) -> Result<Vec<ChangeEdge>> {
        self.get_prereq_edges(tenant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_props_drops_tenant() {
        let props = decode_props(r#"{"tenant_id":"t1","uid":"C1","title":"x"}"#).unwrap();
        assert!(!props.contains_key("tenant_id"));
        assert_eq!(props.get("title"), Some(&json!("x")));
    }

    #[test]
    fn decode_props_rejects_non_objects() {
        assert!(decode_props("[1,2]").is_err());
    }
}
