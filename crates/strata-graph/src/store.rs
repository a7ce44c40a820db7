//! The graph store contract used by the commit pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::changeset::ChangeEdge;
use strata_core::revert::EntityState;
use strata_core::types::{EdgeType, NodeType, Operation, TenantId, DEFAULT_NODE_LABEL};

use crate::client::{GraphError, Result};

/// Upper bound on neighborhood depth.
pub const MAX_NEIGHBOR_DEPTH: u32 = 5;

/// A node as seen by neighborhood queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uid: String,
    pub label: String,
}

/// An edge as seen by neighborhood queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub rel_type: String,
    pub from: String,
    pub to: String,
}

/// Result of a neighborhood query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Subgraph {
    /// Merge `other` into `self`, dropping duplicates and sorting.
    pub fn merge(&mut self, other: Subgraph) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.nodes.sort();
        self.nodes.dedup();
        self.edges.sort();
        self.edges.dedup();
    }
}

/// How a relationship operation locates its edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelAddress {
    /// By endpoints and, if known, type.
    Endpoints {
        rel_type: Option<EdgeType>,
        from: String,
        to: String,
    },
    /// By the `uid` property stamped on the edge.
    Uid(String),
}

impl RelAddress {
    pub fn from_operation(op: &Operation) -> Result<Self> {
        if let Some((from, to)) = op.rel_endpoints() {
            let rel_type = op.declared_type().map(parse_edge_type).transpose()?;
            return Ok(RelAddress::Endpoints {
                rel_type,
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        op.rel_uid().map(RelAddress::Uid).ok_or_else(|| GraphError::Unaddressable {
            op_id: op.op_id.clone(),
            reason: "relationship has no endpoints or uid".to_string(),
        })
    }
}

/// Canon label for a node upsert, defaulting to `Concept`.
pub fn upsert_label(op: &Operation) -> Result<NodeType> {
    let label = op.declared_type().unwrap_or(DEFAULT_NODE_LABEL);
    label
        .parse::<NodeType>()
        .map_err(|_| GraphError::InvalidType(label.to_string()))
}

pub fn parse_edge_type(s: &str) -> Result<EdgeType> {
    s.parse::<EdgeType>()
        .map_err(|_| GraphError::InvalidType(s.to_string()))
}

pub fn node_uid(op: &Operation) -> Result<&str> {
    op.node_uid().ok_or_else(|| GraphError::Unaddressable {
        op_id: op.op_id.clone(),
        reason: "node has no uid".to_string(),
    })
}

/// Backend-neutral graph access.
///
/// Implementations must apply a whole operation list atomically: either
/// every operation lands or none do.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Current state of a node, with its incident edges.
    async fn snapshot_node(&self, tenant: &TenantId, uid: &str) -> Result<Option<EntityState>>;

    /// Current state of a relationship.
    async fn snapshot_rel(&self, tenant: &TenantId, addr: &RelAddress) -> Result<Option<EntityState>>;

    /// Apply `ops` in one store-native transaction.
    ///
    /// Upserts stamp lifecycle metadata and link their evidence quote as a
    /// source-chunk node.
    async fn apply(&self, tenant: &TenantId, ops: &[Operation]) -> Result<()>;

    /// Nodes and edges within `depth` hops of `uid`.
    async fn neighbors(&self, tenant: &TenantId, uid: &str, depth: u32) -> Result<Subgraph>;

    /// Every PREREQ edge stored for the tenant.
    async fn prereq_edges(&self, tenant: &TenantId) -> Result<Vec<ChangeEdge>>;

    /// State of whatever `op` addresses, before it is applied.
    async fn snapshot(&self, tenant: &TenantId, op: &Operation) -> Result<Option<EntityState>> {
        if op.op_type.is_node() {
            self.snapshot_node(tenant, node_uid(op)?).await
        } else {
            self.snapshot_rel(tenant, &RelAddress::from_operation(op)?).await
        }
    }
}
