//! Event types carried through the transactional outbox.
//!
//! Events are written in the same relational transaction as the commit they
//! describe and delivered later by the outbox publisher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ProposalId, TenantId};

/// Unique identifier for an outbox event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event types the publisher knows how to deliver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GraphCommitted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::GraphCommitted => "graph_committed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph_committed" => Ok(EventType::GraphCommitted),
            other => Err(format!("unsupported event type: {other}")),
        }
    }
}

/// Payload of a `graph_committed` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphCommitted {
    pub tenant_id: TenantId,
    /// Ids of every node and relationship touched by the commit.
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_parses_known_names_only() {
        assert_eq!(
            "graph_committed".parse::<EventType>().unwrap(),
            EventType::GraphCommitted
        );
        assert!("graph_deleted".parse::<EventType>().is_err());
    }

    #[test]
    fn graph_committed_payload_shape() {
        let payload = GraphCommitted {
            tenant_id: TenantId::new("t1"),
            targets: vec!["S1".into(), "C1".into()],
            proposal_id: None,
            graph_version: Some(3),
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["tenant_id"], "t1");
        assert_eq!(v["targets"], serde_json::json!(["S1", "C1"]));
        assert!(v.get("proposal_id").is_none());
        assert_eq!(v["graph_version"], 3);
    }
}
