//! Core domain types for the Strata proposal and commit pipeline.
//!
//! These types describe graph edits (operations), the proposals that batch
//! them, and the canon whitelist of node and edge types shared by every
//! Strata component.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Every proposal, version and graph entity belongs to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique proposal identifier (`P-` followed by 20 hex chars).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn generate() -> Self {
        Self(format!("P-{}", &Uuid::new_v4().simple().to_string()[..20]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one committed transaction in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn generate() -> Self {
        Self(format!("TX-{}", &Uuid::new_v4().simple().to_string()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh real node id for a temp id resolved at commit time.
pub fn generate_node_uid() -> String {
    format!("N-{}", &Uuid::new_v4().simple().to_string()[..16])
}

// ── Canon Whitelist ───────────────────────────────────────────────

/// Node labels accepted by the canon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Subject,
    Section,
    Subsection,
    Topic,
    Skill,
    Method,
    Goal,
    Objective,
    Example,
    Error,
    ContentUnit,
    Concept,
    Formula,
    TaskType,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        NodeType::Subject,
        NodeType::Section,
        NodeType::Subsection,
        NodeType::Topic,
        NodeType::Skill,
        NodeType::Method,
        NodeType::Goal,
        NodeType::Objective,
        NodeType::Example,
        NodeType::Error,
        NodeType::ContentUnit,
        NodeType::Concept,
        NodeType::Formula,
        NodeType::TaskType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Subject => "Subject",
            NodeType::Section => "Section",
            NodeType::Subsection => "Subsection",
            NodeType::Topic => "Topic",
            NodeType::Skill => "Skill",
            NodeType::Method => "Method",
            NodeType::Goal => "Goal",
            NodeType::Objective => "Objective",
            NodeType::Example => "Example",
            NodeType::Error => "Error",
            NodeType::ContentUnit => "ContentUnit",
            NodeType::Concept => "Concept",
            NodeType::Formula => "Formula",
            NodeType::TaskType => "TaskType",
        }
    }

    /// Parent types a node of this type must be contained by, if any.
    pub fn expected_parents(&self) -> &'static [NodeType] {
        match self {
            NodeType::Section => &[NodeType::Subject],
            NodeType::Subsection => &[NodeType::Section],
            NodeType::Topic => &[NodeType::Section, NodeType::Subsection],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

/// Relationship types accepted by the canon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Contains,
    Prereq,
    UsesSkill,
    Linked,
    Targets,
    HasExample,
    HasUnit,
    Measures,
    BasedOn,
}

impl EdgeType {
    pub const ALL: [EdgeType; 9] = [
        EdgeType::Contains,
        EdgeType::Prereq,
        EdgeType::UsesSkill,
        EdgeType::Linked,
        EdgeType::Targets,
        EdgeType::HasExample,
        EdgeType::HasUnit,
        EdgeType::Measures,
        EdgeType::BasedOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "CONTAINS",
            EdgeType::Prereq => "PREREQ",
            EdgeType::UsesSkill => "USES_SKILL",
            EdgeType::Linked => "LINKED",
            EdgeType::Targets => "TARGETS",
            EdgeType::HasExample => "HAS_EXAMPLE",
            EdgeType::HasUnit => "HAS_UNIT",
            EdgeType::Measures => "MEASURES",
            EdgeType::BasedOn => "BASED_ON",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown edge type: {s}"))
    }
}

/// Label of the system-owned nodes that hold evidence quotes.
pub const SOURCE_CHUNK_LABEL: &str = "SourceChunk";

/// Relationship linking a committed entity to its evidence chunk.
pub const EVIDENCED_BY: &str = "EVIDENCED_BY";

/// Label used when a create/merge names no type.
pub const DEFAULT_NODE_LABEL: &str = "Concept";

/// Relationship type used when a create/merge names no type.
pub const DEFAULT_EDGE_TYPE: &str = "LINKED";

// ── Operations ────────────────────────────────────────────────────

/// The kind of graph edit an operation performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpType {
    CreateNode,
    CreateRel,
    MergeNode,
    MergeRel,
    UpdateNode,
    UpdateRel,
    DeleteNode,
    DeleteRel,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::CreateNode => "CREATE_NODE",
            OpType::CreateRel => "CREATE_REL",
            OpType::MergeNode => "MERGE_NODE",
            OpType::MergeRel => "MERGE_REL",
            OpType::UpdateNode => "UPDATE_NODE",
            OpType::UpdateRel => "UPDATE_REL",
            OpType::DeleteNode => "DELETE_NODE",
            OpType::DeleteRel => "DELETE_REL",
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(
            self,
            OpType::CreateNode | OpType::MergeNode | OpType::UpdateNode | OpType::DeleteNode
        )
    }

    /// Create and merge operations upsert an entity and must carry evidence.
    pub fn is_upsert(&self) -> bool {
        matches!(
            self,
            OpType::CreateNode | OpType::MergeNode | OpType::CreateRel | OpType::MergeRel
        )
    }

    pub fn requires_evidence(&self) -> bool {
        self.is_upsert()
    }

    pub fn change_type(&self) -> ChangeType {
        if self.is_node() {
            ChangeType::Node
        } else {
            ChangeType::Rel
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a change touched a node or a relationship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Node,
    Rel,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Node => "NODE",
            ChangeType::Rel => "REL",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NODE" => Ok(ChangeType::Node),
            "REL" => Ok(ChangeType::Rel),
            other => Err(format!("unknown change type: {other}")),
        }
    }
}

/// Provenance for a create/merge: the source chunk and the supporting quote.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// Any further keys supplied by the ingestion strategy.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Evidence {
    pub fn new(source_chunk_id: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            source_chunk_id: Some(source_chunk_id.into()),
            quote: Some(quote.into()),
            extra: BTreeMap::new(),
        }
    }

    /// Both the chunk id and the quote are present and non-blank.
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.source_chunk_id) && filled(&self.quote)
    }
}

fn default_semantic_impact() -> String {
    "COSMETIC".to_string()
}

/// One atomic graph edit. Immutable once placed in a proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub op_id: String,
    pub op_type: OpType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    #[serde(default)]
    pub properties_delta: BTreeMap<String, Value>,
    #[serde(default)]
    pub match_criteria: BTreeMap<String, Value>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default = "default_semantic_impact")]
    pub semantic_impact: String,
    #[serde(default)]
    pub requires_review: bool,
}

impl Operation {
    pub fn new(op_id: impl Into<String>, op_type: OpType) -> Self {
        Self {
            op_id: op_id.into(),
            op_type,
            target_id: None,
            temp_id: None,
            properties_delta: BTreeMap::new(),
            match_criteria: BTreeMap::new(),
            evidence: Evidence::default(),
            semantic_impact: default_semantic_impact(),
            requires_review: false,
        }
    }

    /// A node upsert of the given label and uid.
    pub fn node(op_id: impl Into<String>, op_type: OpType, label: &str, uid: &str) -> Self {
        Self::new(op_id, op_type)
            .with_target(uid)
            .with_prop("type", label)
            .with_prop("uid", uid)
    }

    /// A relationship edit of the given type between two node uids.
    pub fn rel(op_id: impl Into<String>, op_type: OpType, rel_type: &str, from: &str, to: &str) -> Self {
        Self::new(op_id, op_type)
            .with_prop("type", rel_type)
            .with_prop("from_uid", from)
            .with_prop("to_uid", to)
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties_delta.insert(key.to_string(), value.into());
        self
    }

    pub fn with_match(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.match_criteria.insert(key.to_string(), value.into());
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    fn delta_str(&self, key: &str) -> Option<&str> {
        non_empty_str(self.properties_delta.get(key))
    }

    fn match_str(&self, key: &str) -> Option<&str> {
        non_empty_str(self.match_criteria.get(key))
    }

    /// The uid of the node this operation addresses.
    pub fn node_uid(&self) -> Option<&str> {
        self.delta_str("uid")
            .or_else(|| self.target_id.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.match_str("uid"))
            .or_else(|| self.temp_id.as_deref().filter(|s| !s.is_empty()))
    }

    /// The explicitly named label or relationship type, if any.
    pub fn declared_type(&self) -> Option<&str> {
        self.delta_str("type").or_else(|| self.match_str("type"))
    }

    /// `(from_uid, to_uid)` of the relationship this operation addresses.
    pub fn rel_endpoints(&self) -> Option<(&str, &str)> {
        let from = self
            .delta_str("from_uid")
            .or_else(|| self.match_str("start_uid"))
            .or_else(|| self.match_str("from_uid"))?;
        let to = self
            .delta_str("to_uid")
            .or_else(|| self.match_str("end_uid"))
            .or_else(|| self.match_str("to_uid"))?;
        Some((from, to))
    }

    /// The id of the relationship this operation addresses.
    ///
    /// Explicit uid, then target id, then the derived `from|TYPE|to` key.
    pub fn rel_uid(&self) -> Option<String> {
        if let Some(uid) = self.delta_str("uid") {
            return Some(uid.to_string());
        }
        if let Some(t) = self.target_id.as_deref().filter(|s| !s.is_empty()) {
            return Some(t.to_string());
        }
        let (from, to) = self.rel_endpoints()?;
        let typ = self.declared_type().unwrap_or(DEFAULT_EDGE_TYPE);
        Some(format!("{from}|{typ}|{to}"))
    }

    /// The id this operation touches, as recorded in the change log.
    pub fn target_key(&self) -> Option<String> {
        if self.op_type.is_node() {
            self.node_uid().map(str::to_string)
        } else {
            self.rel_uid()
        }
    }

    /// Property keys the operation writes, excluding identity keys.
    pub fn payload_properties(&self) -> BTreeMap<String, Value> {
        self.properties_delta
            .iter()
            .filter(|(k, _)| !IDENTITY_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Keys of `properties_delta` that identify an entity rather than describe it.
pub const IDENTITY_KEYS: [&str; 4] = ["uid", "type", "from_uid", "to_uid"];

fn non_empty_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// One id touched by a commit, as logged per graph version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Target {
    pub id: String,
    pub change_type: ChangeType,
}

// ── Proposals ─────────────────────────────────────────────────────

/// Lifecycle of a proposal through review and commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Draft,
    WaitingReview,
    Approved,
    Rejected,
    Committing,
    AsyncCheckRequired,
    Ready,
    Done,
    Failed,
    Conflict,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 10] = [
        ProposalStatus::Draft,
        ProposalStatus::WaitingReview,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::Committing,
        ProposalStatus::AsyncCheckRequired,
        ProposalStatus::Ready,
        ProposalStatus::Done,
        ProposalStatus::Failed,
        ProposalStatus::Conflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::WaitingReview => "WAITING_REVIEW",
            ProposalStatus::Approved => "APPROVED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Committing => "COMMITTING",
            ProposalStatus::AsyncCheckRequired => "ASYNC_CHECK_REQUIRED",
            ProposalStatus::Ready => "READY",
            ProposalStatus::Done => "DONE",
            ProposalStatus::Failed => "FAILED",
            ProposalStatus::Conflict => "CONFLICT",
        }
    }

    /// States from which `commit` may start.
    pub fn is_commit_entry(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Draft | ProposalStatus::Approved | ProposalStatus::Ready
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Done
                | ProposalStatus::Failed
                | ProposalStatus::Conflict
                | ProposalStatus::Rejected
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Committing` may fall back to its entry state when an infrastructure
    /// failure interrupts the commit, so the caller can retry.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        match (self, next) {
            (Draft, WaitingReview | Approved | Rejected | Committing) => true,
            (WaitingReview, Approved | Rejected) => true,
            (Approved, Committing | Rejected) => true,
            (Committing, Done | Failed | Conflict | AsyncCheckRequired) => true,
            (Committing, Draft | Approved | Ready) => true,
            (AsyncCheckRequired, Ready | Failed) => true,
            (Ready, Committing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown proposal status: {s}"))
    }
}

/// A checksum-identified batch of operations awaiting or undergoing commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub tenant_id: TenantId,
    pub base_graph_version: i64,
    pub proposal_checksum: String,
    pub status: ProposalStatus,
    pub operations: Vec<Operation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&OpType::CreateNode).unwrap();
        assert_eq!(json, "\"CREATE_NODE\"");
        let back: OpType = serde_json::from_str("\"DELETE_REL\"").unwrap();
        assert_eq!(back, OpType::DeleteRel);
    }

    #[test]
    fn operation_defaults_when_fields_missing() {
        let op: Operation =
            serde_json::from_str(r#"{"op_id":"o1","op_type":"UPDATE_NODE","target_id":"T1"}"#)
                .unwrap();
        assert_eq!(op.semantic_impact, "COSMETIC");
        assert!(!op.requires_review);
        assert!(op.properties_delta.is_empty());
        assert!(!op.evidence.is_complete());
    }

    #[test]
    fn evidence_keeps_extra_keys() {
        let ev: Evidence = serde_json::from_str(
            r#"{"source_chunk_id":"c1","quote":"q","page":4}"#,
        )
        .unwrap();
        assert!(ev.is_complete());
        assert_eq!(ev.extra.get("page"), Some(&serde_json::json!(4)));
    }

    #[test]
    fn blank_evidence_is_incomplete() {
        assert!(!Evidence::new("c1", "   ").is_complete());
        assert!(!Evidence::new("", "quote").is_complete());
    }

    #[test]
    fn node_uid_prefers_delta_uid_then_target_then_temp() {
        let op = Operation::new("o1", OpType::CreateNode)
            .with_temp_id("tmp-1")
            .with_target("T1")
            .with_prop("uid", "U1");
        assert_eq!(op.node_uid(), Some("U1"));

        let op = Operation::new("o2", OpType::CreateNode)
            .with_temp_id("tmp-1")
            .with_target("T1");
        assert_eq!(op.node_uid(), Some("T1"));

        let op = Operation::new("o3", OpType::CreateNode).with_temp_id("tmp-1");
        assert_eq!(op.node_uid(), Some("tmp-1"));
    }

    #[test]
    fn rel_uid_derives_key_from_endpoints() {
        let op = Operation::rel("o1", OpType::CreateRel, "BASED_ON", "S1", "C1");
        assert_eq!(op.rel_uid().as_deref(), Some("S1|BASED_ON|C1"));
        assert_eq!(op.target_key().as_deref(), Some("S1|BASED_ON|C1"));

        let op = Operation::new("o2", OpType::UpdateRel)
            .with_match("type", "PREREQ")
            .with_match("start_uid", "A")
            .with_match("end_uid", "B");
        assert_eq!(op.rel_endpoints(), Some(("A", "B")));
        assert_eq!(op.rel_uid().as_deref(), Some("A|PREREQ|B"));
    }

    #[test]
    fn payload_properties_drop_identity_keys() {
        let op = Operation::node("o1", OpType::CreateNode, "Skill", "S1").with_prop("title", "Add");
        let props = op.payload_properties();
        assert_eq!(props.len(), 1);
        assert!(props.contains_key("title"));
    }

    #[test]
    fn status_transitions_follow_state_machine() {
        use ProposalStatus::*;
        assert!(Draft.can_transition_to(Committing));
        assert!(Approved.can_transition_to(Committing));
        assert!(Ready.can_transition_to(Committing));
        assert!(!WaitingReview.can_transition_to(Committing));
        assert!(Committing.can_transition_to(AsyncCheckRequired));
        assert!(AsyncCheckRequired.can_transition_to(Ready));
        assert!(AsyncCheckRequired.can_transition_to(Failed));
        assert!(!AsyncCheckRequired.can_transition_to(Done));
        assert!(!Done.can_transition_to(Committing));
        assert!(Done.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for st in ProposalStatus::ALL {
            assert_eq!(st.as_str().parse::<ProposalStatus>().unwrap(), st);
        }
        assert_eq!(
            serde_json::to_string(&ProposalStatus::AsyncCheckRequired).unwrap(),
            "\"ASYNC_CHECK_REQUIRED\""
        );
    }

    #[test]
    fn canon_types_parse() {
        assert_eq!("Skill".parse::<NodeType>().unwrap(), NodeType::Skill);
        assert!("Widget".parse::<NodeType>().is_err());
        assert_eq!("BASED_ON".parse::<EdgeType>().unwrap(), EdgeType::BasedOn);
        assert!("EVIDENCED_BY".parse::<EdgeType>().is_err());
    }

    #[test]
    fn generated_ids_have_expected_shape() {
        let pid = ProposalId::generate();
        assert!(pid.as_str().starts_with("P-"));
        assert_eq!(pid.as_str().len(), 22);
        let tx = TxId::generate();
        assert_eq!(tx.as_str().len(), 19);
        assert!(generate_node_uid().starts_with("N-"));
    }
}
