//! Read side of the audit log and the evidence side table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use strata_core::types::{Operation, ProposalId, TenantId, TxId};

use crate::error::Result;
use crate::store::{to_datetime, LedgerStore};

/// One committed transaction, with what was applied and how to undo it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub tx_id: TxId,
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub graph_version: i64,
    pub operations_applied: Vec<Operation>,
    pub revert_operations: Vec<Operation>,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed entity joined to the chunk that justified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceLink {
    pub target_id: String,
    pub source_chunk_id: String,
    pub quote: String,
}

const SELECT_AUDIT: &str = "SELECT tx_id, tenant_id, proposal_id, graph_version, operations_applied,
            revert_operations, correlation_id, created_at_ms
     FROM audit_log";

impl LedgerStore {
    pub async fn get_audit(&self, tx_id: &TxId) -> Result<Option<AuditRecord>> {
        let row = sqlx::query(&format!("{SELECT_AUDIT} WHERE tx_id = ?"))
            .bind(tx_id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_audit).transpose()
    }

    pub async fn list_audit_for_proposal(&self, proposal_id: &ProposalId) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_AUDIT} WHERE proposal_id = ? ORDER BY graph_version"
        ))
        .bind(proposal_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_audit).collect()
    }

    pub async fn evidence_links(&self, tx_id: &TxId) -> Result<Vec<EvidenceLink>> {
        let rows = sqlx::query(
            "SELECT target_id, source_chunk_id, quote FROM evidence_links
             WHERE tx_id = ? ORDER BY target_id, source_chunk_id",
        )
        .bind(tx_id.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<EvidenceLink> {
                Ok(EvidenceLink {
                    target_id: row.try_get("target_id")?,
                    source_chunk_id: row.try_get("source_chunk_id")?,
                    quote: row.try_get("quote")?,
                })
            })
            .collect()
    }
}

fn row_to_audit(row: &SqliteRow) -> Result<AuditRecord> {
    let applied: String = row.try_get("operations_applied")?;
    let reverts: String = row.try_get("revert_operations")?;
    Ok(AuditRecord {
        tx_id: TxId(row.try_get("tx_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        proposal_id: ProposalId(row.try_get("proposal_id")?),
        graph_version: row.try_get("graph_version")?,
        operations_applied: serde_json::from_str(&applied)?,
        revert_operations: serde_json::from_str(&reverts)?,
        correlation_id: row.try_get("correlation_id")?,
        created_at: to_datetime(row.try_get("created_at_ms")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::CommitRecord;
    use strata_core::changeset::touched_targets;
    use strata_core::proposal::create_draft;
    use strata_core::types::{Evidence, OpType, ProposalStatus};

    #[tokio::test]
    async fn commit_writes_one_audit_row_with_reverts_and_evidence() {
        let store = LedgerStore::memory().await.unwrap();
        let ops = vec![
            Operation::node("o1", OpType::CreateNode, "Concept", "C1")
                .with_evidence(Evidence::new("chunk-7", "a concept")),
            Operation::new("o2", OpType::UpdateNode).with_target("C2").with_prop("title", "x"),
        ];
        let p = create_draft(TenantId::new("t1"), 0, ops).unwrap();
        store.insert_proposal(&p).await.unwrap();
        store
            .transition_proposal(&p.proposal_id, ProposalStatus::Draft, ProposalStatus::Committing, None)
            .await
            .unwrap();

        let revert = Operation::new("o1:revert", OpType::DeleteNode).with_target("C1");
        let tx_id = TxId::generate();
        store
            .record_commit(&CommitRecord {
                tenant_id: p.tenant_id.clone(),
                proposal_id: p.proposal_id.clone(),
                expected_version: 0,
                tx_id: tx_id.clone(),
                targets: touched_targets(&p.operations),
                operations_applied: p.operations.clone(),
                revert_operations: vec![revert.clone()],
                correlation_id: None,
            })
            .await
            .unwrap();

        let audit = store.get_audit(&tx_id).await.unwrap().unwrap();
        assert_eq!(audit.graph_version, 1);
        assert_eq!(audit.operations_applied, p.operations);
        assert_eq!(audit.revert_operations, vec![revert]);
        assert_eq!(store.list_audit_for_proposal(&p.proposal_id).await.unwrap().len(), 1);

        // Updates carry no evidence, so only the create is linked.
        let links = store.evidence_links(&tx_id).await.unwrap();
        assert_eq!(
            links,
            vec![EvidenceLink {
                target_id: "C1".into(),
                source_chunk_id: "chunk-7".into(),
                quote: "a concept".into(),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_tx_has_no_audit() {
        let store = LedgerStore::memory().await.unwrap();
        assert!(store.get_audit(&TxId::generate()).await.unwrap().is_none());
    }
}
