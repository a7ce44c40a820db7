//! Proposal persistence and compare-and-set status transitions.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use strata_core::types::{Proposal, ProposalId, ProposalStatus, TenantId};

use crate::error::{LedgerError, Result};
use crate::store::{now_ms, to_datetime, LedgerStore};

/// A stored proposal with its bookkeeping columns.
#[derive(Debug, Clone)]
pub struct ProposalRecord {
    pub proposal: Proposal,
    /// Why the last stage failed, if it did.
    pub failure: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_PROPOSAL: &str = "SELECT proposal_id, tenant_id, base_graph_version, proposal_checksum, status,
            operations_json, failure_json, created_at_ms, updated_at_ms
     FROM proposals";

impl LedgerStore {
    pub async fn insert_proposal(&self, proposal: &Proposal) -> Result<()> {
        let now = now_ms();
        sqlx::query(
            "INSERT INTO proposals
                (proposal_id, tenant_id, base_graph_version, proposal_checksum, status,
                 operations_json, failure_json, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(proposal.proposal_id.as_str())
        .bind(proposal.tenant_id.as_str())
        .bind(proposal.base_graph_version)
        .bind(&proposal.proposal_checksum)
        .bind(proposal.status.as_str())
        .bind(serde_json::to_string(&proposal.operations)?)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        tracing::debug!(
            proposal_id = %proposal.proposal_id,
            tenant_id = %proposal.tenant_id,
            status = %proposal.status,
            "Stored proposal"
        );
        Ok(())
    }

    pub async fn get_proposal(&self, id: &ProposalId) -> Result<Option<ProposalRecord>> {
        let row = sqlx::query(&format!("{SELECT_PROPOSAL} WHERE proposal_id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_proposal).transpose()
    }

    /// Like [`get_proposal`](Self::get_proposal), but a missing id is an error.
    pub async fn require_proposal(&self, id: &ProposalId) -> Result<ProposalRecord> {
        self.get_proposal(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("proposal {id}")))
    }

    /// A live proposal of the tenant with the same checksum, if any.
    ///
    /// Terminal proposals are ignored so identical content can be resubmitted
    /// after a failure or conflict.
    pub async fn find_open_by_checksum(&self, tenant: &TenantId, checksum: &str) -> Result<Option<ProposalRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_PROPOSAL} WHERE tenant_id = ? AND proposal_checksum = ? ORDER BY created_at_ms"
        ))
        .bind(tenant.as_str())
        .bind(checksum)
        .fetch_all(self.pool())
        .await?;

        for row in &rows {
            let record = row_to_proposal(row)?;
            if !record.proposal.status.is_terminal() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Proposals in `status`, oldest first.
    pub async fn list_proposals_by_status(&self, status: ProposalStatus, limit: u32) -> Result<Vec<ProposalRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_PROPOSAL} WHERE status = ? ORDER BY created_at_ms, proposal_id LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_proposal).collect()
    }

    /// A tenant's proposals, newest first.
    pub async fn list_proposals_by_tenant(&self, tenant: &TenantId, limit: u32) -> Result<Vec<ProposalRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_PROPOSAL} WHERE tenant_id = ? ORDER BY created_at_ms DESC, proposal_id LIMIT ?"
        ))
        .bind(tenant.as_str())
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_proposal).collect()
    }

    /// Move a proposal from `from` to `to`, only if it is still in `from`.
    ///
    /// `failure` replaces the stored failure detail; passing `None` clears it.
    /// Fails with `InvalidTransition` when the state machine forbids the move
    /// or another caller changed the status first.
    pub async fn transition_proposal(
        &self,
        id: &ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
        failure: Option<&Value>,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                proposal_id: id.to_string(),
                expected: from.to_string(),
                to: to.to_string(),
                actual: from.to_string(),
            });
        }

        let failure_json = failure.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE proposals SET status = ?, failure_json = ?, updated_at_ms = ?
             WHERE proposal_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(failure_json)
        .bind(now_ms())
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            let current = self.require_proposal(id).await?;
            return Err(LedgerError::InvalidTransition {
                proposal_id: id.to_string(),
                expected: from.to_string(),
                to: to.to_string(),
                actual: current.proposal.status.to_string(),
            });
        }

        tracing::info!(proposal_id = %id, from = %from, to = %to, "Proposal status changed");
        Ok(())
    }
}

pub(crate) fn row_to_proposal(row: &SqliteRow) -> Result<ProposalRecord> {
    let status: String = row.try_get("status")?;
    let operations: String = row.try_get("operations_json")?;
    let failure: Option<String> = row.try_get("failure_json")?;

    Ok(ProposalRecord {
        proposal: Proposal {
            proposal_id: ProposalId(row.try_get("proposal_id")?),
            tenant_id: TenantId(row.try_get("tenant_id")?),
            base_graph_version: row.try_get("base_graph_version")?,
            proposal_checksum: row.try_get("proposal_checksum")?,
            status: status.parse().map_err(LedgerError::Decode)?,
            operations: serde_json::from_str(&operations)?,
        },
        failure: failure.as_deref().map(serde_json::from_str).transpose()?,
        created_at: to_datetime(row.try_get("created_at_ms")?)?,
        updated_at: to_datetime(row.try_get("updated_at_ms")?)?,
    })
}
