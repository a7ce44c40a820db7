//! Per-tenant version counter, change log, and the commit bookkeeping
//! transaction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::Row;

use strata_core::events::{EventId, EventType, GraphCommitted};
use strata_core::types::{ChangeType, Operation, ProposalId, ProposalStatus, TenantId, Target, TxId};

use crate::error::{LedgerError, Result};
use crate::outbox::INSERT_OUTBOX;
use crate::store::{now_ms, LedgerStore};

/// One row of the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphChange {
    pub graph_version: i64,
    pub target_id: String,
    pub change_type: ChangeType,
}

/// Everything recorded when a changeset has been applied to the graph.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    /// Version the tenant must still be at; the commit takes `expected_version + 1`.
    pub expected_version: i64,
    pub tx_id: TxId,
    pub targets: Vec<Target>,
    pub operations_applied: Vec<Operation>,
    pub revert_operations: Vec<Operation>,
    pub correlation_id: Option<String>,
}

/// Result of a successful [`LedgerStore::record_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedVersion {
    pub graph_version: i64,
    pub event_id: EventId,
}

impl LedgerStore {
    /// Current graph version of a tenant; 0 before its first commit.
    pub async fn current_version(&self, tenant: &TenantId) -> Result<i64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT graph_version FROM tenant_graph_version WHERE tenant_id = ?")
                .bind(tenant.as_str())
                .fetch_optional(self.pool())
                .await?;
        Ok(version.unwrap_or(0))
    }

    /// Target ids logged for versions in `(after, up_to]`.
    pub async fn changed_targets_between(&self, tenant: &TenantId, after: i64, up_to: i64) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT target_id FROM graph_changes
             WHERE tenant_id = ? AND graph_version > ? AND graph_version <= ?",
        )
        .bind(tenant.as_str())
        .bind(after)
        .bind(up_to)
        .fetch_all(self.pool())
        .await?;
        Ok(ids.into_iter().collect())
    }

    /// Change rows after `since_version`, in version order.
    pub async fn list_changes(&self, tenant: &TenantId, since_version: i64) -> Result<Vec<GraphChange>> {
        let rows = sqlx::query(
            "SELECT graph_version, target_id, change_type FROM graph_changes
             WHERE tenant_id = ? AND graph_version > ?
             ORDER BY graph_version, target_id",
        )
        .bind(tenant.as_str())
        .bind(since_version)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<GraphChange> {
                let change_type: String = row.try_get("change_type")?;
                Ok(GraphChange {
                    graph_version: row.try_get("graph_version")?,
                    target_id: row.try_get("target_id")?,
                    change_type: change_type.parse().map_err(LedgerError::Decode)?,
                })
            })
            .collect()
    }

    /// Record an applied changeset in one transaction.
    ///
    /// Bumps the tenant version from `expected_version` by exactly one, logs
    /// every target, writes the audit row, evidence links (seeding each
    /// unknown source chunk with its quote) and the `graph_committed` outbox
    /// event, and marks the proposal DONE. Returns
    /// `VersionRace` without writing anything if another commit moved the
    /// version first.
    pub async fn record_commit(&self, record: &CommitRecord) -> Result<CommittedVersion> {
        let now = now_ms();
        let tenant = record.tenant_id.as_str();
        let new_version = record.expected_version + 1;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO tenant_graph_version (tenant_id, graph_version, updated_at_ms)
             VALUES (?, 0, ?)",
        )
        .bind(tenant)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let bumped = sqlx::query(
            "UPDATE tenant_graph_version SET graph_version = graph_version + 1, updated_at_ms = ?
             WHERE tenant_id = ? AND graph_version = ?",
        )
        .bind(now)
        .bind(tenant)
        .bind(record.expected_version)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::VersionRace {
                tenant_id: tenant.to_string(),
                expected: record.expected_version,
            });
        }

        for target in &record.targets {
            sqlx::query(
                "INSERT OR IGNORE INTO graph_changes (tenant_id, graph_version, target_id, change_type)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(tenant)
            .bind(new_version)
            .bind(&target.id)
            .bind(target.change_type.as_str())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO audit_log
                (tx_id, tenant_id, proposal_id, graph_version, operations_applied,
                 revert_operations, correlation_id, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.tx_id.as_str())
        .bind(tenant)
        .bind(record.proposal_id.as_str())
        .bind(new_version)
        .bind(serde_json::to_string(&record.operations_applied)?)
        .bind(serde_json::to_string(&record.revert_operations)?)
        .bind(record.correlation_id.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for op in record
            .operations_applied
            .iter()
            .filter(|op| op.op_type.is_upsert() && op.evidence.is_complete())
        {
            let (Some(target), Some(chunk), Some(quote)) = (
                op.target_key(),
                op.evidence.source_chunk_id.as_deref(),
                op.evidence.quote.as_deref(),
            ) else {
                continue;
            };
            sqlx::query(
                "INSERT OR IGNORE INTO evidence_links (tenant_id, tx_id, target_id, source_chunk_id, quote)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(tenant)
            .bind(record.tx_id.as_str())
            .bind(target)
            .bind(chunk)
            .bind(quote)
            .execute(&mut *tx)
            .await?;

            // The quote stands in for the chunk until its full text is stored.
            sqlx::query(
                "INSERT INTO source_chunks (tenant_id, chunk_id, text, created_at_ms) VALUES (?, ?, ?, ?)
                 ON CONFLICT (tenant_id, chunk_id) DO NOTHING",
            )
            .bind(tenant)
            .bind(chunk)
            .bind(quote)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let event_id = EventId::new();
        let payload = GraphCommitted {
            tenant_id: record.tenant_id.clone(),
            targets: record.targets.iter().map(|t| t.id.clone()).collect(),
            proposal_id: Some(record.proposal_id.clone()),
            graph_version: Some(new_version),
        };
        sqlx::query(INSERT_OUTBOX)
            .bind(event_id.as_str())
            .bind(tenant)
            .bind(EventType::GraphCommitted.as_str())
            .bind(serde_json::to_string(&payload)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let done = sqlx::query(
            "UPDATE proposals SET status = ?, failure_json = NULL, updated_at_ms = ?
             WHERE proposal_id = ? AND status = ?",
        )
        .bind(ProposalStatus::Done.as_str())
        .bind(now)
        .bind(record.proposal_id.as_str())
        .bind(ProposalStatus::Committing.as_str())
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::InvalidTransition {
                proposal_id: record.proposal_id.to_string(),
                expected: ProposalStatus::Committing.to_string(),
                to: ProposalStatus::Done.to_string(),
                actual: "unknown".to_string(),
            });
        }

        tx.commit().await?;

        tracing::info!(
            tenant_id = %record.tenant_id,
            proposal_id = %record.proposal_id,
            tx_id = %record.tx_id,
            graph_version = new_version,
            targets = record.targets.len(),
            "Recorded commit"
        );
        Ok(CommittedVersion {
            graph_version: new_version,
            event_id,
        })
    }
}
