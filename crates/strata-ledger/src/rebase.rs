//! Optimistic conflict detection against the change log.

use serde::Serialize;

use strata_core::types::TenantId;

use crate::error::Result;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebaseStatus {
    SameVersion,
    FastRebase,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebaseOutcome {
    pub status: RebaseStatus,
    /// Tenant version the decision was made against.
    pub current_version: i64,
    /// Targets both the proposal and an intervening commit touched, sorted.
    pub overlapping: Vec<String>,
}

impl RebaseOutcome {
    pub fn is_conflict(&self) -> bool {
        self.status == RebaseStatus::Conflict
    }
}

/// Compares a proposal's base version with the ledger.
#[derive(Clone)]
pub struct RebaseChecker {
    ledger: LedgerStore,
}

impl RebaseChecker {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    /// Classify a proposal drafted at `base_version` that touches `targets`.
    ///
    /// A base ahead of the ledger cannot have been observed, so it is a
    /// conflict with no overlapping targets.
    pub async fn check(&self, tenant: &TenantId, base_version: i64, targets: &[String]) -> Result<RebaseOutcome> {
        let current = self.ledger.current_version(tenant).await?;

        if current == base_version {
            return Ok(RebaseOutcome {
                status: RebaseStatus::SameVersion,
                current_version: current,
                overlapping: Vec::new(),
            });
        }
        if base_version > current {
            tracing::warn!(tenant_id = %tenant, base_version, current, "Proposal base is ahead of the ledger");
            return Ok(RebaseOutcome {
                status: RebaseStatus::Conflict,
                current_version: current,
                overlapping: Vec::new(),
            });
        }

        let changed = self.ledger.changed_targets_between(tenant, base_version, current).await?;
        let mut overlapping: Vec<String> = targets.iter().filter(|t| changed.contains(*t)).cloned().collect();
        overlapping.sort();
        overlapping.dedup();

        let status = if overlapping.is_empty() {
            RebaseStatus::FastRebase
        } else {
            RebaseStatus::Conflict
        };
        tracing::debug!(tenant_id = %tenant, base_version, current, ?status, "Rebase checked");
        Ok(RebaseOutcome {
            status,
            current_version: current,
            overlapping,
        })
    }
}
