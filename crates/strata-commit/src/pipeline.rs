//! The commit pipeline.
//!
//! `commit` runs a proposal through rebase, integrity, graph apply and ledger
//! recording. The graph and the ledger are separate stores: the changeset is
//! applied to the graph in one graph transaction, then the fact of having
//! applied it (version bump, change log, audit, outbox, DONE) is recorded in
//! one ledger transaction. When recording fails after the graph apply, the
//! revert operations are applied to compensate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use strata_core::changeset::{resolve_temp_ids, touched_targets, Changeset};
use strata_core::config::PipelineConfig;
use strata_core::events::EventId;
use strata_core::proposal::create_draft;
use strata_core::revert::revert_operations;
use strata_core::types::{Operation, Proposal, ProposalId, ProposalStatus, Target, TenantId, TxId};
use strata_graph::GraphStore;
use strata_integrity::{IntegrityChecker, IntegrityReport};
use strata_ledger::{CommitRecord, LedgerError, LedgerStore, RebaseChecker};

use crate::error::{CommitError, Result};
use crate::ingestion::IngestionStrategy;

/// How a commit attempt ended. Infrastructure failures are `Err` instead.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitOutcome {
    Done {
        graph_version: i64,
        tx_id: TxId,
        event_id: EventId,
        /// Temp ids and the uids they were resolved to.
        resolved_ids: BTreeMap<String, String>,
    },
    Conflict {
        current_version: i64,
        overlapping: Vec<String>,
    },
    #[serde(rename = "FAILED")]
    IntegrityFailed { report: IntegrityReport },
    AsyncCheckRequired { estimated_cost_ms: u64 },
}

impl CommitOutcome {
    /// Status the proposal was left in.
    pub fn status(&self) -> ProposalStatus {
        match self {
            CommitOutcome::Done { .. } => ProposalStatus::Done,
            CommitOutcome::Conflict { .. } => ProposalStatus::Conflict,
            CommitOutcome::IntegrityFailed { .. } => ProposalStatus::Failed,
            CommitOutcome::AsyncCheckRequired { .. } => ProposalStatus::AsyncCheckRequired,
        }
    }
}

enum Recorded {
    Committed(CommitOutcome),
    Conflict {
        current_version: i64,
        overlapping: Vec<String>,
    },
}

pub struct CommitPipeline {
    ledger: LedgerStore,
    graph: Arc<dyn GraphStore>,
    rebase: RebaseChecker,
    checker: IntegrityChecker,
    config: PipelineConfig,
}

impl CommitPipeline {
    pub fn new(ledger: LedgerStore, graph: Arc<dyn GraphStore>, config: PipelineConfig) -> Self {
        Self {
            rebase: RebaseChecker::new(ledger.clone()),
            checker: IntegrityChecker::from_config(&config),
            ledger,
            graph,
            config,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn checker(&self) -> &IntegrityChecker {
        &self.checker
    }

    // ── Drafting and review ──────────────────────────────────────

    /// Build and persist a DRAFT proposal.
    ///
    /// Resubmitting content identical to a live proposal of the same tenant
    /// returns that proposal instead of a new one.
    pub async fn submit(&self, tenant: TenantId, base_version: i64, operations: Vec<Operation>) -> Result<Proposal> {
        let draft = create_draft(tenant, base_version, operations)?;

        if let Some(existing) = self
            .ledger
            .find_open_by_checksum(&draft.tenant_id, &draft.proposal_checksum)
            .await?
        {
            tracing::info!(
                proposal_id = %existing.proposal.proposal_id,
                tenant_id = %draft.tenant_id,
                "Duplicate submission, returning existing proposal"
            );
            return Ok(existing.proposal);
        }

        self.ledger.insert_proposal(&draft).await?;
        tracing::info!(
            proposal_id = %draft.proposal_id,
            tenant_id = %draft.tenant_id,
            operations = draft.operations.len(),
            base_version,
            "Proposal submitted"
        );
        Ok(draft)
    }

    /// Ask `strategy` for operations describing `content`, then [`submit`](Self::submit) them.
    pub async fn submit_content(
        &self,
        strategy: &dyn IngestionStrategy,
        tenant: TenantId,
        base_version: i64,
        content: &str,
    ) -> Result<Proposal> {
        let operations = strategy.operations(&tenant, content).await?;
        self.submit(tenant, base_version, operations).await
    }

    pub async fn request_review(&self, id: &ProposalId) -> Result<()> {
        self.move_status(id, &[ProposalStatus::Draft], ProposalStatus::WaitingReview, None, "request review")
            .await
    }

    pub async fn approve(&self, id: &ProposalId) -> Result<()> {
        self.move_status(
            id,
            &[ProposalStatus::Draft, ProposalStatus::WaitingReview],
            ProposalStatus::Approved,
            None,
            "approve",
        )
        .await
    }

    pub async fn reject(&self, id: &ProposalId, reason: Option<&str>) -> Result<()> {
        let detail = reason.map(|r| json!({ "reason": r }));
        self.move_status(
            id,
            &[ProposalStatus::Draft, ProposalStatus::WaitingReview, ProposalStatus::Approved],
            ProposalStatus::Rejected,
            detail.as_ref(),
            "reject",
        )
        .await
    }

    async fn move_status(
        &self,
        id: &ProposalId,
        allowed: &[ProposalStatus],
        to: ProposalStatus,
        failure: Option<&Value>,
        action: &'static str,
    ) -> Result<()> {
        let current = self.ledger.require_proposal(id).await?.proposal.status;
        if !allowed.contains(&current) {
            return Err(CommitError::InvalidState {
                proposal_id: id.to_string(),
                status: current,
                action,
            });
        }
        self.ledger.transition_proposal(id, current, to, failure).await?;
        Ok(())
    }

    // ── Commit ───────────────────────────────────────────────────

    /// Commit a DRAFT, APPROVED or READY proposal.
    ///
    /// On `Err` the proposal is returned to the status it was committed from,
    /// with the error recorded, and the graph holds no trace of the attempt.
    pub async fn commit(&self, id: &ProposalId) -> Result<CommitOutcome> {
        let proposal = self.ledger.require_proposal(id).await?.proposal;
        let entry = proposal.status;
        if !entry.is_commit_entry() {
            return Err(CommitError::InvalidState {
                proposal_id: id.to_string(),
                status: entry,
                action: "commit",
            });
        }

        self.ledger
            .transition_proposal(id, entry, ProposalStatus::Committing, None)
            .await?;
        tracing::info!(proposal_id = %id, tenant_id = %proposal.tenant_id, from = %entry, "Commit started");

        match self.run_commit(&proposal, entry).await {
            Ok(outcome) => {
                tracing::info!(proposal_id = %id, status = %outcome.status(), "Commit finished");
                Ok(outcome)
            }
            Err(e) => {
                self.release(id, entry, &e).await;
                Err(e)
            }
        }
    }

    async fn run_commit(&self, proposal: &Proposal, entry: ProposalStatus) -> Result<CommitOutcome> {
        let id = &proposal.proposal_id;
        let tenant = &proposal.tenant_id;

        let (operations, resolved) = resolve_temp_ids(&proposal.operations);
        let targets = touched_targets(&operations);
        let target_ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();

        let rebase = self
            .rebase
            .check(tenant, proposal.base_graph_version, &target_ids)
            .await?;
        if rebase.is_conflict() {
            return self
                .finish_conflict(id, rebase.current_version, rebase.overlapping)
                .await;
        }

        // READY carries the integrity worker's verdict and is trusted; edges
        // committed after that check are not re-examined.
        if entry != ProposalStatus::Ready {
            let changeset = Changeset::from_operations(&operations)
                .with_context_edges(self.graph.prereq_edges(tenant).await?);

            if self.checker.requires_async(&changeset) {
                let estimate = self.checker.estimate_cost(&changeset);
                self.ledger
                    .transition_proposal(id, ProposalStatus::Committing, ProposalStatus::AsyncCheckRequired, None)
                    .await?;
                tracing::info!(
                    proposal_id = %id,
                    elements = changeset.size(),
                    estimated_ms = duration_ms(estimate),
                    "Integrity check deferred"
                );
                return Ok(CommitOutcome::AsyncCheckRequired {
                    estimated_cost_ms: duration_ms(estimate),
                });
            }

            let report = self.checker.check(&changeset);
            if !report.ok {
                let detail = serde_json::to_value(&report)?;
                self.ledger
                    .transition_proposal(id, ProposalStatus::Committing, ProposalStatus::Failed, Some(&detail))
                    .await?;
                tracing::info!(
                    proposal_id = %id,
                    categories = ?report.violations.keys().collect::<Vec<_>>(),
                    "Integrity check failed"
                );
                return Ok(CommitOutcome::IntegrityFailed { report });
            }
        }

        let mut befores = Vec::with_capacity(operations.len());
        for op in &operations {
            befores.push(self.graph.snapshot(tenant, op).await?);
        }
        let reverts = revert_operations(&befores, &operations);

        self.graph.apply(tenant, &operations).await?;

        let recorded = self
            .record_with_retry(proposal, &operations, targets, &reverts, rebase.current_version, &resolved)
            .await;

        match recorded {
            Ok(Recorded::Committed(outcome)) => Ok(outcome),
            Ok(Recorded::Conflict {
                current_version,
                overlapping,
            }) => {
                self.compensate(tenant, id, &reverts).await;
                self.finish_conflict(id, current_version, overlapping).await
            }
            Err(e) => {
                self.compensate(tenant, id, &reverts).await;
                Err(e)
            }
        }
    }

    /// Record the applied changeset, re-running the rebase check each time
    /// another commit of the tenant wins the version race.
    async fn record_with_retry(
        &self,
        proposal: &Proposal,
        operations: &[Operation],
        targets: Vec<Target>,
        reverts: &[Operation],
        observed_version: i64,
        resolved: &HashMap<String, String>,
    ) -> Result<Recorded> {
        let target_ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();
        let mut record = CommitRecord {
            tenant_id: proposal.tenant_id.clone(),
            proposal_id: proposal.proposal_id.clone(),
            expected_version: observed_version,
            tx_id: TxId::generate(),
            targets,
            operations_applied: operations.to_vec(),
            revert_operations: reverts.to_vec(),
            correlation_id: Some(proposal.proposal_id.to_string()),
        };

        let mut retries = 0;
        loop {
            match self.ledger.record_commit(&record).await {
                Ok(committed) => {
                    return Ok(Recorded::Committed(CommitOutcome::Done {
                        graph_version: committed.graph_version,
                        tx_id: record.tx_id,
                        event_id: committed.event_id,
                        resolved_ids: resolved.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    }));
                }
                Err(LedgerError::VersionRace { expected, .. }) if retries < self.config.max_commit_retries => {
                    retries += 1;
                    let again = self
                        .rebase
                        .check(&proposal.tenant_id, expected, &target_ids)
                        .await?;
                    tracing::warn!(
                        proposal_id = %proposal.proposal_id,
                        expected,
                        current = again.current_version,
                        retry = retries,
                        "Lost version race"
                    );
                    if again.is_conflict() {
                        return Ok(Recorded::Conflict {
                            current_version: again.current_version,
                            overlapping: again.overlapping,
                        });
                    }
                    record.expected_version = again.current_version;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn finish_conflict(
        &self,
        id: &ProposalId,
        current_version: i64,
        overlapping: Vec<String>,
    ) -> Result<CommitOutcome> {
        let detail = json!({
            "reason": "overlapping_targets",
            "current_version": current_version,
            "overlapping": overlapping,
        });
        self.ledger
            .transition_proposal(id, ProposalStatus::Committing, ProposalStatus::Conflict, Some(&detail))
            .await?;
        tracing::info!(proposal_id = %id, current_version, ?overlapping, "Commit conflicted");
        Ok(CommitOutcome::Conflict {
            current_version,
            overlapping,
        })
    }

    /// Undo a graph apply whose ledger record did not land.
    async fn compensate(&self, tenant: &TenantId, id: &ProposalId, reverts: &[Operation]) {
        if reverts.is_empty() {
            return;
        }
        match self.graph.apply(tenant, reverts).await {
            Ok(()) => tracing::warn!(proposal_id = %id, operations = reverts.len(), "Compensated graph apply"),
            Err(e) => tracing::error!(
                proposal_id = %id,
                error = %e,
                "Compensation failed; audit revert operations must be applied manually"
            ),
        }
    }

    /// Put a proposal interrupted by an infrastructure failure back where
    /// the commit found it.
    async fn release(&self, id: &ProposalId, entry: ProposalStatus, error: &CommitError) {
        let detail = json!({ "error": error.to_string(), "retryable": true });
        match self
            .ledger
            .transition_proposal(id, ProposalStatus::Committing, entry, Some(&detail))
            .await
        {
            Ok(()) => tracing::warn!(proposal_id = %id, status = %entry, error = %error, "Commit interrupted"),
            // Already settled, e.g. the failure came after a terminal transition.
            Err(LedgerError::InvalidTransition { actual, .. }) => {
                tracing::warn!(proposal_id = %id, status = %actual, error = %error, "Commit failed after settling")
            }
            Err(e) => tracing::error!(proposal_id = %id, error = %e, "Could not release proposal"),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
