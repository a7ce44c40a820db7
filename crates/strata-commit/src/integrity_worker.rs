//! Background integrity checks for deferred proposals.
//!
//! Proposals parked in ASYNC_CHECK_REQUIRED by the commit pipeline are
//! checked here without a latency budget. A pass moves them to READY, a
//! failure to FAILED with the report. READY proposals are committed again
//! when `resume_commits` is set; that commit skips the inline check.

use std::sync::Arc;

use serde::Serialize;

use strata_core::changeset::{resolve_temp_ids, Changeset};
use strata_core::config::IntegrityWorkerConfig;
use strata_core::types::{Proposal, ProposalStatus};

use crate::error::Result;
use crate::pipeline::{CommitOutcome, CommitPipeline};

/// Tally of one [`IntegrityWorker::process_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub checked: usize,
    pub ready: usize,
    pub failed: usize,
    /// READY proposals that went on to commit successfully.
    pub committed: usize,
    pub errors: usize,
}

pub struct IntegrityWorker {
    pipeline: Arc<CommitPipeline>,
    config: IntegrityWorkerConfig,
}

enum Verdict {
    Ready,
    Failed,
}

impl IntegrityWorker {
    pub fn new(pipeline: Arc<CommitPipeline>, config: IntegrityWorkerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Check up to `limit` deferred proposals, oldest first.
    ///
    /// One proposal's error does not stop the pass; it is logged and counted.
    pub async fn process_once(&self, limit: u32) -> Result<WorkerReport> {
        let pending = self
            .pipeline
            .ledger()
            .list_proposals_by_status(ProposalStatus::AsyncCheckRequired, limit)
            .await?;

        let mut report = WorkerReport::default();
        for record in pending {
            let proposal = record.proposal;
            report.checked += 1;

            match self.check_one(&proposal).await {
                Ok(Verdict::Failed) => report.failed += 1,
                Ok(Verdict::Ready) => {
                    report.ready += 1;
                    if self.config.resume_commits {
                        match self.pipeline.commit(&proposal.proposal_id).await {
                            Ok(CommitOutcome::Done { .. }) => report.committed += 1,
                            Ok(outcome) => tracing::info!(
                                proposal_id = %proposal.proposal_id,
                                status = %outcome.status(),
                                "Resumed commit did not complete"
                            ),
                            Err(e) => {
                                tracing::warn!(proposal_id = %proposal.proposal_id, error = %e, "Resumed commit failed");
                                report.errors += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(proposal_id = %proposal.proposal_id, error = %e, "Deferred integrity check failed to run");
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                ready = report.ready,
                failed = report.failed,
                committed = report.committed,
                errors = report.errors,
                "Integrity pass complete"
            );
        }
        Ok(report)
    }

    async fn check_one(&self, proposal: &Proposal) -> Result<Verdict> {
        let id = &proposal.proposal_id;
        let (operations, _) = resolve_temp_ids(&proposal.operations);
        let changeset = Changeset::from_operations(&operations)
            .with_context_edges(self.pipeline.graph().prereq_edges(&proposal.tenant_id).await?);

        let report = self.pipeline.checker().check(&changeset);
        let ledger = self.pipeline.ledger();
        if report.ok {
            ledger
                .transition_proposal(id, ProposalStatus::AsyncCheckRequired, ProposalStatus::Ready, None)
                .await?;
            Ok(Verdict::Ready)
        } else {
            let detail = serde_json::to_value(&report)?;
            ledger
                .transition_proposal(id, ProposalStatus::AsyncCheckRequired, ProposalStatus::Failed, Some(&detail))
                .await?;
            tracing::info!(
                proposal_id = %id,
                categories = ?report.violations.keys().collect::<Vec<_>>(),
                "Deferred integrity check failed"
            );
            Ok(Verdict::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::config::PipelineConfig;
    use strata_core::types::{Evidence, OpType, Operation, TenantId};
    use strata_graph::MemoryGraph;
    use strata_ledger::LedgerStore;

    fn ev() -> Evidence {
        Evidence::new("chunk-1", "quote")
    }

    async fn deferring_pipeline() -> Arc<CommitPipeline> {
        let ledger = LedgerStore::memory().await.unwrap();
        let config = PipelineConfig {
            integrity_sync_threshold_ms: 0,
            ..PipelineConfig::default()
        };
        Arc::new(CommitPipeline::new(ledger, Arc::new(MemoryGraph::new()), config))
    }

    #[tokio::test]
    async fn marks_ready_without_committing_when_resume_is_off() {
        let pipeline = deferring_pipeline().await;
        let ops = vec![Operation::node("o1", OpType::CreateNode, "Concept", "C1").with_evidence(ev())];
        let proposal = pipeline.submit(TenantId::new("t1"), 0, ops).await.unwrap();
        pipeline.commit(&proposal.proposal_id).await.unwrap();

        let worker = IntegrityWorker::new(
            pipeline.clone(),
            IntegrityWorkerConfig {
                resume_commits: false,
                ..IntegrityWorkerConfig::default()
            },
        );
        let report = worker.process_once(10).await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.ready, 1);
        assert_eq!(report.committed, 0);

        let stored = pipeline.ledger().require_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(stored.proposal.status, ProposalStatus::Ready);
    }

    #[tokio::test]
    async fn failing_proposals_keep_the_report() {
        let pipeline = deferring_pipeline().await;
        let ops = vec![Operation::node("o1", OpType::CreateNode, "Skill", "S1").with_evidence(ev())];
        let proposal = pipeline.submit(TenantId::new("t1"), 0, ops).await.unwrap();
        pipeline.commit(&proposal.proposal_id).await.unwrap();

        let worker = IntegrityWorker::new(pipeline.clone(), IntegrityWorkerConfig::default());
        let report = worker.process_once(10).await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = pipeline.ledger().require_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(stored.proposal.status, ProposalStatus::Failed);
        let failure = stored.failure.unwrap();
        assert_eq!(failure["ok"], false);
        assert!(failure["violations"]["dangling_skills"].is_array());
    }

    #[tokio::test]
    async fn idle_pass_reports_nothing() {
        let pipeline = deferring_pipeline().await;
        let worker = IntegrityWorker::new(pipeline, IntegrityWorkerConfig::default());
        assert_eq!(worker.process_once(10).await.unwrap(), WorkerReport::default());
    }
}
