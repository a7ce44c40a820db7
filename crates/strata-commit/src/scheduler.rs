//! Periodic background passes.
//!
//! Spawns one tokio task per background loop (outbox publishing, deferred
//! integrity checks and impact-cache eviction), each ticking at its
//! configured interval. Publishing and integrity passes are recorded as jobs
//! so their result can be looked up by id.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::time::{interval, Duration};

use strata_core::config::{IntegrityWorkerConfig, OutboxConfig};
use strata_ledger::{JobStatus, LedgerStore};

use crate::diff::DiffBuilder;
use crate::error::Result;
use crate::integrity_worker::{IntegrityWorker, WorkerReport};
use crate::outbox::{OutboxPublisher, PublishReport};

pub const OUTBOX_JOB: &str = "outbox_publish";
pub const INTEGRITY_JOB: &str = "integrity_check";

/// Run `pass` as a job of `kind`, recording its result or error.
pub async fn run_job<T, F>(ledger: &LedgerStore, kind: &str, pass: F) -> Result<(String, T)>
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    let job_id = ledger.start_job(kind).await?;
    match pass.await {
        Ok(report) => {
            ledger
                .finish_job(&job_id, JobStatus::Succeeded, &serde_json::to_value(&report)?)
                .await?;
            Ok((job_id, report))
        }
        Err(e) => {
            ledger
                .finish_job(&job_id, JobStatus::Failed, &json!({ "error": e.to_string() }))
                .await?;
            Err(e)
        }
    }
}

pub async fn publish_pass(ledger: &LedgerStore, publisher: &OutboxPublisher, limit: u32) -> Result<(String, PublishReport)> {
    run_job(ledger, OUTBOX_JOB, publisher.process_once(limit)).await
}

pub async fn integrity_pass(ledger: &LedgerStore, worker: &IntegrityWorker, limit: u32) -> Result<(String, WorkerReport)> {
    run_job(ledger, INTEGRITY_JOB, worker.process_once(limit)).await
}

/// Drop expired impact neighborhoods from the shared diff builder.
pub fn sweep_impact_cache(diff: &DiffBuilder) -> usize {
    let evicted = diff.evict_expired();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = diff.cached_entries(), "Evicted impact cache entries");
    }
    evicted
}

/// The background loops of a running control plane.
pub struct BackgroundScheduler {
    ledger: LedgerStore,
    publisher: Arc<OutboxPublisher>,
    worker: Arc<IntegrityWorker>,
    diff: Arc<DiffBuilder>,
    outbox: OutboxConfig,
    integrity: IntegrityWorkerConfig,
}

impl BackgroundScheduler {
    pub fn new(
        ledger: LedgerStore,
        publisher: OutboxPublisher,
        worker: IntegrityWorker,
        diff: Arc<DiffBuilder>,
        outbox: OutboxConfig,
        integrity: IntegrityWorkerConfig,
    ) -> Self {
        Self {
            ledger,
            publisher: Arc::new(publisher),
            worker: Arc::new(worker),
            diff,
            outbox,
            integrity,
        }
    }

    /// Run every loop until the runtime shuts down.
    pub async fn run(&self) -> Result<()> {
        let ledger = self.ledger.clone();
        let publisher = self.publisher.clone();
        let outbox = self.outbox.clone();
        let outbox_handle = tokio::spawn(async move {
            run_outbox_loop(ledger, publisher, outbox).await;
        });

        let ledger = self.ledger.clone();
        let worker = self.worker.clone();
        let integrity = self.integrity.clone();
        let integrity_handle = tokio::spawn(async move {
            run_integrity_loop(ledger, worker, integrity).await;
        });

        let diff = self.diff.clone();
        let cache_handle = tokio::spawn(async move {
            run_cache_loop(diff).await;
        });

        tracing::info!(
            outbox_interval_secs = self.outbox.interval_secs,
            integrity_interval_secs = self.integrity.interval_secs,
            cache_ttl_secs = self.diff.cache_ttl().as_secs(),
            "Scheduler started"
        );

        for handle in [outbox_handle, integrity_handle, cache_handle] {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background task panicked");
            }
        }
        Ok(())
    }
}

async fn run_outbox_loop(ledger: LedgerStore, publisher: Arc<OutboxPublisher>, config: OutboxConfig) {
    let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = publish_pass(&ledger, &publisher, config.batch_limit).await {
            tracing::error!(error = %e, "Outbox pass failed");
        }
    }
}

async fn run_integrity_loop(ledger: LedgerStore, worker: Arc<IntegrityWorker>, config: IntegrityWorkerConfig) {
    let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = integrity_pass(&ledger, &worker, config.batch_limit).await {
            tracing::error!(error = %e, "Integrity pass failed");
        }
    }
}

async fn run_cache_loop(diff: Arc<DiffBuilder>) {
    let mut ticker = interval(diff.cache_ttl().max(Duration::from_secs(1)));
    loop {
        ticker.tick().await;
        sweep_impact_cache(&diff);
    }
}
