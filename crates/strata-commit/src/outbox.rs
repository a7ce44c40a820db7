//! Outbox publisher.
//!
//! Each pass claims a batch of deliverable rows, pushes `graph_committed`
//! payloads to the delivery channel and settles every row: published on
//! success, failed (retryable) on a delivery error, dead-lettered when the
//! event type is unknown. Rows whose payload no longer decodes are
//! dead-lettered by the ledger during the claim. Concurrent passes never share a row because the
//! claim is a compare-and-set on the row's claim token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::Registry;
use serde::Serialize;

use strata_core::config::OutboxConfig;
use strata_core::events::EventType;
use strata_ledger::{LedgerStore, OutboxEvent};

use crate::delivery::DeliveryChannel;
use crate::error::Result;
use crate::metrics::{self, OutboxMetrics};

/// `last_error` of rows whose event type the publisher does not know.
pub const UNSUPPORTED_EVENT_TYPE: &str = "unsupported_event_type";

/// Tally of one [`OutboxPublisher::process_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Rows whose claim expired and was taken over before they were settled.
    pub lost: usize,
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Published,
    Failed,
    DeadLettered,
}

impl Settlement {
    fn as_str(&self) -> &'static str {
        match self {
            Settlement::Published => "published",
            Settlement::Failed => "failed",
            Settlement::DeadLettered => "dead_lettered",
        }
    }
}

pub struct OutboxPublisher {
    ledger: LedgerStore,
    channel: Arc<dyn DeliveryChannel>,
    config: OutboxConfig,
    claimer: String,
    registry: Registry,
    metrics: OutboxMetrics,
}

impl OutboxPublisher {
    pub fn new(ledger: LedgerStore, channel: Arc<dyn DeliveryChannel>, config: OutboxConfig) -> Result<Self> {
        let registry = Registry::new();
        let metrics = OutboxMetrics::new(&registry)?;
        Ok(Self {
            ledger,
            channel,
            config,
            claimer: format!("publisher-{}", std::process::id()),
            registry,
            metrics,
        })
    }

    /// Publish up to `limit` rows, oldest first.
    pub async fn process_once(&self, limit: u32) -> Result<PublishReport> {
        let claim = self
            .ledger
            .claim_batch(
                &self.claimer,
                limit,
                self.config.max_attempts,
                Duration::from_secs(self.config.claim_ttl_secs),
            )
            .await?;

        let mut report = PublishReport {
            claimed: claim.events.len() + claim.undecodable.len(),
            dead_lettered: claim.undecodable.len(),
            ..PublishReport::default()
        };
        for _ in &claim.undecodable {
            self.metrics.record("undecodable", Settlement::DeadLettered.as_str(), 0.0);
        }

        for event in &claim.events {
            let started = Instant::now();
            let (settlement, held) = self.settle(event, &claim.token).await?;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            self.metrics.record(&event.event_type, settlement.as_str(), latency_ms);

            if !held {
                tracing::warn!(event_id = %event.event_id, "Outbox claim lost before settling");
                report.lost += 1;
                continue;
            }
            match settlement {
                Settlement::Published => report.published += 1,
                Settlement::Failed => report.failed += 1,
                Settlement::DeadLettered => report.dead_lettered += 1,
            }
        }

        self.metrics.pending.set(self.ledger.pending_event_count().await?);

        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                published = report.published,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "Outbox pass complete"
            );
        }
        Ok(report)
    }

    /// Deliver one row and record the result. The flag is false when the
    /// claim was no longer held at settlement time.
    async fn settle(&self, event: &OutboxEvent, token: &str) -> Result<(Settlement, bool)> {
        match event.event_type.parse::<EventType>() {
            Ok(EventType::GraphCommitted) => {
                match self.channel.publish(&self.config.queue_name, &event.payload).await {
                    Ok(()) => {
                        let held = self.ledger.mark_published(&event.event_id, token).await?;
                        Ok((Settlement::Published, held))
                    }
                    Err(e) => {
                        tracing::warn!(
                            event_id = %event.event_id,
                            attempts = event.attempts + 1,
                            error = %e,
                            "Outbox delivery failed"
                        );
                        let held = self
                            .ledger
                            .mark_failed(&event.event_id, token, &e.to_string())
                            .await?;
                        Ok((Settlement::Failed, held))
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Dead-lettering event of unsupported type"
                );
                let held = self
                    .ledger
                    .mark_dead_lettered(&event.event_id, token, UNSUPPORTED_EVENT_TYPE)
                    .await?;
                Ok((Settlement::DeadLettered, held))
            }
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current metrics in the Prometheus text format.
    pub fn export_metrics(&self) -> Result<String> {
        metrics::export(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::types::TenantId;

    use crate::delivery::MemoryQueue;

    async fn publisher(queue: Arc<MemoryQueue>, max_attempts: u32) -> (OutboxPublisher, LedgerStore) {
        let ledger = LedgerStore::memory().await.unwrap();
        let config = OutboxConfig {
            max_attempts,
            ..OutboxConfig::default()
        };
        (OutboxPublisher::new(ledger.clone(), queue, config).unwrap(), ledger)
    }

    #[tokio::test]
    async fn delivers_payload_verbatim_and_marks_published() {
        let queue = Arc::new(MemoryQueue::new());
        let (publisher, ledger) = publisher(queue.clone(), 10).await;
        let payload = json!({"tenant_id": "t1", "targets": ["C1", "S1"]});
        let id = ledger
            .enqueue_event(&TenantId::new("t1"), "graph_committed", &payload)
            .await
            .unwrap();

        let report = publisher.process_once(10).await.unwrap();
        assert_eq!(report.published, 1);

        let queue_name = OutboxConfig::default().queue_name;
        assert_eq!(queue.drain(&queue_name).await, vec![payload]);
        let row = ledger.get_event(&id).await.unwrap().unwrap();
        assert!(row.published);
        assert_eq!(row.attempts, 0);
    }

    #[tokio::test]
    async fn delivery_failures_stay_retryable() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next(1);
        let (publisher, ledger) = publisher(queue.clone(), 10).await;
        let id = ledger
            .enqueue_event(&TenantId::new("t1"), "graph_committed", &json!({"targets": []}))
            .await
            .unwrap();

        let first = publisher.process_once(10).await.unwrap();
        assert_eq!(first.failed, 1);
        let row = ledger.get_event(&id).await.unwrap().unwrap();
        assert!(!row.published);
        assert_eq!(row.attempts, 1);
        assert!(row.last_error.is_some());

        let second = publisher.process_once(10).await.unwrap();
        assert_eq!(second.published, 1);
        let row = ledger.get_event(&id).await.unwrap().unwrap();
        assert!(row.published);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn unsupported_types_are_dead_lettered_once() {
        let queue = Arc::new(MemoryQueue::new());
        let (publisher, ledger) = publisher(queue.clone(), 10).await;
        let id = ledger
            .enqueue_event(&TenantId::new("t1"), "graph_deleted", &json!({}))
            .await
            .unwrap();

        let report = publisher.process_once(10).await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        let again = publisher.process_once(10).await.unwrap();
        assert_eq!(again.claimed, 0);

        let row = ledger.get_event(&id).await.unwrap().unwrap();
        assert!(!row.published);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error.as_deref(), Some(UNSUPPORTED_EVENT_TYPE));
        assert_eq!(queue.len(&OutboxConfig::default().queue_name).await, 0);
    }

    #[tokio::test]
    async fn attempts_ceiling_stops_retries() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next(5);
        let (publisher, ledger) = publisher(queue.clone(), 2).await;
        ledger
            .enqueue_event(&TenantId::new("t1"), "graph_committed", &json!({}))
            .await
            .unwrap();

        publisher.process_once(10).await.unwrap();
        publisher.process_once(10).await.unwrap();
        let third = publisher.process_once(10).await.unwrap();
        assert_eq!(third.claimed, 0);
    }

    #[tokio::test]
    async fn corrupt_row_does_not_block_the_batch() {
        let queue = Arc::new(MemoryQueue::new());
        let (publisher, ledger) = publisher(queue.clone(), 10).await;
        let tenant = TenantId::new("t1");
        let healthy = json!({"tenant_id": "t1", "targets": ["C1"]});
        let broken = ledger.enqueue_event(&tenant, "graph_committed", &json!({})).await.unwrap();
        let good = ledger.enqueue_event(&tenant, "graph_committed", &healthy).await.unwrap();
        sqlx::query("UPDATE events_outbox SET payload = '{truncated' WHERE event_id = ?")
            .bind(broken.as_str())
            .execute(ledger.pool())
            .await
            .unwrap();

        let report = publisher.process_once(10).await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.published, 1);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(queue.drain(&OutboxConfig::default().queue_name).await, vec![healthy]);
        assert!(ledger.get_event(&good).await.unwrap().unwrap().published);

        let again = publisher.process_once(10).await.unwrap();
        assert_eq!(again, PublishReport::default());
        let text = publisher.export_metrics().unwrap();
        assert!(text.contains("event_type=\"undecodable\""));
    }

    #[tokio::test]
    async fn passes_are_counted_in_metrics() {
        let queue = Arc::new(MemoryQueue::new());
        let (publisher, ledger) = publisher(queue, 10).await;
        let tenant = TenantId::new("t1");
        ledger.enqueue_event(&tenant, "graph_committed", &json!({})).await.unwrap();
        ledger.enqueue_event(&tenant, "mystery", &json!({})).await.unwrap();

        publisher.process_once(10).await.unwrap();
        let text = publisher.export_metrics().unwrap();
        assert!(text.contains("outbox_publish_total{result=\"published\"} 1"));
        assert!(text.contains("outbox_publish_total{result=\"dead_lettered\"} 1"));
        assert!(text.contains("event_type=\"mystery\""));
        assert!(text.contains("outbox_pending 0"));
    }
}
