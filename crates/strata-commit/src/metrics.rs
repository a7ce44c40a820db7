//! Prometheus metrics for the outbox publisher.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{CommitError, Result};

pub struct OutboxMetrics {
    /// Settled rows by result.
    pub publish_total: IntCounterVec,

    /// Time to settle one row, in milliseconds.
    pub publish_latency_ms: HistogramVec,

    /// Rows awaiting delivery after the last pass.
    pub pending: IntGauge,
}

impl OutboxMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let publish_total = IntCounterVec::new(
            Opts::new("outbox_publish_total", "Outbox rows settled, by result"),
            &["result"],
        )?;
        registry.register(Box::new(publish_total.clone()))?;

        let publish_latency_ms = HistogramVec::new(
            HistogramOpts::new("outbox_publish_latency_ms", "Outbox delivery latency in milliseconds")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
            &["event_type", "result"],
        )?;
        registry.register(Box::new(publish_latency_ms.clone()))?;

        let pending = IntGauge::new("outbox_pending", "Outbox rows awaiting delivery")?;
        registry.register(Box::new(pending.clone()))?;

        Ok(Self {
            publish_total,
            publish_latency_ms,
            pending,
        })
    }

    pub fn record(&self, event_type: &str, result: &str, latency_ms: f64) {
        self.publish_total.with_label_values(&[result]).inc();
        self.publish_latency_ms
            .with_label_values(&[event_type, result])
            .observe(latency_ms);
    }
}

/// Render `registry` in the Prometheus text format.
pub fn export(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| CommitError::Metrics(prometheus::Error::Msg(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_show_up_in_export() {
        let registry = Registry::new();
        let metrics = OutboxMetrics::new(&registry).unwrap();
        metrics.record("graph_committed", "published", 3.0);
        metrics.record("graph_committed", "published", 7.0);
        metrics.pending.set(4);

        let text = export(&registry).unwrap();
        assert!(text.contains("outbox_publish_total{result=\"published\"} 2"));
        assert!(text.contains("outbox_publish_latency_ms_count{event_type=\"graph_committed\",result=\"published\"} 2"));
        assert!(text.contains("outbox_pending 4"));
    }

    #[test]
    fn registering_twice_fails() {
        let registry = Registry::new();
        OutboxMetrics::new(&registry).unwrap();
        assert!(OutboxMetrics::new(&registry).is_err());
    }
}
