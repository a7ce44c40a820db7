//! Publish targets for outbox events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{CommitError, Result};

/// Somewhere event payloads can be pushed, e.g. a named queue.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Push `payload` onto `queue`. An `Err` leaves the event retryable.
    async fn publish(&self, queue: &str, payload: &Value) -> Result<()>;
}

/// Named in-process lists.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, Vec<Value>>>,
    failing: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail.
    pub fn fail_next(&self, n: usize) {
        self.failing.store(n, Ordering::SeqCst);
    }

    /// Take everything pushed to `queue` so far.
    pub async fn drain(&self, queue: &str) -> Vec<Value> {
        self.queues.lock().await.remove(queue).unwrap_or_default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DeliveryChannel for MemoryQueue {
    async fn publish(&self, queue: &str, payload: &Value) -> Result<()> {
        let injected = self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(CommitError::Delivery(format!("queue {queue} unavailable")));
        }
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push(payload.clone());
        Ok(())
    }
}

/// Writes one `{"queue": .., "payload": ..}` JSON line per event to stdout,
/// for consumers reading the process output.
#[derive(Debug, Default)]
pub struct JsonLinesChannel;

#[async_trait]
impl DeliveryChannel for JsonLinesChannel {
    async fn publish(&self, queue: &str, payload: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(&json!({ "queue": queue, "payload": payload }))?;
        line.push(b'\n');
        let mut out = tokio::io::stdout();
        out.write_all(&line)
            .await
            .map_err(|e| CommitError::Delivery(e.to_string()))?;
        out.flush().await.map_err(|e| CommitError::Delivery(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_queue_keeps_queues_apart() {
        let q = MemoryQueue::new();
        q.publish("a", &json!({"n": 1})).await.unwrap();
        q.publish("b", &json!({"n": 2})).await.unwrap();
        q.publish("a", &json!({"n": 3})).await.unwrap();

        assert_eq!(q.len("a").await, 2);
        assert_eq!(q.drain("a").await, vec![json!({"n": 1}), json!({"n": 3})]);
        assert_eq!(q.len("a").await, 0);
        assert_eq!(q.len("b").await, 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let q = MemoryQueue::new();
        q.fail_next(1);
        assert!(q.publish("a", &json!(1)).await.is_err());
        assert!(q.publish("a", &json!(2)).await.is_ok());
        assert_eq!(q.drain("a").await, vec![json!(2)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_consume_each_failure_once() {
        let q = Arc::new(MemoryQueue::new());
        q.fail_next(5);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let q = q.clone();
                tokio::spawn(async move { q.publish("a", &json!(i)).await.is_err() })
            })
            .collect();
        let mut failures = 0;
        for handle in handles {
            if handle.await.unwrap() {
                failures += 1;
            }
        }

        assert_eq!(failures, 5);
        assert_eq!(q.len("a").await, 45);
    }
}
