//! The transactional outbox.
//!
//! Rows are written by `record_commit` (or [`LedgerStore::enqueue_event`]) and
//! drained by the publisher. A publisher first claims a batch by stamping a
//! unique claim token and an expiry on unclaimed rows in one UPDATE; only the
//! holder of that token may settle a row. A claim whose holder died expires
//! and the row becomes claimable again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use strata_core::events::EventId;
use strata_core::types::TenantId;

use crate::error::Result;
use crate::store::{now_ms, opt_datetime, to_datetime, LedgerStore};

pub(crate) const INSERT_OUTBOX: &str = "INSERT INTO events_outbox
        (event_id, tenant_id, event_type, payload, published, attempts, dead_lettered, created_at_ms)
     VALUES (?, ?, ?, ?, 0, 0, 0, ?)";

const SELECT_EVENT: &str = "SELECT seq, event_id, tenant_id, event_type, payload, published, attempts,
            last_error, dead_lettered, claimed_by, created_at_ms, published_at_ms
     FROM events_outbox";

/// One outbox row.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxEvent {
    pub seq: i64,
    pub event_id: EventId,
    pub tenant_id: TenantId,
    /// Stored as text so unknown types survive until the publisher rejects them.
    pub event_type: String,
    pub payload: Value,
    pub published: bool,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub dead_lettered: bool,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// `last_error` prefix for rows whose stored payload no longer decodes.
pub const UNDECODABLE_PAYLOAD: &str = "undecodable_payload";

/// Rows claimed by one publisher pass.
#[derive(Debug, Clone)]
pub struct OutboxClaim {
    pub token: String,
    pub events: Vec<OutboxEvent>,
    /// Claimed rows that failed to decode. They are dead-lettered before the
    /// claim is returned.
    pub undecodable: Vec<EventId>,
}

impl LedgerStore {
    /// Insert an event outside of a commit.
    pub async fn enqueue_event(&self, tenant: &TenantId, event_type: &str, payload: &Value) -> Result<EventId> {
        let event_id = EventId::new();
        sqlx::query(INSERT_OUTBOX)
            .bind(event_id.as_str())
            .bind(tenant.as_str())
            .bind(event_type)
            .bind(serde_json::to_string(payload)?)
            .bind(now_ms())
            .execute(self.pool())
            .await?;
        Ok(event_id)
    }

    /// Claim up to `limit` deliverable rows, oldest first.
    ///
    /// A row is deliverable when it is unpublished, not dead-lettered, below
    /// `max_attempts`, and unclaimed or holding an expired claim.
    pub async fn claim_batch(
        &self,
        claimer: &str,
        limit: u32,
        max_attempts: u32,
        claim_ttl: Duration,
    ) -> Result<OutboxClaim> {
        let token = format!("{claimer}:{}", Uuid::new_v4());
        let now = now_ms();
        let ttl_ms = i64::try_from(claim_ttl.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            "UPDATE events_outbox SET claimed_by = ?, claim_expires_ms = ?
             WHERE seq IN (
                 SELECT seq FROM events_outbox
                 WHERE published = 0
                   AND dead_lettered = 0
                   AND attempts < ?
                   AND (claimed_by IS NULL OR claim_expires_ms IS NULL OR claim_expires_ms < ?)
                 ORDER BY seq
                 LIMIT ?
             )",
        )
        .bind(&token)
        .bind(now.saturating_add(ttl_ms))
        .bind(i64::from(max_attempts))
        .bind(now)
        .bind(i64::from(limit))
        .execute(self.pool())
        .await?;

        let rows = sqlx::query(&format!("{SELECT_EVENT} WHERE claimed_by = ? ORDER BY seq"))
            .bind(&token)
            .fetch_all(self.pool())
            .await?;
        let mut events = Vec::with_capacity(rows.len());
        let mut undecodable = Vec::new();
        for row in &rows {
            match row_to_event(row) {
                Ok(event) => events.push(event),
                Err(err) => {
                    let event_id = EventId(row.try_get("event_id")?);
                    tracing::warn!(event_id = %event_id.as_str(), error = %err, "Dead-lettering undecodable outbox row");
                    self.mark_dead_lettered(&event_id, &token, &format!("{UNDECODABLE_PAYLOAD}: {err}"))
                        .await?;
                    undecodable.push(event_id);
                }
            }
        }

        if !events.is_empty() {
            tracing::debug!(claim = %token, count = events.len(), "Claimed outbox events");
        }
        Ok(OutboxClaim {
            token,
            events,
            undecodable,
        })
    }

    /// Mark a claimed row delivered. Returns false if the claim was lost.
    pub async fn mark_published(&self, event_id: &EventId, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE events_outbox
             SET published = 1, published_at_ms = ?, last_error = NULL,
                 claimed_by = NULL, claim_expires_ms = NULL
             WHERE event_id = ? AND claimed_by = ?",
        )
        .bind(now_ms())
        .bind(event_id.as_str())
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a retryable delivery failure and release the claim.
    pub async fn mark_failed(&self, event_id: &EventId, token: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE events_outbox
             SET attempts = attempts + 1, last_error = ?, claimed_by = NULL, claim_expires_ms = NULL
             WHERE event_id = ? AND claimed_by = ?",
        )
        .bind(error)
        .bind(event_id.as_str())
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail a row permanently. It stays unpublished and is never claimed again.
    pub async fn mark_dead_lettered(&self, event_id: &EventId, token: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE events_outbox
             SET dead_lettered = 1, attempts = attempts + 1, last_error = ?,
                 claimed_by = NULL, claim_expires_ms = NULL
             WHERE event_id = ? AND claimed_by = ?",
        )
        .bind(error)
        .bind(event_id.as_str())
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_event(&self, event_id: &EventId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(&format!("{SELECT_EVENT} WHERE event_id = ?"))
            .bind(event_id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_event).transpose()
    }

    /// A tenant's events in insertion order.
    pub async fn list_events(&self, tenant: &TenantId) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!("{SELECT_EVENT} WHERE tenant_id = ? ORDER BY seq"))
            .bind(tenant.as_str())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Rows still awaiting delivery.
    pub async fn pending_event_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM events_outbox WHERE published = 0 AND dead_lettered = 0")
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}

fn row_to_event(row: &SqliteRow) -> Result<OutboxEvent> {
    let payload: String = row.try_get("payload")?;
    let published: i64 = row.try_get("published")?;
    let dead_lettered: i64 = row.try_get("dead_lettered")?;

    Ok(OutboxEvent {
        seq: row.try_get("seq")?,
        event_id: EventId(row.try_get("event_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        event_type: row.try_get("event_type")?,
        payload: serde_json::from_str(&payload)?,
        published: published != 0,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        dead_lettered: dead_lettered != 0,
        claimed_by: row.try_get("claimed_by")?,
        created_at: to_datetime(row.try_get("created_at_ms")?)?,
        published_at: opt_datetime(row.try_get("published_at_ms")?)?,
    })
}
