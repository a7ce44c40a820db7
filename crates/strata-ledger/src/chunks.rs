//! Source-chunk text, used to show reviewers the passage behind a quote.

use strata_core::types::TenantId;

use crate::error::Result;
use crate::store::{now_ms, LedgerStore};

impl LedgerStore {
    /// Store (or replace) the text of a chunk.
    pub async fn put_chunk(&self, tenant: &TenantId, chunk_id: &str, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO source_chunks (tenant_id, chunk_id, text, created_at_ms) VALUES (?, ?, ?, ?)
             ON CONFLICT (tenant_id, chunk_id) DO UPDATE SET text = excluded.text",
        )
        .bind(tenant.as_str())
        .bind(chunk_id)
        .bind(text)
        .bind(now_ms())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn chunk_text(&self, tenant: &TenantId, chunk_id: &str) -> Result<Option<String>> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT text FROM source_chunks WHERE tenant_id = ? AND chunk_id = ?")
                .bind(tenant.as_str())
                .bind(chunk_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_are_scoped_by_tenant_and_replaceable() {
        let store = LedgerStore::memory().await.unwrap();
        let t1 = TenantId::new("t1");
        store.put_chunk(&t1, "c1", "first draft").await.unwrap();
        store.put_chunk(&t1, "c1", "final text").await.unwrap();

        assert_eq!(store.chunk_text(&t1, "c1").await.unwrap().as_deref(), Some("final text"));
        assert!(store.chunk_text(&TenantId::new("t2"), "c1").await.unwrap().is_none());
    }
}
