//! Snapshot transactions for the memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::{Record, SqlParam, TransactionContext};
use crate::error::{ProviderError, ProviderResult, TransactionError, UnsupportedError};

use super::provider::MemoryState;

/// A transaction over a snapshot of the shared state.
///
/// Begin clones the state; all writes land in the working copy; commit
/// replaces the shared state wholesale and rollback discards the copy.
/// Concurrent transactions are last-writer-wins, which is sufficient for
/// the development role this backend plays.
pub struct MemoryTransaction {
    shared: Arc<RwLock<MemoryState>>,
    working: MemoryState,
    active: bool,
}

impl MemoryTransaction {
    pub(crate) fn new(shared: Arc<RwLock<MemoryState>>, working: MemoryState) -> Self {
        Self {
            shared,
            working,
            active: true,
        }
    }

    fn ensure_active(&self) -> ProviderResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(ProviderError::Transaction(TransactionError::Inactive))
        }
    }
}

#[async_trait]
impl TransactionContext for MemoryTransaction {
    async fn query(&mut self, _sql: &str, _params: &[SqlParam]) -> ProviderResult<Vec<Record>> {
        Err(UnsupportedError::operation("memory", "transaction query"))
    }

    async fn query_one(
        &mut self,
        _sql: &str,
        _params: &[SqlParam],
    ) -> ProviderResult<Option<Record>> {
        Err(UnsupportedError::operation("memory", "transaction query_one"))
    }

    async fn execute(&mut self, _sql: &str, _params: &[SqlParam]) -> ProviderResult<u64> {
        Err(UnsupportedError::operation("memory", "transaction execute"))
    }

    async fn insert_row(&mut self, table: &str, row: Value) -> ProviderResult<Value> {
        self.ensure_active()?;
        self.working.insert_row(table, row)
    }

    async fn fetch_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        self.ensure_active()?;
        Ok(self.working.fetch_row(table, client_id, id))
    }

    async fn delete_row(&mut self, table: &str, client_id: &str, id: &str) -> ProviderResult<()> {
        self.ensure_active()?;
        self.working.delete_row(table, client_id, id);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> ProviderResult<()> {
        self.ensure_active()?;
        self.active = false;
        *self.shared.write() = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> ProviderResult<()> {
        self.ensure_active()?;
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::core::{DatabaseProvider, DatabaseProviderExt, TransactionOptions};
    use crate::backends::memory::MemoryProvider;
    use serde_json::json;

    async fn seeded() -> MemoryProvider {
        let p = MemoryProvider::new(MemoryConfig::default());
        p.insert_row("clients", json!({"id": "c1"})).await.unwrap();
        p
    }

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let p = seeded().await;

        p.transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.insert_row("deliveries", json!({"id": "d1", "client_id": "c1"}))
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        assert!(p.fetch_row("deliveries", "c1", "d1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_callback_error_rolls_back_all_writes() {
        let p = seeded().await;

        let result: ProviderResult<()> = p
            .transaction(TransactionOptions::default(), |tx| {
                Box::pin(async move {
                    tx.insert_row("deliveries", json!({"id": "d1", "client_id": "c1"}))
                        .await?;
                    tx.insert_row("deliveries", json!({"id": "d2", "client_id": "c1"}))
                        .await?;
                    // A foreign-key violation inside the transaction.
                    tx.insert_row(
                        "client_users",
                        json!({"client_id": "c1", "user_id": "ghost", "role": "staff"}),
                    )
                    .await?;
                    Ok(())
                })
            })
            .await;

        assert!(result.unwrap_err().is_integrity());
        // None of the writes are visible.
        assert!(p.fetch_row("deliveries", "c1", "d1").await.unwrap().is_none());
        assert!(p.fetch_row("deliveries", "c1", "d2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_sees_own_writes() {
        let p = seeded().await;

        p.transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.insert_row("deliveries", json!({"id": "d1", "client_id": "c1"}))
                    .await?;
                let seen = tx.fetch_row("deliveries", "c1", "d1").await?;
                assert!(seen.is_some());
                Ok(())
            })
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_writes_invisible_outside() {
        let p = seeded().await;

        let mut tx = p
            .begin_transaction(TransactionOptions::default())
            .await
            .unwrap();
        tx.insert_row("deliveries", json!({"id": "d1", "client_id": "c1"}))
            .await
            .unwrap();

        assert!(p.fetch_row("deliveries", "c1", "d1").await.unwrap().is_none());

        tx.rollback().await.unwrap();
        assert!(p.fetch_row("deliveries", "c1", "d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_context_unusable_after_finalization() {
        let p = seeded().await;

        let tx = p
            .begin_transaction(TransactionOptions::default())
            .await
            .unwrap();
        assert!(tx.is_active());
        tx.commit().await.unwrap();
    }
}
