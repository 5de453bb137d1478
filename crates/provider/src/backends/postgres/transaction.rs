//! Explicit transactions for the PostgreSQL backend.

use async_trait::async_trait;
use deadpool_postgres::Client;
use serde_json::Value;

use crate::core::{Record, SqlParam, TransactionContext, TransactionOptions};
use crate::error::{ProviderError, ProviderResult, TransactionError};

use super::rows;
use super::sql::{map_pg_error, op_label, param_refs, record_from_row};

/// A transaction bound to one pooled connection.
///
/// Created by `BEGIN` with the requested isolation level; consumed by
/// `COMMIT`/`ROLLBACK`. If dropped while still active, a rollback is issued
/// on a background task before the connection returns to the pool.
pub struct PgTransaction {
    client: Option<Client>,
    active: bool,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction")
            .field("active", &self.active)
            .finish()
    }
}

impl PgTransaction {
    pub(crate) async fn begin(client: Client, options: TransactionOptions) -> ProviderResult<Self> {
        let mut begin = format!(
            "BEGIN ISOLATION LEVEL {}",
            options.isolation_level.as_sql()
        );
        if options.read_only {
            begin.push_str(" READ ONLY");
        }
        client.batch_execute(&begin).await.map_err(|e| {
            ProviderError::Transaction(TransactionError::BeginFailed {
                message: e.to_string(),
            })
        })?;

        if let Some(timeout_ms) = options.timeout_ms {
            client
                .batch_execute(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
                .await
                .map_err(|e| {
                    ProviderError::Transaction(TransactionError::BeginFailed {
                        message: format!("failed to set transaction timeout: {e}"),
                    })
                })?;
        }

        Ok(Self {
            client: Some(client),
            active: true,
        })
    }

    fn client(&self) -> ProviderResult<&Client> {
        if !self.active {
            return Err(ProviderError::Transaction(TransactionError::Inactive));
        }
        self.client
            .as_ref()
            .ok_or(ProviderError::Transaction(TransactionError::Inactive))
    }
}

#[async_trait]
impl TransactionContext for PgTransaction {
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<Vec<Record>> {
        let client = self.client()?;
        let rows = client
            .query(sql, &param_refs(params))
            .await
            .map_err(|e| map_pg_error(&op_label(sql), e))?;
        rows.iter().map(record_from_row).collect()
    }

    async fn query_one(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> ProviderResult<Option<Record>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().next())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<u64> {
        let client = self.client()?;
        client
            .execute(sql, &param_refs(params))
            .await
            .map_err(|e| map_pg_error(&op_label(sql), e))
    }

    async fn insert_row(&mut self, table: &str, row: Value) -> ProviderResult<Value> {
        let client = self.client()?;
        rows::insert_row(client, table, row).await
    }

    async fn fetch_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        let client = self.client()?;
        rows::fetch_row(client, table, client_id, id).await
    }

    async fn delete_row(&mut self, table: &str, client_id: &str, id: &str) -> ProviderResult<()> {
        let client = self.client()?;
        rows::delete_row(client, table, client_id, id).await
    }

    async fn commit(mut self: Box<Self>) -> ProviderResult<()> {
        if !self.active {
            return Err(ProviderError::Transaction(TransactionError::Inactive));
        }
        let client = self
            .client
            .take()
            .ok_or(ProviderError::Transaction(TransactionError::Inactive))?;
        self.active = false;
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| map_pg_error("COMMIT", e))?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> ProviderResult<()> {
        if !self.active {
            return Err(ProviderError::Transaction(TransactionError::Inactive));
        }
        let client = self
            .client
            .take()
            .ok_or(ProviderError::Transaction(TransactionError::Inactive))?;
        self.active = false;
        client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| map_pg_error("ROLLBACK", e))?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // An active transaction must not return to the pool uncleaned.
        if self.active {
            if let Some(client) = self.client.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = client.batch_execute("ROLLBACK").await {
                            tracing::warn!(error = %err, "rollback on drop failed");
                        }
                    });
                } else {
                    tracing::warn!("transaction dropped outside a runtime; connection discarded");
                }
            }
        }
    }
}
