//! PostgreSQL provider implementation.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime, SslMode};
use serde_json::Value;
use tokio_postgres::NoTls;

use crate::backends::retry_transient;
use crate::config::PostgresConfig;
use crate::core::{
    AuthProvider, DatabaseProvider, HealthReport, IndexDef, MembershipStore, PoolStats,
    ProviderCapability, ProviderKind, QueryOptions, Record, SecurityProvider, SqlParam,
    StorageProvider, TableDef, TransactionContext, TransactionOptions,
};
use crate::error::{
    ConnectionError, ProviderError, ProviderResult, TransientError,
};
use crate::security::StoreSecurityProvider;

use super::rows;
use super::schema;
use super::security::PgMembershipStore;
use super::sql::{self, map_pg_error, op_label, param_refs, record_from_row};
use super::transaction::PgTransaction;

/// Raw-SQL provider over a bounded deadpool connection pool.
pub struct PostgresProvider {
    pool: Pool,
    config: PostgresConfig,
    connected: AtomicBool,
}

impl Debug for PostgresProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProvider")
            .field("host", &self.config.host)
            .field("dbname", &self.config.dbname)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl PostgresProvider {
    /// Creates a provider and verifies connectivity.
    pub async fn new(config: PostgresConfig) -> ProviderResult<Self> {
        let pool = Self::create_pool(&config)?;

        // Fail fast: a provider that cannot reach its backend should not
        // be handed to the application.
        let client = pool.get().await?;
        drop(client);

        Ok(Self {
            pool,
            config,
            connected: AtomicBool::new(true),
        })
    }

    /// Creates a provider from a `postgres://` connection string.
    pub async fn from_url(url: &str) -> ProviderResult<Self> {
        let config = PostgresConfig::from_url(url)?;
        Self::new(config).await
    }

    fn create_pool(config: &PostgresConfig) -> ProviderResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = config.password.clone();
        cfg.ssl_mode = Some(if config.options.ssl {
            SslMode::Require
        } else {
            SslMode::Prefer
        });

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let pool = cfg
            .builder(NoTls)
            .map_err(|e| {
                ProviderError::Connection(ConnectionError::Failed {
                    provider: "postgres".to_string(),
                    message: format!("failed to create pool builder: {e}"),
                })
            })?
            .max_size(config.options.pool_size)
            .create_timeout(Some(connect_timeout))
            .wait_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                ProviderError::Connection(ConnectionError::Failed {
                    provider: "postgres".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(pool)
    }

    /// Returns current pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Connection(ConnectionError::NotConnected {
                provider: "postgres".to_string(),
            }))
        }
    }

    async fn client(&self) -> ProviderResult<deadpool_postgres::Client> {
        self.ensure_connected()?;
        Ok(self.pool.get().await?)
    }

    /// One attempt at a statement with a client-side timeout. A timed-out
    /// future is dropped, which returns the connection to the pool.
    async fn run_statement<T, F, Fut>(
        &self,
        operation: &str,
        timeout_ms: u64,
        run: F,
    ) -> ProviderResult<T>
    where
        F: FnOnce(deadpool_postgres::Client) -> Fut,
        Fut: Future<Output = Result<T, tokio_postgres::Error>>,
    {
        let client = self.client().await?;
        let timeout = Duration::from_millis(timeout_ms);
        match tokio::time::timeout(timeout, run(client)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_pg_error(operation, err)),
            Err(_) => Err(ProviderError::Transient(TransientError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })),
        }
    }
}

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Postgres
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![
            ProviderCapability::RawSql,
            ProviderCapability::Transactions,
            ProviderCapability::SchemaManagement,
            ProviderCapability::RowCrud,
            ProviderCapability::ReferentialIntegrity,
            ProviderCapability::ConnectionPooling,
        ]
    }

    async fn connect(&self) -> ProviderResult<()> {
        let client = self.pool.get().await?;
        drop(client);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        // The pool itself lives until the provider is dropped; marking the
        // provider out of service is what callers observe.
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn health_check(&self) -> ProviderResult<HealthReport> {
        let start = Instant::now();
        let client = self.client().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| map_pg_error("health check", e))?;
        Ok(HealthReport {
            provider: "postgres".to_string(),
            kind: ProviderKind::Postgres,
            latency: start.elapsed(),
        })
    }

    async fn initialize(&self) -> ProviderResult<()> {
        let client = self.client().await?;
        schema::initialize_schema(&client).await
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<Vec<Record>> {
        let operation = op_label(sql);
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.statement_timeout_ms);
        retry_transient(&operation, options.retries, || {
            self.run_statement(&operation, timeout_ms, |client| async move {
                let rows = client.query(sql, &param_refs(params)).await?;
                Ok(rows)
            })
        })
        .await?
        .iter()
        .map(record_from_row)
        .collect()
    }

    async fn query_one(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<Option<Record>> {
        let rows = self.query(sql, params, options).await?;
        Ok(rows.into_iter().next())
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<u64> {
        let operation = op_label(sql);
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.statement_timeout_ms);
        retry_transient(&operation, options.retries, || {
            self.run_statement(&operation, timeout_ms, |client| async move {
                client.execute(sql, &param_refs(params)).await
            })
        })
        .await
    }

    async fn begin_transaction(
        &self,
        options: TransactionOptions,
    ) -> ProviderResult<Box<dyn TransactionContext>> {
        let client = self.client().await?;
        let tx = PgTransaction::begin(client, options).await?;
        Ok(Box::new(tx))
    }

    async fn insert_row(&self, table: &str, row: Value) -> ProviderResult<Value> {
        let client = self.client().await?;
        rows::insert_row(&client, table, row).await
    }

    async fn fetch_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        let client = self.client().await?;
        rows::fetch_row(&client, table, client_id, id).await
    }

    async fn list_rows(&self, table: &str, client_id: &str) -> ProviderResult<Vec<Value>> {
        let client = self.client().await?;
        rows::list_rows(&client, table, client_id).await
    }

    async fn update_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
        patch: Value,
    ) -> ProviderResult<Value> {
        let client = self.client().await?;
        rows::update_row(&client, table, client_id, id, &patch).await
    }

    async fn delete_row(&self, table: &str, client_id: &str, id: &str) -> ProviderResult<()> {
        let client = self.client().await?;
        rows::delete_row(&client, table, client_id, id).await
    }

    async fn create_table(&self, table: &TableDef) -> ProviderResult<()> {
        let ddl = sql::table_ddl(table)?;
        let client = self.client().await?;
        client
            .batch_execute(&ddl)
            .await
            .map_err(|e| map_pg_error(&format!("create table {}", table.name), e))
    }

    async fn drop_table(&self, name: &str) -> ProviderResult<()> {
        sql::check_ident(name)?;
        let client = self.client().await?;
        client
            .batch_execute(&format!("DROP TABLE IF EXISTS {name} CASCADE"))
            .await
            .map_err(|e| map_pg_error(&format!("drop table {name}"), e))
    }

    async fn create_index(&self, index: &IndexDef) -> ProviderResult<()> {
        let ddl = sql::index_ddl(index)?;
        let client = self.client().await?;
        client
            .batch_execute(&ddl)
            .await
            .map_err(|e| map_pg_error(&format!("create index {}", index.name), e))
    }

    fn membership_store(&self) -> Arc<dyn MembershipStore> {
        Arc::new(PgMembershipStore::new(self.pool.clone()))
    }

    fn native_security(&self) -> Arc<dyn SecurityProvider> {
        Arc::new(StoreSecurityProvider::new(
            self.membership_store(),
            "postgres",
        ))
    }

    fn auth(&self) -> Option<Arc<dyn AuthProvider>> {
        None
    }

    fn object_storage(&self) -> Option<Arc<dyn StorageProvider>> {
        None
    }
}
