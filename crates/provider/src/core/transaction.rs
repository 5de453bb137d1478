//! Transaction contracts.
//!
//! A [`TransactionContext`] is bound to exactly one backend connection for
//! its entire lifetime. It is created at transaction start, consumed by
//! `commit`/`rollback`, and never outlives the enclosing `transaction()`
//! call. Contexts are not shareable across concurrent operations.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderResult;

use super::database::{Record, SqlParam};

/// Transaction isolation levels.
///
/// The configured level governs cross-transaction visibility; the provider
/// layer adds no application-level locking on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Sees only committed data.
    #[default]
    ReadCommitted,
    /// Consistent reads within the transaction.
    RepeatableRead,
    /// Full isolation (may reduce concurrency).
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL spelling of the isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read-committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable-read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// Options for starting a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// The isolation level for the transaction.
    pub isolation_level: IsolationLevel,
    /// Statement timeout inside the transaction, in milliseconds.
    /// `None` inherits the provider default.
    pub timeout_ms: Option<u64>,
    /// Whether this is a read-only transaction.
    pub read_only: bool,
}

impl TransactionOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the isolation level.
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Sets the in-transaction statement timeout.
    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = Some(timeout);
        self
    }

    /// Marks this as a read-only transaction.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// An active transaction bound to a single connection.
///
/// All statements issued through the context run on that connection and are
/// only persisted by `commit`. A thrown error from any statement leaves the
/// transaction poisoned; callers roll back and rethrow, which the
/// convenience combinator [`DatabaseProviderExt::transaction`] does
/// automatically.
///
/// [`DatabaseProviderExt::transaction`]: super::database::DatabaseProviderExt::transaction
#[async_trait]
pub trait TransactionContext: Send {
    /// Executes parameterized SQL within the transaction, returning rows.
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<Vec<Record>>;

    /// Executes parameterized SQL within the transaction, returning the
    /// first row if any.
    async fn query_one(&mut self, sql: &str, params: &[SqlParam])
    -> ProviderResult<Option<Record>>;

    /// Executes parameterized SQL within the transaction, returning the
    /// affected-row count.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<u64>;

    /// Inserts a tenant-scoped row within the transaction.
    async fn insert_row(&mut self, table: &str, row: Value) -> ProviderResult<Value>;

    /// Fetches a row within the transaction (sees uncommitted writes).
    async fn fetch_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>>;

    /// Deletes a row within the transaction.
    async fn delete_row(&mut self, table: &str, client_id: &str, id: &str) -> ProviderResult<()>;

    /// Commits the transaction, persisting all changes. Consumes the context.
    async fn commit(self: Box<Self>) -> ProviderResult<()>;

    /// Rolls back the transaction, discarding all changes. Consumes the context.
    async fn rollback(self: Box<Self>) -> ProviderResult<()>;

    /// Returns whether this transaction is still active.
    fn is_active(&self) -> bool;
}

/// Borrowable wrapper handed to transaction callbacks.
///
/// Exposes the statement surface of [`TransactionContext`] but not
/// `commit`/`rollback`: finalization belongs to the combinator that created
/// the handle. To abort early, return an error from the callback.
pub struct TxHandle {
    inner: Box<dyn TransactionContext>,
}

impl TxHandle {
    /// Wraps a transaction context.
    pub fn new(inner: Box<dyn TransactionContext>) -> Self {
        Self { inner }
    }

    /// Unwraps the context for finalization.
    pub fn into_inner(self) -> Box<dyn TransactionContext> {
        self.inner
    }

    /// See [`TransactionContext::query`].
    pub async fn query(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<Vec<Record>> {
        self.inner.query(sql, params).await
    }

    /// See [`TransactionContext::query_one`].
    pub async fn query_one(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> ProviderResult<Option<Record>> {
        self.inner.query_one(sql, params).await
    }

    /// See [`TransactionContext::execute`].
    pub async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> ProviderResult<u64> {
        self.inner.execute(sql, params).await
    }

    /// See [`TransactionContext::insert_row`].
    pub async fn insert_row(&mut self, table: &str, row: Value) -> ProviderResult<Value> {
        self.inner.insert_row(table, row).await
    }

    /// See [`TransactionContext::fetch_row`].
    pub async fn fetch_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        self.inner.fetch_row(table, client_id, id).await
    }

    /// See [`TransactionContext::delete_row`].
    pub async fn delete_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<()> {
        self.inner.delete_row(table, client_id, id).await
    }

    /// Returns whether the underlying transaction is still active.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}
