//! The database provider contract.
//!
//! [`DatabaseProvider`] is the vendor-neutral interface every backend must
//! satisfy. It carries no behavior of its own; any two implementations must
//! be drop-in substitutable for calling code that depends only on this
//! trait, a property certified by the conformance harness before a backend
//! is trusted with production traffic.
//!
//! Backends differ in capability ceilings (a hosted BaaS cannot run raw SQL
//! or explicit transactions), so the contract exposes
//! [`ProviderCapability`] flags: callers probe `supports()` instead of
//! catching `Unsupported` errors after the fact.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};

use super::auth::AuthProvider;
use super::security::{MembershipStore, SecurityProvider};
use super::storage::StorageProvider;
use super::transaction::{TransactionContext, TransactionOptions, TxHandle};

/// Identifies the kind of database provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Raw PostgreSQL over a connection pool.
    Postgres,
    /// Hosted Supabase-style BaaS (PostgREST rows, GoTrue auth, storage API).
    Supabase,
    /// In-process memory provider for development and conformance runs.
    Memory,
    /// Custom or external provider.
    Custom(&'static str),
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Postgres => write!(f, "postgres"),
            ProviderKind::Supabase => write!(f, "supabase"),
            ProviderKind::Memory => write!(f, "memory"),
            ProviderKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Capabilities a provider may support.
///
/// Used for runtime discovery and for conformance-suite gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCapability {
    /// Parameterized raw SQL via `query`/`query_one`/`execute`.
    RawSql,
    /// Explicit transactions with commit/rollback.
    Transactions,
    /// `create_table`/`drop_table`/`create_index`.
    SchemaManagement,
    /// Tenant-scoped row CRUD (`insert_row` and friends).
    RowCrud,
    /// Referential integrity enforced on writes.
    ReferentialIntegrity,
    /// Bounded connection pooling with stats.
    ConnectionPooling,
    /// Vendor-managed authentication.
    ManagedAuth,
    /// Vendor-managed object storage.
    ObjectStorage,
    /// Tenant isolation enforced natively by the backend (row-level policies).
    NativeRowSecurity,
}

impl std::fmt::Display for ProviderCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderCapability::RawSql => "raw-sql",
            ProviderCapability::Transactions => "transactions",
            ProviderCapability::SchemaManagement => "schema-management",
            ProviderCapability::RowCrud => "row-crud",
            ProviderCapability::ReferentialIntegrity => "referential-integrity",
            ProviderCapability::ConnectionPooling => "connection-pooling",
            ProviderCapability::ManagedAuth => "managed-auth",
            ProviderCapability::ObjectStorage => "object-storage",
            ProviderCapability::NativeRowSecurity => "native-row-security",
        };
        write!(f, "{}", name)
    }
}

/// A positional SQL parameter.
///
/// Parameters are always bound by the underlying driver; string
/// concatenation of caller values into SQL text is forbidden everywhere in
/// this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Text.
    Text(String),
    /// UUID.
    Uuid(Uuid),
    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
    /// JSON document.
    Json(Value),
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

/// A result row as a column-name → JSON value map.
pub type Record = serde_json::Map<String, Value>;

/// Per-call query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Timeout in milliseconds. `None` uses the provider's statement timeout.
    pub timeout_ms: Option<u64>,
    /// Number of retries for transient failures. Zero disables retry.
    pub retries: u32,
}

impl QueryOptions {
    /// Creates options with defaults (no per-call timeout, no retries).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-call timeout.
    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = Some(timeout);
        self
    }

    /// Sets the transient-failure retry count.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Result of a successful health check.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Provider name.
    pub provider: String,
    /// Provider kind.
    pub kind: ProviderKind,
    /// Round-trip latency of the probe.
    pub latency: Duration,
}

/// Connection-pool statistics for pooled providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum pool size.
    pub max_size: usize,
    /// Connections currently open.
    pub size: usize,
    /// Connections idle and ready.
    pub available: usize,
    /// Callers waiting for a connection.
    pub waiting: usize,
}

/// Column types understood by schema management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Unbounded text.
    Text,
    /// 64-bit integer.
    BigInt,
    /// Double-precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone.
    TimestampTz,
    /// UUID.
    Uuid,
    /// JSON document (JSONB where available).
    Json,
}

/// A column in a [`TableDef`].
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Optional foreign-key reference as `(table, column)`.
    pub references: Option<(String, String)>,
}

impl ColumnDef {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            references: None,
        }
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as the primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Adds a foreign-key reference.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some((table.into(), column.into()));
        self
    }
}

/// A table definition for schema management.
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Creates an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

/// An index definition for schema management.
#[derive(Debug, Clone)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Table the index covers.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// The vendor-neutral database contract.
///
/// # Contractual error behavior
///
/// * `query`/`query_one`/`execute` reject with a [`TransientError::Timeout`]
///   on timeout regardless of backend, so retry logic can distinguish it.
/// * Operations outside a backend's capability ceiling reject with an
///   `Unsupported` error naming the provider and operation, never a silent
///   no-op.
/// * Constraint violations surface as `Integrity` errors on every backend.
///
/// # Tenant scoping
///
/// The row surface (`insert_row`, `fetch_row`, `list_rows`, `update_row`,
/// `delete_row`) is client-scoped by construction: reads require the
/// caller's client id and writes require a `client_id` field on the row
/// (global tables such as `users` are the only exemption). No row call can
/// return rows belonging to another client.
///
/// [`TransientError::Timeout`]: crate::error::TransientError::Timeout
#[async_trait]
pub trait DatabaseProvider: Send + Sync + Debug {
    /// Returns the provider kind.
    fn kind(&self) -> ProviderKind;

    /// Returns a human-readable provider name.
    fn name(&self) -> &'static str;

    /// Checks whether this provider supports the given capability.
    fn supports(&self, capability: ProviderCapability) -> bool;

    /// Returns all capabilities this provider supports.
    fn capabilities(&self) -> Vec<ProviderCapability>;

    /// Verifies connectivity and marks the provider connected.
    async fn connect(&self) -> ProviderResult<()>;

    /// Releases backend resources and marks the provider disconnected.
    async fn disconnect(&self) -> ProviderResult<()>;

    /// Returns whether the provider currently considers itself connected.
    async fn is_connected(&self) -> bool;

    /// Probes the backend and reports round-trip latency.
    async fn health_check(&self) -> ProviderResult<HealthReport>;

    /// Runs one-time backend initialization (schema creation where the
    /// provider manages its own schema; a no-op otherwise).
    async fn initialize(&self) -> ProviderResult<()>;

    /// Executes parameterized SQL and returns all rows.
    ///
    /// # Errors
    ///
    /// * `Unsupported` if the backend cannot run raw SQL
    /// * `Transient(Timeout)` when `options.timeout_ms` elapses
    /// * `Integrity` on constraint violations
    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<Vec<Record>>;

    /// Executes parameterized SQL and returns the first row, if any.
    async fn query_one(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<Option<Record>>;

    /// Executes parameterized SQL and returns the affected-row count.
    async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        options: QueryOptions,
    ) -> ProviderResult<u64>;

    /// Begins an explicit transaction.
    ///
    /// The returned context is bound to a single connection for its entire
    /// lifetime and must be committed or rolled back before being dropped.
    /// Prefer [`DatabaseProviderExt::transaction`] which guarantees both.
    async fn begin_transaction(
        &self,
        options: TransactionOptions,
    ) -> ProviderResult<Box<dyn TransactionContext>>;

    /// Inserts a row. The row must carry a `client_id` field unless the
    /// table is a global table.
    async fn insert_row(&self, table: &str, row: Value) -> ProviderResult<Value>;

    /// Fetches one row by client and id.
    async fn fetch_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>>;

    /// Lists all rows belonging to the given client.
    async fn list_rows(&self, table: &str, client_id: &str) -> ProviderResult<Vec<Value>>;

    /// Merges `patch` into an existing row and returns the updated row.
    async fn update_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
        patch: Value,
    ) -> ProviderResult<Value>;

    /// Deletes one row by client and id.
    async fn delete_row(&self, table: &str, client_id: &str, id: &str) -> ProviderResult<()>;

    /// Creates a table from a definition.
    async fn create_table(&self, table: &TableDef) -> ProviderResult<()>;

    /// Drops a table if it exists.
    async fn drop_table(&self, name: &str) -> ProviderResult<()>;

    /// Creates an index from a definition.
    async fn create_index(&self, index: &IndexDef) -> ProviderResult<()>;

    /// Returns this provider's tenant-membership store, the backing store
    /// used by the application security engine.
    fn membership_store(&self) -> Arc<dyn MembershipStore>;

    /// Returns this provider's native security implementation.
    fn native_security(&self) -> Arc<dyn SecurityProvider>;

    /// Returns the auth provider, when the backend manages authentication.
    fn auth(&self) -> Option<Arc<dyn AuthProvider>>;

    /// Returns the object-storage provider, when the backend manages one.
    fn object_storage(&self) -> Option<Arc<dyn StorageProvider>>;
}

/// Callback-style transaction combinator.
///
/// Commits when the callback returns `Ok`, rolls back and rethrows when it
/// returns `Err`. The connection is released in every path; the caller
/// never observes a half-committed state.
///
/// # Example
///
/// ```ignore
/// let delivery_id = provider
///     .transaction(TransactionOptions::default(), |tx| {
///         Box::pin(async move {
///             tx.insert_row("deliveries", delivery).await?;
///             tx.insert_row("delivery_lines", lines).await?;
///             Ok(id)
///         })
///     })
///     .await?;
/// ```
#[async_trait]
pub trait DatabaseProviderExt: DatabaseProvider {
    /// Runs `f` inside a transaction with commit/rollback handling.
    async fn transaction<R, F>(&self, options: TransactionOptions, f: F) -> ProviderResult<R>
    where
        R: Send + 'static,
        F: for<'t> FnOnce(&'t mut TxHandle) -> BoxFuture<'t, ProviderResult<R>> + Send,
    {
        let tx = self.begin_transaction(options).await?;
        let mut handle = TxHandle::new(tx);
        match f(&mut handle).await {
            Ok(value) => {
                handle.into_inner().commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.into_inner().rollback().await {
                    tracing::warn!(
                        error = %rollback_err,
                        "rollback failed after transaction callback error"
                    );
                }
                Err(err)
            }
        }
    }
}

impl<P: DatabaseProvider + ?Sized> DatabaseProviderExt for P {}

/// Shorthand for a shared provider handle.
pub type SharedProvider = Arc<dyn DatabaseProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::Postgres.to_string(), "postgres");
        assert_eq!(ProviderKind::Supabase.to_string(), "supabase");
        assert_eq!(ProviderKind::Custom("mysql").to_string(), "mysql");
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(ProviderCapability::RawSql.to_string(), "raw-sql");
        assert_eq!(
            ProviderCapability::NativeRowSecurity.to_string(),
            "native-row-security"
        );
    }

    #[test]
    fn test_query_options_builder() {
        let opts = QueryOptions::new().timeout_ms(2500).retries(2);
        assert_eq!(opts.timeout_ms, Some(2500));
        assert_eq!(opts.retries, 2);
    }

    #[test]
    fn test_sql_param_from() {
        assert_eq!(SqlParam::from("abc"), SqlParam::Text("abc".to_string()));
        assert_eq!(SqlParam::from(7i64), SqlParam::Int(7));
        assert_eq!(SqlParam::from(true), SqlParam::Bool(true));
    }

    #[test]
    fn test_table_def_builder() {
        let table = TableDef::new("deliveries")
            .column(ColumnDef::new("id", ColumnType::Text).primary_key())
            .column(
                ColumnDef::new("client_id", ColumnType::Text)
                    .not_null()
                    .references("clients", "id"),
            )
            .column(ColumnDef::new("data", ColumnType::Json));

        assert_eq!(table.name, "deliveries");
        assert_eq!(table.columns.len(), 3);
        assert!(table.columns[0].primary_key);
        assert!(!table.columns[0].nullable);
        assert_eq!(
            table.columns[1].references,
            Some(("clients".to_string(), "id".to_string()))
        );
    }
}
