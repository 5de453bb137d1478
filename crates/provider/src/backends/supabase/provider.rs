//! Supabase provider implementation.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::retry_transient;
use crate::config::SupabaseConfig;
use crate::core::repository::{is_global_table, require_client_scope, row_id};
use crate::core::{
    AuthProvider, DatabaseProvider, HealthReport, IndexDef, Membership, MembershipStore,
    ProviderCapability, ProviderKind, QueryOptions, Record, SecurityProvider, SqlParam,
    StorageProvider, TableDef, TransactionContext, TransactionOptions,
};
use crate::error::{
    BackendError, ConnectionError, ProviderError, ProviderResult, UnsupportedError,
};
use crate::security::StoreSecurityProvider;

use super::auth::SupabaseAuth;
use super::rest::SupabaseRest;
use super::storage::SupabaseStorage;

/// Hosted BaaS provider over the vendor REST surface.
///
/// Raw SQL, explicit transactions, and schema management are outside this
/// backend's ceiling: the vendor does not expose them to this client type,
/// so those calls reject with an `Unsupported` error rather than silently
/// doing nothing. Callers that need them use the raw-SQL provider (or
/// vendor-specific RPC) and can detect the gap up front through
/// [`ProviderCapability`] flags.
///
/// Tenant isolation is expected to be enforced by the backend's own row
/// policies; the application security engine remains available as a
/// redundant check (see `hybrid` mode in [`crate::factory`]).
pub struct SupabaseProvider {
    rest: Arc<SupabaseRest>,
    config: SupabaseConfig,
    connected: AtomicBool,
}

impl Debug for SupabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseProvider")
            .field("url", &self.config.url)
            .field("schema", &self.config.schema)
            .finish_non_exhaustive()
    }
}

impl SupabaseProvider {
    /// Creates a provider. Credentials are validated here; connectivity is
    /// probed by [`connect`](DatabaseProvider::connect).
    pub fn new(config: SupabaseConfig) -> ProviderResult<Self> {
        let rest = Arc::new(SupabaseRest::new(&config)?);
        Ok(Self {
            rest,
            config,
            connected: AtomicBool::new(true),
        })
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Connection(ConnectionError::NotConnected {
                provider: "supabase".to_string(),
            }))
        }
    }

    fn unsupported(&self, operation: &str) -> ProviderError {
        UnsupportedError::operation("supabase", operation)
    }

    fn scope_filters(table: &str, client_id: &str, id: &str) -> Vec<(&'static str, String)> {
        let mut filters = vec![("id", format!("eq.{id}"))];
        if !is_global_table(table) {
            filters.push(("client_id", format!("eq.{client_id}")));
        }
        filters
    }
}

#[async_trait]
impl DatabaseProvider for SupabaseProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Supabase
    }

    fn name(&self) -> &'static str {
        "supabase"
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![
            ProviderCapability::RowCrud,
            ProviderCapability::ReferentialIntegrity,
            ProviderCapability::ManagedAuth,
            ProviderCapability::ObjectStorage,
            ProviderCapability::NativeRowSecurity,
        ]
    }

    async fn connect(&self) -> ProviderResult<()> {
        self.rest.ping().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn health_check(&self) -> ProviderResult<HealthReport> {
        self.ensure_connected()?;
        let start = Instant::now();
        self.rest.ping().await?;
        Ok(HealthReport {
            provider: "supabase".to_string(),
            kind: ProviderKind::Supabase,
            latency: start.elapsed(),
        })
    }

    async fn initialize(&self) -> ProviderResult<()> {
        // Schema lives with the vendor project; verify reachability only.
        self.rest.ping().await
    }

    async fn query(
        &self,
        _sql: &str,
        _params: &[SqlParam],
        _options: QueryOptions,
    ) -> ProviderResult<Vec<Record>> {
        Err(self.unsupported("query"))
    }

    async fn query_one(
        &self,
        _sql: &str,
        _params: &[SqlParam],
        _options: QueryOptions,
    ) -> ProviderResult<Option<Record>> {
        Err(self.unsupported("query_one"))
    }

    async fn execute(
        &self,
        _sql: &str,
        _params: &[SqlParam],
        _options: QueryOptions,
    ) -> ProviderResult<u64> {
        Err(self.unsupported("execute"))
    }

    async fn begin_transaction(
        &self,
        _options: TransactionOptions,
    ) -> ProviderResult<Box<dyn TransactionContext>> {
        Err(self.unsupported("begin_transaction"))
    }

    async fn insert_row(&self, table: &str, row: Value) -> ProviderResult<Value> {
        self.ensure_connected()?;
        require_client_scope(table, &row)?;

        let mut row = row;
        let id = row_id(&row);
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id));
        }

        let rest = Arc::clone(&self.rest);
        retry_transient(
            &format!("insert {table}"),
            self.config.options.retries,
            || rest.insert(table, &row),
        )
        .await
    }

    async fn fetch_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        self.ensure_connected()?;
        let filters = Self::scope_filters(table, client_id, id);
        let rest = Arc::clone(&self.rest);
        let mut rows = retry_transient(
            &format!("fetch {table}"),
            self.config.options.retries,
            || rest.select(table, &filters),
        )
        .await?;
        Ok(rows.pop())
    }

    async fn list_rows(&self, table: &str, client_id: &str) -> ProviderResult<Vec<Value>> {
        self.ensure_connected()?;
        let filters: Vec<(&str, String)> = if is_global_table(table) {
            Vec::new()
        } else {
            vec![("client_id", format!("eq.{client_id}"))]
        };
        let rest = Arc::clone(&self.rest);
        retry_transient(
            &format!("list {table}"),
            self.config.options.retries,
            || rest.select(table, &filters),
        )
        .await
    }

    async fn update_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
        patch: Value,
    ) -> ProviderResult<Value> {
        self.ensure_connected()?;

        // Identity fields are never patched; the filters pin the row.
        let mut patch = patch;
        if let Some(obj) = patch.as_object_mut() {
            obj.remove("id");
            obj.remove("client_id");
        }

        let filters = Self::scope_filters(table, client_id, id);
        let mut rows = self.rest.update(table, &filters, &patch).await?;
        rows.pop().ok_or_else(|| {
            ProviderError::Backend(BackendError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
        })
    }

    async fn delete_row(&self, table: &str, client_id: &str, id: &str) -> ProviderResult<()> {
        self.ensure_connected()?;
        let filters = Self::scope_filters(table, client_id, id);
        self.rest.delete(table, &filters).await
    }

    async fn create_table(&self, table: &TableDef) -> ProviderResult<()> {
        Err(self.unsupported(format!("create_table {}", table.name).as_str()))
    }

    async fn drop_table(&self, name: &str) -> ProviderResult<()> {
        Err(self.unsupported(format!("drop_table {name}").as_str()))
    }

    async fn create_index(&self, index: &IndexDef) -> ProviderResult<()> {
        Err(self.unsupported(format!("create_index {}", index.name).as_str()))
    }

    fn membership_store(&self) -> Arc<dyn MembershipStore> {
        Arc::new(SupabaseMembershipStore {
            rest: Arc::clone(&self.rest),
        })
    }

    fn native_security(&self) -> Arc<dyn SecurityProvider> {
        Arc::new(StoreSecurityProvider::new(
            self.membership_store(),
            "supabase",
        ))
    }

    fn auth(&self) -> Option<Arc<dyn AuthProvider>> {
        Some(Arc::new(SupabaseAuth::new(Arc::clone(&self.rest))))
    }

    fn object_storage(&self) -> Option<Arc<dyn StorageProvider>> {
        Some(Arc::new(SupabaseStorage::new(Arc::clone(&self.rest))))
    }
}

/// Membership store over the vendor REST surface.
pub struct SupabaseMembershipStore {
    rest: Arc<SupabaseRest>,
}

#[async_trait]
impl MembershipStore for SupabaseMembershipStore {
    async fn memberships_for_user(&self, user_id: &str) -> ProviderResult<Vec<Membership>> {
        let rows = self
            .rest
            .select("client_users", &[("user_id", format!("eq.{user_id}"))])
            .await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<Membership>(row).map_err(|e| {
                    ProviderError::Backend(BackendError::Serialization {
                        message: format!("client_users row: {e}"),
                    })
                })
            })
            .collect()
    }

    async fn membership(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Membership>> {
        let all = self.memberships_for_user(user_id).await?;
        Ok(all.into_iter().find(|m| m.client_id == client_id))
    }
}
