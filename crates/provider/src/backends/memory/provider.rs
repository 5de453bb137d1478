//! Memory provider implementation.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::MemoryConfig;
use crate::core::repository::{is_global_table, merge_row_patch, require_client_scope, row_id};
use crate::core::{
    AuthProvider, DatabaseProvider, HealthReport, IndexDef, Membership, MembershipStore,
    ProviderCapability, ProviderKind, QueryOptions, Record, Role, SecurityProvider, SqlParam,
    StorageProvider, TableDef, TransactionContext, TransactionOptions,
};
use crate::error::{
    BackendError, ConnectionError, IntegrityError, ProviderError, ProviderResult, TransientError,
    UnsupportedError,
};
use crate::security::StoreSecurityProvider;

use super::transaction::MemoryTransaction;

/// Shared table state: table name → (row id → row).
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    pub(crate) tables: HashMap<String, BTreeMap<String, Value>>,
}

impl MemoryState {
    /// Inserts a row, enforcing id uniqueness, tenant scoping, and the
    /// referential rules the SQL schema declares: tenant-scoped rows must
    /// reference an existing client, and `client_users` rows an existing
    /// user.
    pub(crate) fn insert_row(&mut self, table: &str, mut row: Value) -> ProviderResult<Value> {
        let client_id = require_client_scope(table, &row)?;

        if let Some(client_id) = &client_id {
            if !self.row_exists("clients", client_id) {
                return Err(ProviderError::Integrity(IntegrityError::ForeignKey {
                    table: table.to_string(),
                    message: format!("client_id '{client_id}' does not reference a client"),
                }));
            }
        }

        if table == "client_users" {
            let user_id = row
                .get("user_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if !self.row_exists("users", &user_id) {
                return Err(ProviderError::Integrity(IntegrityError::ForeignKey {
                    table: table.to_string(),
                    message: format!("user_id '{user_id}' does not reference a user"),
                }));
            }
        }

        let id = row_id(&row);
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }

        let rows = self.tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(ProviderError::Integrity(IntegrityError::Unique {
                table: table.to_string(),
                message: format!("duplicate id '{id}'"),
            }));
        }
        rows.insert(id, row.clone());
        Ok(row)
    }

    pub(crate) fn fetch_row(&self, table: &str, client_id: &str, id: &str) -> Option<Value> {
        let row = self.tables.get(table)?.get(id)?;
        if Self::row_visible(table, row, client_id) {
            Some(row.clone())
        } else {
            None
        }
    }

    pub(crate) fn list_rows(&self, table: &str, client_id: &str) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| Self::row_visible(table, row, client_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn update_row(
        &mut self,
        table: &str,
        client_id: &str,
        id: &str,
        patch: &Value,
    ) -> ProviderResult<Value> {
        let current = self.fetch_row(table, client_id, id).ok_or_else(|| {
            ProviderError::Backend(BackendError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
        })?;
        let merged = merge_row_patch(&current, patch);
        if let Some(rows) = self.tables.get_mut(table) {
            rows.insert(id.to_string(), merged.clone());
        }
        Ok(merged)
    }

    /// Deleting a missing row is a no-op, matching SQL DELETE semantics.
    pub(crate) fn delete_row(&mut self, table: &str, client_id: &str, id: &str) {
        let visible = self
            .fetch_row(table, client_id, id)
            .is_some();
        if visible {
            if let Some(rows) = self.tables.get_mut(table) {
                rows.remove(id);
            }
        }
    }

    fn row_exists(&self, table: &str, id: &str) -> bool {
        self.tables
            .get(table)
            .map(|rows| rows.contains_key(id))
            .unwrap_or(false)
    }

    /// Global tables match by id alone; scoped tables also require the
    /// row's `client_id` to equal the caller's.
    fn row_visible(table: &str, row: &Value, client_id: &str) -> bool {
        if is_global_table(table) {
            return true;
        }
        row.get("client_id").and_then(|v| v.as_str()) == Some(client_id)
    }
}

/// In-process provider backed by [`MemoryState`].
pub struct MemoryProvider {
    label: String,
    state: Arc<RwLock<MemoryState>>,
    // Shared with the membership store so that disconnecting the provider
    // takes its security backing store down with it.
    connected: Arc<AtomicBool>,
    fail_next: AtomicU32,
}

impl Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("label", &self.label)
            .field("tables", &self.state.read().tables.len())
            .finish()
    }
}

impl MemoryProvider {
    /// Creates a provider, immediately ready for use.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            label: config.label.unwrap_or_else(|| "memory".to_string()),
            state: Arc::new(RwLock::new(MemoryState::default())),
            connected: Arc::new(AtomicBool::new(true)),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Scripts the next `n` row operations to fail with a transient error.
    /// A development and harness aid for exercising retry and recovery
    /// paths.
    pub fn inject_transient_failures(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn guard(&self, operation: &str) -> ProviderResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection(ConnectionError::NotConnected {
                provider: self.label.clone(),
            }));
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(ProviderError::Transient(TransientError::Network {
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            }));
        }
        Ok(())
    }

    fn unsupported(&self, operation: &str) -> ProviderError {
        UnsupportedError::operation("memory", operation)
    }
}

#[async_trait]
impl DatabaseProvider for MemoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![
            ProviderCapability::RowCrud,
            ProviderCapability::Transactions,
            ProviderCapability::ReferentialIntegrity,
        ]
    }

    async fn connect(&self) -> ProviderResult<()> {
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
        let start = Instant::now();
        self.guard("health_check")?;
        Ok(HealthReport {
            provider: self.label.clone(),
            kind: ProviderKind::Memory,
            latency: start.elapsed(),
        })
    }

    async fn initialize(&self) -> ProviderResult<()> {
        // Tables are implicit; nothing to create.
        Ok(())
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
        self.guard("begin_transaction")?;
        let working = self.state.read().clone();
        Ok(Box::new(MemoryTransaction::new(
            Arc::clone(&self.state),
            working,
        )))
    }

    async fn insert_row(&self, table: &str, row: Value) -> ProviderResult<Value> {
        self.guard("insert_row")?;
        self.state.write().insert_row(table, row)
    }

    async fn fetch_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
    ) -> ProviderResult<Option<Value>> {
        self.guard("fetch_row")?;
        Ok(self.state.read().fetch_row(table, client_id, id))
    }

    async fn list_rows(&self, table: &str, client_id: &str) -> ProviderResult<Vec<Value>> {
        self.guard("list_rows")?;
        Ok(self.state.read().list_rows(table, client_id))
    }

    async fn update_row(
        &self,
        table: &str,
        client_id: &str,
        id: &str,
        patch: Value,
    ) -> ProviderResult<Value> {
        self.guard("update_row")?;
        self.state.write().update_row(table, client_id, id, &patch)
    }

    async fn delete_row(&self, table: &str, client_id: &str, id: &str) -> ProviderResult<()> {
        self.guard("delete_row")?;
        self.state.write().delete_row(table, client_id, id);
        Ok(())
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
        Arc::new(MemoryMembershipStore {
            state: Arc::clone(&self.state),
            connected: Arc::clone(&self.connected),
        })
    }

    fn native_security(&self) -> Arc<dyn SecurityProvider> {
        Arc::new(StoreSecurityProvider::new(self.membership_store(), "memory"))
    }

    fn auth(&self) -> Option<Arc<dyn AuthProvider>> {
        None
    }

    fn object_storage(&self) -> Option<Arc<dyn StorageProvider>> {
        None
    }
}

/// Membership store reading `client_users` rows from the shared state.
pub struct MemoryMembershipStore {
    state: Arc<RwLock<MemoryState>>,
    connected: Arc<AtomicBool>,
}

impl MemoryMembershipStore {
    fn parse(row: &Value) -> ProviderResult<Membership> {
        let client_id = row
            .get("client_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let role = row
            .get("role")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .parse::<Role>()
            .map_err(|e| {
                ProviderError::Backend(BackendError::Serialization {
                    message: e.to_string(),
                })
            })?;
        let active = row.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
        Ok(Membership {
            client_id,
            role,
            active,
        })
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn memberships_for_user(&self, user_id: &str) -> ProviderResult<Vec<Membership>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection(ConnectionError::NotConnected {
                provider: "memory".to_string(),
            }));
        }
        let state = self.state.read();
        let Some(rows) = state.tables.get("client_users") else {
            return Ok(Vec::new());
        };
        rows.values()
            .filter(|row| row.get("user_id").and_then(|v| v.as_str()) == Some(user_id))
            .map(Self::parse)
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
