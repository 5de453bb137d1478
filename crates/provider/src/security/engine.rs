//! Application-level tenant-isolation and RBAC engine.
//!
//! [`SecurityEngine`] enforces per-client authorization and role-based
//! permissions independently of which database provider answers queries.
//! It composes a [`MembershipStore`] (the backing-store seam each backend
//! implements), a permission cache with a background sweeper, an audit log,
//! and the static action-permission table.
//!
//! The engine holds a reference to the store; no database provider ever
//! references the engine back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::{Membership, MembershipStore, Role, SecurityProvider};
use crate::error::{ProviderError, ProviderResult};

use super::audit::{AuditEntry, AuditLog, AuditSink};
use super::cache::PermissionCache;
use super::filter::append_client_filter;
use super::roles::{ActionTable, satisfies_requirement};

/// What the engine does when the backing store fails mid-check.
///
/// This is an explicit configuration decision, and the chosen path is
/// audit-logged on every failure: silently mapping outages to "no access"
/// and silently propagating are both traps when implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Fail closed: report "no access" and audit the degradation.
    #[default]
    Deny,
    /// Strict mode: propagate the error to the caller.
    Propagate,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// How long a cached membership may be trusted.
    pub cache_timeout: Duration,
    /// Error policy for backing-store failures.
    pub on_error: OnError,
    /// When `false`, role checks use exact set-membership instead of the
    /// ordinal hierarchy.
    pub use_hierarchy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_secs(300),
            on_error: OnError::Deny,
            use_hierarchy: true,
        }
    }
}

/// The application security engine.
pub struct SecurityEngine {
    store: Arc<dyn MembershipStore>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditLog>,
    actions: ActionTable,
    config: SecurityConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SecurityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityEngine")
            .field("cache_len", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SecurityEngine {
    /// Creates an engine over a membership store with an in-memory audit log.
    pub fn new(store: Arc<dyn MembershipStore>, config: SecurityConfig) -> Self {
        Self {
            store,
            cache: Arc::new(PermissionCache::new()),
            audit: Arc::new(AuditLog::in_memory()),
            actions: ActionTable::standard(),
            config,
            sweeper: Mutex::new(None),
        }
    }

    /// Replaces the audit log with one that persists through `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Arc::new(AuditLog::with_sink(sink));
        self
    }

    /// Replaces the action table.
    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }

    /// Starts the background cache sweeper (period `cache_timeout / 2`).
    ///
    /// Idempotent; must be called from within a tokio runtime. The task is
    /// stopped by [`shutdown`](Self::shutdown).
    pub fn start_sweeper(&self) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let timeout = self.config.cache_timeout;
        let period = (timeout / 2).max(Duration::from_millis(10));
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = cache.sweep(timeout);
                if evicted > 0 {
                    tracing::debug!(evicted, "permission cache sweep");
                }
            }
        }));
    }

    /// Stops the sweeper and the audit flush task.
    pub async fn shutdown(&self) {
        let handle = { self.sweeper.lock().take() };
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.audit.shutdown().await;
    }

    /// Invalidates cached permissions.
    ///
    /// Role changes must take effect without waiting for natural expiry, so
    /// this is part of the public surface: both `None` clears everything,
    /// `user_id` alone clears one user, both clear one pair.
    pub fn clear_cache(&self, user_id: Option<&str>, client_id: Option<&str>) {
        self.cache.invalidate(user_id, client_id);
    }

    /// Read access to the audit trail.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Current cache entry count (fresh or stale).
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolves the membership for a pair, consulting the cache first.
    async fn resolve_membership(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Membership>> {
        if let Some(entry) = self
            .cache
            .get_fresh(user_id, client_id, self.config.cache_timeout)
        {
            return Ok(Some(Membership {
                client_id: entry.client_id,
                role: entry.role,
                active: entry.active,
            }));
        }

        let membership = self.store.membership(user_id, client_id).await?;
        if let Some(m) = &membership {
            self.cache.insert(user_id, client_id, m.role, m.active);
        }
        Ok(membership)
    }

    /// Applies the configured error policy to a backing-store failure.
    fn degrade(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        action: &str,
        err: ProviderError,
    ) -> ProviderResult<bool> {
        match self.config.on_error {
            OnError::Propagate => {
                self.audit.record(
                    AuditEntry::new(user_id, client_id, action, "tenant", false)
                        .with_details(format!("store error propagated (strict): {err}")),
                );
                Err(err)
            }
            OnError::Deny => {
                tracing::warn!(error = %err, user_id, "membership store failed, failing closed");
                self.audit.record(
                    AuditEntry::new(user_id, client_id, action, "tenant", false)
                        .with_details(format!("store error, failed closed: {err}")),
                );
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl SecurityProvider for SecurityEngine {
    async fn enforce_client_access(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<bool> {
        let membership = match self.resolve_membership(user_id, client_id).await {
            Ok(m) => m,
            Err(err) => return self.degrade(user_id, Some(client_id), "client_access", err),
        };

        let granted = membership.map(|m| m.active).unwrap_or(false);
        let mut entry = AuditEntry::new(user_id, Some(client_id), "client_access", "tenant", granted);
        if !granted {
            entry = entry.with_details("no active membership");
        }
        self.audit.record(entry);
        Ok(granted)
    }

    async fn get_user_client_ids(&self, user_id: &str) -> Vec<String> {
        match self.store.memberships_for_user(user_id).await {
            Ok(memberships) => memberships
                .into_iter()
                .filter(|m| m.active)
                .map(|m| m.client_id)
                .collect(),
            Err(err) => {
                // Never throws: an empty list is returned, but the failure
                // is audited so outages are not mistaken for "no access".
                tracing::warn!(error = %err, user_id, "membership listing failed");
                self.audit.record(
                    AuditEntry::new(user_id, None, "list_clients", "tenant", false)
                        .with_details(format!("store error, returned empty list: {err}")),
                );
                Vec::new()
            }
        }
    }

    async fn get_user_role_in_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Role>> {
        let membership = self.resolve_membership(user_id, client_id).await?;
        Ok(membership.filter(|m| m.active).map(|m| m.role))
    }

    async fn add_client_filter(&self, query: &str, user_id: &str) -> String {
        let client_ids = self.get_user_client_ids(user_id).await;
        append_client_filter(query, &client_ids)
    }

    fn has_required_role(&self, user_role: Role, required: &[Role]) -> bool {
        satisfies_requirement(user_role, required, self.config.use_hierarchy)
    }

    async fn can_perform_action(
        &self,
        user_id: &str,
        client_id: &str,
        action: &str,
    ) -> ProviderResult<bool> {
        let Some(minimum) = self.actions.minimum_role(action) else {
            tracing::warn!(action, user_id, "unknown action denied by default");
            self.audit.record(
                AuditEntry::new(user_id, Some(client_id), action, "rbac", false)
                    .with_details("unknown action"),
            );
            return Ok(false);
        };

        if !self.enforce_client_access(user_id, client_id).await? {
            self.audit.record(
                AuditEntry::new(user_id, Some(client_id), action, "rbac", false)
                    .with_details("client access denied"),
            );
            return Ok(false);
        }

        let role = match self.get_user_role_in_client(user_id, client_id).await {
            Ok(role) => role,
            Err(err) => return self.degrade(user_id, Some(client_id), action, err),
        };

        let granted = role
            .map(|r| self.has_required_role(r, &[minimum]))
            .unwrap_or(false);

        let mut entry = AuditEntry::new(user_id, Some(client_id), action, "rbac", granted);
        if !granted {
            entry = entry.with_details(format!("requires {minimum} or above"));
        }
        self.audit.record(entry);
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// In-memory store with a switchable failure mode.
    struct TestStore {
        memberships: RwLock<HashMap<String, Vec<Membership>>>,
        failing: RwLock<bool>,
    }

    impl TestStore {
        fn new() -> Self {
            Self {
                memberships: RwLock::new(HashMap::new()),
                failing: RwLock::new(false),
            }
        }

        fn grant(&self, user_id: &str, client_id: &str, role: Role) {
            self.memberships
                .write()
                .entry(user_id.to_string())
                .or_default()
                .push(Membership {
                    client_id: client_id.to_string(),
                    role,
                    active: true,
                });
        }

        fn set_role(&self, user_id: &str, client_id: &str, role: Role) {
            if let Some(list) = self.memberships.write().get_mut(user_id) {
                for m in list.iter_mut().filter(|m| m.client_id == client_id) {
                    m.role = role;
                }
            }
        }

        fn fail(&self, failing: bool) {
            *self.failing.write() = failing;
        }
    }

    #[async_trait]
    impl MembershipStore for TestStore {
        async fn memberships_for_user(&self, user_id: &str) -> ProviderResult<Vec<Membership>> {
            if *self.failing.read() {
                return Err(ProviderError::Backend(
                    crate::error::BackendError::Internal {
                        provider: "test".to_string(),
                        message: "store offline".to_string(),
                        source: None,
                    },
                ));
            }
            Ok(self
                .memberships
                .read()
                .get(user_id)
                .cloned()
                .unwrap_or_default())
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

    fn engine_with(store: Arc<TestStore>, config: SecurityConfig) -> SecurityEngine {
        SecurityEngine::new(store, config)
    }

    #[tokio::test]
    async fn test_enforce_grants_active_member() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store, SecurityConfig::default());

        assert!(engine.enforce_client_access("u1", "c1").await.unwrap());
        assert!(!engine.enforce_client_access("u1", "c2").await.unwrap());
        assert!(!engine.enforce_client_access("u2", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_enforce_populates_cache() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Manager);
        let engine = engine_with(store.clone(), SecurityConfig::default());

        assert_eq!(engine.cache_len(), 0);
        engine.enforce_client_access("u1", "c1").await.unwrap();
        assert_eq!(engine.cache_len(), 1);

        // A store outage no longer affects the cached pair.
        store.fail(true);
        assert!(engine.enforce_client_access("u1", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_revalidation() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store.clone(), SecurityConfig::default());

        engine.enforce_client_access("u1", "c1").await.unwrap();
        store.fail(true);

        // Cached: still granted. Cleared: must re-query, and the store is
        // down, so the default policy fails closed.
        assert!(engine.enforce_client_access("u1", "c1").await.unwrap());
        engine.clear_cache(Some("u1"), Some("c1"));
        assert!(!engine.enforce_client_access("u1", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_strict_mode_propagates() {
        let store = Arc::new(TestStore::new());
        store.fail(true);
        let engine = engine_with(
            store,
            SecurityConfig {
                on_error: OnError::Propagate,
                ..Default::default()
            },
        );

        let result = engine.enforce_client_access("u1", "c1").await;
        assert!(result.is_err());

        // The propagation path is audited.
        let recent = engine.audit().recent(1);
        assert!(recent[0].details.as_deref().unwrap().contains("strict"));
    }

    #[tokio::test]
    async fn test_fail_closed_is_audited() {
        let store = Arc::new(TestStore::new());
        store.fail(true);
        let engine = engine_with(store, SecurityConfig::default());

        assert!(!engine.enforce_client_access("u1", "c1").await.unwrap());
        let recent = engine.audit().recent(1);
        assert!(!recent[0].success);
        assert!(recent[0].details.as_deref().unwrap().contains("failed closed"));
    }

    #[tokio::test]
    async fn test_get_user_client_ids_empty_on_error() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store.clone(), SecurityConfig::default());

        assert_eq!(engine.get_user_client_ids("u1").await, vec!["c1"]);

        store.fail(true);
        assert!(engine.get_user_client_ids("u1").await.is_empty());
        // The failure is audited, not thrown.
        let recent = engine.audit().recent(1);
        assert_eq!(recent[0].action, "list_clients");
    }

    #[tokio::test]
    async fn test_add_client_filter_fails_closed() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store, SecurityConfig::default());

        let filtered = engine
            .add_client_filter("SELECT * FROM deliveries", "u1")
            .await;
        assert_eq!(
            filtered,
            "SELECT * FROM deliveries WHERE client_id IN ('c1')"
        );

        let unfiltered = engine
            .add_client_filter("SELECT * FROM deliveries", "nobody")
            .await;
        assert_eq!(unfiltered, "SELECT * FROM deliveries WHERE 1 = 0");
    }

    #[tokio::test]
    async fn test_can_perform_action_role_boundaries() {
        let store = Arc::new(TestStore::new());
        store.grant("staff", "c1", Role::Staff);
        store.grant("manager", "c1", Role::Manager);
        let engine = engine_with(store, SecurityConfig::default());

        assert!(
            engine
                .can_perform_action("staff", "c1", "view_deliveries")
                .await
                .unwrap()
        );
        assert!(
            !engine
                .can_perform_action("staff", "c1", "delete_deliveries")
                .await
                .unwrap()
        );
        assert!(
            engine
                .can_perform_action("manager", "c1", "delete_deliveries")
                .await
                .unwrap()
        );
        assert!(
            !engine
                .can_perform_action("manager", "c1", "manage_billing")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_action_denied_and_audited() {
        let store = Arc::new(TestStore::new());
        store.grant("owner", "c1", Role::Owner);
        let engine = engine_with(store, SecurityConfig::default());

        assert!(
            !engine
                .can_perform_action("owner", "c1", "launch_rocket")
                .await
                .unwrap()
        );
        let recent = engine.audit().recent(1);
        assert_eq!(recent[0].details.as_deref(), Some("unknown action"));
    }

    #[tokio::test]
    async fn test_promotion_takes_effect_after_cache_clear() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store.clone(), SecurityConfig::default());

        assert!(
            !engine
                .can_perform_action("u1", "c1", "delete_deliveries")
                .await
                .unwrap()
        );

        store.set_role("u1", "c1", Role::Manager);
        engine.clear_cache(Some("u1"), Some("c1"));

        assert!(
            engine
                .can_perform_action("u1", "c1", "delete_deliveries")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_exact_membership_mode() {
        let store = Arc::new(TestStore::new());
        let engine = engine_with(
            store,
            SecurityConfig {
                use_hierarchy: false,
                ..Default::default()
            },
        );

        assert!(engine.has_required_role(Role::Manager, &[Role::Manager]));
        assert!(!engine.has_required_role(Role::Owner, &[Role::Manager]));
    }

    #[tokio::test]
    async fn test_sweeper_evicts_stale_entries() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(
            store,
            SecurityConfig {
                cache_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        engine.enforce_client_access("u1", "c1").await.unwrap();
        assert_eq!(engine.cache_len(), 1);

        engine.start_sweeper();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(engine.cache_len(), 0);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_validate_client_access_errors_on_denial() {
        let store = Arc::new(TestStore::new());
        store.grant("u1", "c1", Role::Staff);
        let engine = engine_with(store, SecurityConfig::default());

        assert!(engine.validate_client_access("u1", "c1").await.is_ok());
        let err = engine.validate_client_access("u1", "c2").await.unwrap_err();
        assert!(err.is_access_denied());
    }
}
