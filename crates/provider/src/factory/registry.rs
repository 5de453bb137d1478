//! Provider registry with explicit lifetime management.
//!
//! The registry is an injected object handed through application start-up,
//! not module-level state: tests and embedders construct their own, and
//! teardown is an explicit `dispose()` rather than a process-exit
//! side effect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ProviderConfig;
use crate::core::{DatabaseProvider, SharedProvider};
use crate::error::ProviderResult;
use crate::security::{SecurityConfig, SecurityEngine};

use super::{SecurityMode, SecurityStack, create_database_provider, create_security_provider};

/// Lazy-singleton store for constructed providers.
#[derive(Default)]
pub struct ProviderRegistry {
    databases: Mutex<HashMap<String, SharedProvider>>,
    engines: Mutex<Vec<Arc<SecurityEngine>>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the provider registered under `key`, constructing and
    /// memoizing it on first use so the application shares one
    /// pool/connection per provider kind.
    pub async fn database(
        &self,
        key: &str,
        config: ProviderConfig,
    ) -> ProviderResult<SharedProvider> {
        let mut databases = self.databases.lock().await;
        if let Some(existing) = databases.get(key) {
            return Ok(Arc::clone(existing));
        }
        let provider = create_database_provider(config).await?;
        databases.insert(key.to_string(), Arc::clone(&provider));
        tracing::info!(key, provider = provider.name(), "provider registered");
        Ok(provider)
    }

    /// Builds a security stack for a provider and tracks its engine for
    /// disposal.
    pub async fn security(
        &self,
        mode: SecurityMode,
        provider: &SharedProvider,
        config: SecurityConfig,
    ) -> SecurityStack {
        let stack = create_security_provider(mode, provider, config);
        if let Some(engine) = &stack.engine {
            self.engines.lock().await.push(Arc::clone(engine));
        }
        stack
    }

    /// Drops all memoized instances without disconnecting them. Intended
    /// for test isolation where providers are cheap to rebuild.
    pub async fn clear(&self) {
        self.databases.lock().await.clear();
        self.engines.lock().await.clear();
    }

    /// Disconnects every provider and stops every engine's background
    /// tasks, then clears the registry.
    pub async fn dispose(&self) {
        let providers: Vec<SharedProvider> = {
            let mut databases = self.databases.lock().await;
            databases.drain().map(|(_, p)| p).collect()
        };
        for provider in providers {
            if let Err(err) = provider.disconnect().await {
                tracing::warn!(error = %err, provider = provider.name(), "disconnect failed");
            }
        }

        let engines: Vec<Arc<SecurityEngine>> = {
            let mut engines = self.engines.lock().await;
            engines.drain(..).collect()
        };
        for engine in engines {
            engine.shutdown().await;
        }
    }

    /// Number of registered database providers.
    pub async fn len(&self) -> usize {
        self.databases.lock().await.len()
    }

    /// Returns whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.databases.lock().await.is_empty()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::core::DatabaseProvider;

    fn memory_config() -> ProviderConfig {
        ProviderConfig::Memory(MemoryConfig::default())
    }

    #[tokio::test]
    async fn test_database_is_memoized() {
        let registry = ProviderRegistry::new();
        let first = registry.database("primary", memory_config()).await.unwrap();
        let second = registry.database("primary", memory_config()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_distinct_instances() {
        let registry = ProviderRegistry::new();
        let a = registry.database("primary", memory_config()).await.unwrap();
        let b = registry.database("replica", memory_config()).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_clear_resets_instances() {
        let registry = ProviderRegistry::new();
        let first = registry.database("primary", memory_config()).await.unwrap();
        registry.clear().await;
        assert!(registry.is_empty().await);
        let second = registry.database("primary", memory_config()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_dispose_disconnects_providers() {
        let registry = ProviderRegistry::new();
        let provider = registry.database("primary", memory_config()).await.unwrap();
        let stack = registry
            .security(SecurityMode::Application, &provider, SecurityConfig::default())
            .await;
        assert!(stack.engine.is_some());

        registry.dispose().await;
        assert!(registry.is_empty().await);
        assert!(!provider.is_connected().await);
    }
}
