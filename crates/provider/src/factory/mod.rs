//! Provider construction and lifetime management.
//!
//! The factory turns a [`ProviderConfig`] into a connected provider,
//! failing fast on unsupported kinds or missing credentials. The
//! [`ProviderRegistry`] memoizes constructed providers so the application
//! shares one pool per provider kind, and owns teardown via `dispose()`.

mod hybrid;
mod registry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::core::{DatabaseProvider, SharedProvider, SharedSecurity};
use crate::error::{ConfigError, ProviderResult};
use crate::security::{SecurityConfig, SecurityEngine};

pub use hybrid::HybridSecurityProvider;
pub use registry::ProviderRegistry;

/// Builds and connects a database provider from configuration.
///
/// Declared-but-unimplemented kinds (`mysql`, `sqlite`) and kinds whose
/// feature is compiled out fail here with a configuration error, never
/// lazily on first use.
pub async fn create_database_provider(config: ProviderConfig) -> ProviderResult<SharedProvider> {
    match config {
        #[cfg(feature = "postgres")]
        ProviderConfig::Postgres(cfg) => {
            let provider = crate::backends::postgres::PostgresProvider::new(cfg).await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "postgres"))]
        ProviderConfig::Postgres(_) => Err(disabled("postgres")),

        #[cfg(feature = "supabase")]
        ProviderConfig::Supabase(cfg) => {
            let provider = crate::backends::supabase::SupabaseProvider::new(cfg)?;
            provider.connect().await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "supabase"))]
        ProviderConfig::Supabase(_) => Err(disabled("supabase")),

        #[cfg(feature = "memory")]
        ProviderConfig::Memory(cfg) => {
            let provider = crate::backends::memory::MemoryProvider::new(cfg);
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "memory"))]
        ProviderConfig::Memory(_) => Err(disabled("memory")),

        ProviderConfig::Mysql(_) => Err(ConfigError::UnsupportedProvider {
            kind: "mysql".to_string(),
        }
        .into()),
        ProviderConfig::Sqlite(_) => Err(ConfigError::UnsupportedProvider {
            kind: "sqlite".to_string(),
        }
        .into()),
    }
}

#[cfg(any(
    not(feature = "postgres"),
    not(feature = "supabase"),
    not(feature = "memory")
))]
fn disabled(kind: &str) -> crate::error::ProviderError {
    ConfigError::UnsupportedProvider {
        kind: format!("{kind} (feature disabled)"),
    }
    .into()
}

/// How tenant security is enforced for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Delegate entirely to the provider's native security; used when the
    /// backend enforces tenant isolation itself (row-level policies).
    Rls,
    /// Use the application security engine exclusively.
    Application,
    /// Compose both: every check must pass the application engine in
    /// addition to whatever the native backend does.
    Hybrid,
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::Rls => write!(f, "rls"),
            SecurityMode::Application => write!(f, "application"),
            SecurityMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A constructed security provider plus the engine handle when one exists.
///
/// The engine handle is how owners stop the cache sweeper and audit
/// flusher; `rls` mode has none.
pub struct SecurityStack {
    /// The security surface handed to application code.
    pub security: SharedSecurity,
    /// The engine, when `application` or `hybrid` mode constructed one.
    pub engine: Option<Arc<SecurityEngine>>,
}

/// Builds the security stack for a provider.
///
/// When an engine is constructed and a tokio runtime is available, its
/// cache sweeper is started; `dispose` on the owning registry (or
/// `engine.shutdown()`) stops it.
pub fn create_security_provider(
    mode: SecurityMode,
    provider: &SharedProvider,
    config: SecurityConfig,
) -> SecurityStack {
    match mode {
        SecurityMode::Rls => SecurityStack {
            security: provider.native_security(),
            engine: None,
        },
        SecurityMode::Application => {
            let engine = Arc::new(SecurityEngine::new(provider.membership_store(), config));
            if tokio::runtime::Handle::try_current().is_ok() {
                engine.start_sweeper();
            }
            SecurityStack {
                security: engine.clone(),
                engine: Some(engine),
            }
        }
        SecurityMode::Hybrid => {
            let engine = Arc::new(SecurityEngine::new(provider.membership_store(), config));
            if tokio::runtime::Handle::try_current().is_ok() {
                engine.start_sweeper();
            }
            let hybrid = HybridSecurityProvider::new(provider.native_security(), engine.clone());
            SecurityStack {
                security: Arc::new(hybrid),
                engine: Some(engine),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, MysqlConfig, SqliteConfig};
    #[cfg(feature = "memory")]
    use crate::core::DatabaseProvider;

    #[tokio::test]
    async fn test_unimplemented_kinds_fail_fast() {
        let err = create_database_provider(ProviderConfig::Mysql(MysqlConfig::default()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mysql"));

        let err = create_database_provider(ProviderConfig::Sqlite(SqliteConfig::default()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sqlite"));
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_memory_provider_constructs() {
        let provider = create_database_provider(ProviderConfig::Memory(MemoryConfig::default()))
            .await
            .unwrap();
        assert_eq!(provider.name(), "memory");
        assert!(provider.is_connected().await);
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_security_modes_construct() {
        let provider = create_database_provider(ProviderConfig::Memory(MemoryConfig::default()))
            .await
            .unwrap();

        let rls = create_security_provider(SecurityMode::Rls, &provider, SecurityConfig::default());
        assert!(rls.engine.is_none());

        let app = create_security_provider(
            SecurityMode::Application,
            &provider,
            SecurityConfig::default(),
        );
        assert!(app.engine.is_some());
        app.engine.unwrap().shutdown().await;

        let hybrid =
            create_security_provider(SecurityMode::Hybrid, &provider, SecurityConfig::default());
        assert!(hybrid.engine.is_some());
        hybrid.engine.unwrap().shutdown().await;
    }

    #[test]
    fn test_security_mode_serde() {
        let mode: SecurityMode = serde_json::from_str("\"hybrid\"").unwrap();
        assert_eq!(mode, SecurityMode::Hybrid);
        assert_eq!(SecurityMode::Rls.to_string(), "rls");
    }
}
