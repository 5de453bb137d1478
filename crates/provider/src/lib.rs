//! Backhouse provider layer.
//!
//! This crate is the persistence and tenant-security foundation of the
//! Backhouse restaurant back-office platform: a vendor-neutral contract
//! for database, auth, object-storage, and security operations, with
//! interchangeable backends behind it.
//!
//! # Architecture
//!
//! - [`core`] - the provider contracts; pure interface
//! - [`config`] - typed provider configuration and environment detection
//! - [`backends`] - PostgreSQL, Supabase, and memory implementations
//! - [`security`] - the application tenant-isolation and RBAC engine
//! - [`factory`] - provider construction, registry, hybrid security
//! - [`conformance`] - the cross-provider certification harness
//! - [`error`] - the error taxonomy shared by all of the above
//!
//! # Backend Features
//!
//! Backends are feature-gated; all are enabled by default:
//!
//! ```toml
//! [dependencies]
//! backhouse-provider = { version = "0.1", default-features = false, features = ["postgres"] }
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use backhouse_provider::config::ProviderConfig;
//! use backhouse_provider::core::{DatabaseProvider, SecurityProvider};
//! use backhouse_provider::factory::{ProviderRegistry, SecurityMode};
//! use backhouse_provider::security::SecurityConfig;
//!
//! # async fn start() -> Result<(), backhouse_provider::error::ProviderError> {
//! let registry = ProviderRegistry::new();
//! let provider = registry
//!     .database("primary", ProviderConfig::from_env()?)
//!     .await?;
//! provider.initialize().await?;
//!
//! let stack = registry
//!     .security(SecurityMode::Hybrid, &provider, SecurityConfig::default())
//!     .await;
//!
//! // Route handlers consume `stack.security` and `provider`.
//! let can_delete = stack
//!     .security
//!     .can_perform_action("user-1", "client-1", "delete_deliveries")
//!     .await?;
//! # let _ = can_delete;
//!
//! // Explicit teardown stops pools and background tasks.
//! registry.dispose().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Tenant isolation
//!
//! Every business row carries a `client_id`, and the row surface requires
//! one on every call; the security layer guarantees that no query returns
//! rows outside the requesting user's authorized client set, whichever
//! backend answers it. See [`security`] for the engine and
//! [`factory::SecurityMode`] for how it composes with native backend
//! policies.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod conformance;
pub mod core;
pub mod error;
pub mod factory;
pub mod security;

// Re-export the surface most callers need at the crate root.
pub use config::ProviderConfig;
pub use core::{
    DatabaseProvider, DatabaseProviderExt, Entity, ProviderCapability, ProviderKind, QueryOptions,
    Repository, Role, SecurityProvider, SharedProvider, SharedSecurity, SqlParam,
    TransactionOptions,
};
pub use error::{ProviderError, ProviderResult};
pub use factory::{ProviderRegistry, SecurityMode};
pub use security::{SecurityConfig, SecurityEngine};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
