//! Application-level tenant isolation and role-based access control.
//!
//! The engine here is usable over any [`DatabaseProvider`] through the
//! [`MembershipStore`] seam, and can run standalone (`application` mode),
//! be skipped in favor of native backend policies (`rls` mode), or act as a
//! second opinion on top of them (`hybrid` mode, composed in
//! [`crate::factory`]).
//!
//! [`DatabaseProvider`]: crate::core::DatabaseProvider
//! [`MembershipStore`]: crate::core::MembershipStore

pub mod audit;
pub mod cache;
pub mod engine;
pub mod filter;
pub mod native;
pub mod roles;

pub use audit::{AuditEntry, AuditLog, AuditSink, RING_CAPACITY, RowAuditSink};
pub use cache::{CachedMembership, PermissionCache};
pub use engine::{OnError, SecurityConfig, SecurityEngine};
pub use filter::append_client_filter;
pub use native::StoreSecurityProvider;
pub use roles::{ActionTable, satisfies_requirement};
