//! Raw PostgreSQL backend.
//!
//! Full capability ceiling: parameterized raw SQL, explicit transactions
//! with configurable isolation, schema management, and a bounded
//! connection pool. Tenant security is implemented in application code by
//! direct queries against the membership table; there is no dependency on
//! backend row policies.

mod provider;
mod rows;
mod schema;
mod security;
mod sql;
mod transaction;

pub use provider::PostgresProvider;
pub use security::PgMembershipStore;
pub use transaction::PgTransaction;
