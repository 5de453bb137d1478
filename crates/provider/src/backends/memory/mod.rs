//! In-process memory backend.
//!
//! Holds all rows in process memory with the same tenant-scoping and
//! referential-integrity rules the SQL backends enforce, so the
//! conformance harness and local development can run hermetically. Raw SQL
//! and schema management are outside its ceiling, mirroring the capability
//! gaps callers must already handle for hosted backends.

mod provider;
mod transaction;

pub use provider::{MemoryMembershipStore, MemoryProvider};
pub use transaction::MemoryTransaction;
