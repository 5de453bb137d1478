//! Hosted Supabase-style backend.
//!
//! Wraps the vendor's REST surface: PostgREST for rows, GoTrue for auth,
//! and the storage API for objects. Raw SQL, explicit transactions, and
//! schema management are rejected with `Unsupported` errors because the
//! vendor does not expose them to this client type; the capability flags
//! on the provider document the gap to callers.

mod auth;
mod provider;
mod rest;
mod storage;

pub use auth::SupabaseAuth;
pub use provider::{SupabaseMembershipStore, SupabaseProvider};
pub use storage::SupabaseStorage;
