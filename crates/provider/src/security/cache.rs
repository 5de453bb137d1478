//! In-process permission cache.
//!
//! Entries are keyed by `(user_id, client_id)` and carry the instant they
//! were written. An entry older than the configured timeout is never
//! trusted; readers re-validate against the backing store instead. A small
//! TOCTOU window between check and use remains and is mitigated only by
//! short timeouts, not eliminated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::core::Role;

/// A cached membership decision.
#[derive(Debug, Clone)]
pub struct CachedMembership {
    /// The client the entry covers.
    pub client_id: String,
    /// The user's role at the time of caching.
    pub role: Role,
    /// Whether the membership was active.
    pub active: bool,
    /// When the entry was written.
    pub cached_at: Instant,
}

impl CachedMembership {
    /// Returns whether the entry is still trustworthy.
    pub fn is_fresh(&self, timeout: Duration) -> bool {
        self.cached_at.elapsed() < timeout
    }
}

/// Permission cache shared between the security engine and its sweeper.
///
/// The map is guarded by a `parking_lot::RwLock`; critical sections are
/// short and never await.
#[derive(Debug, Default)]
pub struct PermissionCache {
    entries: RwLock<HashMap<(String, String), CachedMembership>>,
}

impl PermissionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh entry for the pair, or `None` on miss or staleness.
    pub fn get_fresh(
        &self,
        user_id: &str,
        client_id: &str,
        timeout: Duration,
    ) -> Option<CachedMembership> {
        let entries = self.entries.read();
        entries
            .get(&(user_id.to_string(), client_id.to_string()))
            .filter(|entry| entry.is_fresh(timeout))
            .cloned()
    }

    /// Writes or replaces an entry.
    pub fn insert(&self, user_id: &str, client_id: &str, role: Role, active: bool) {
        let mut entries = self.entries.write();
        entries.insert(
            (user_id.to_string(), client_id.to_string()),
            CachedMembership {
                client_id: client_id.to_string(),
                role,
                active,
                cached_at: Instant::now(),
            },
        );
    }

    /// Invalidates entries.
    ///
    /// * both `None`: clears everything
    /// * `user_id` only: clears all of that user's entries
    /// * both set: clears the one pair
    pub fn invalidate(&self, user_id: Option<&str>, client_id: Option<&str>) {
        let mut entries = self.entries.write();
        match (user_id, client_id) {
            (None, None) => entries.clear(),
            (Some(user), None) => {
                entries.retain(|(u, _), _| u != user);
            }
            (Some(user), Some(client)) => {
                entries.remove(&(user.to_string(), client.to_string()));
            }
            (None, Some(client)) => {
                entries.retain(|(_, c), _| c != client);
            }
        }
    }

    /// Evicts stale entries and returns how many were removed.
    pub fn sweep(&self, timeout: Duration) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(timeout));
        before - entries.len()
    }

    /// Number of entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn test_miss_then_hit() {
        let cache = PermissionCache::new();
        assert!(cache.get_fresh("u1", "c1", LONG).is_none());

        cache.insert("u1", "c1", Role::Manager, true);
        let entry = cache.get_fresh("u1", "c1", LONG).unwrap();
        assert_eq!(entry.role, Role::Manager);
        assert!(entry.active);
    }

    #[test]
    fn test_stale_entry_not_returned() {
        let cache = PermissionCache::new();
        cache.insert("u1", "c1", Role::Staff, true);
        assert!(cache.get_fresh("u1", "c1", Duration::ZERO).is_none());
        // Still physically present until swept.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_pair() {
        let cache = PermissionCache::new();
        cache.insert("u1", "c1", Role::Staff, true);
        cache.insert("u1", "c2", Role::Staff, true);
        cache.invalidate(Some("u1"), Some("c1"));
        assert!(cache.get_fresh("u1", "c1", LONG).is_none());
        assert!(cache.get_fresh("u1", "c2", LONG).is_some());
    }

    #[test]
    fn test_invalidate_user() {
        let cache = PermissionCache::new();
        cache.insert("u1", "c1", Role::Staff, true);
        cache.insert("u1", "c2", Role::Staff, true);
        cache.insert("u2", "c1", Role::Owner, true);
        cache.invalidate(Some("u1"), None);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_fresh("u2", "c1", LONG).is_some());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = PermissionCache::new();
        cache.insert("u1", "c1", Role::Staff, true);
        cache.insert("u2", "c2", Role::Owner, true);
        cache.invalidate(None, None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_evicts_stale_only() {
        let cache = PermissionCache::new();
        cache.insert("u1", "c1", Role::Staff, true);
        let evicted = cache.sweep(Duration::ZERO);
        assert_eq!(evicted, 1);
        assert!(cache.is_empty());

        cache.insert("u1", "c1", Role::Staff, true);
        let evicted = cache.sweep(LONG);
        assert_eq!(evicted, 0);
        assert_eq!(cache.len(), 1);
    }
}
