//! Access-decision audit log.
//!
//! Every access decision (grant and deny) is appended to a bounded
//! in-memory ring buffer holding the most recent entries, with best-effort
//! asynchronous persistence through an [`AuditSink`]. Persistence runs on a
//! decoupled task fed by a bounded channel: backpressure drops entries from
//! the channel (they remain in the ring) and a sink failure is logged but
//! never surfaced to the operation being observed.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::DatabaseProvider as _;
use crate::error::ProviderResult;

/// Number of entries retained in the in-memory ring.
pub const RING_CAPACITY: usize = 1000;

/// Depth of the persistence channel.
const FLUSH_QUEUE_DEPTH: usize = 256;

/// One audited access decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The user the decision was made for.
    pub user_id: String,
    /// The client in scope, when the decision was client-scoped.
    pub client_id: Option<String>,
    /// The checked action or operation name.
    pub action: String,
    /// The resource or subsystem the check guarded.
    pub resource: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Whether access was granted.
    pub success: bool,
    /// Free-form detail (denial reason, error-policy path taken).
    pub details: Option<String>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        client_id: Option<&str>,
        action: impl Into<String>,
        resource: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            client_id: client_id.map(|c| c.to_string()),
            action: action.into(),
            resource: resource.into(),
            timestamp: Utc::now(),
            success,
            details: None,
        }
    }

    /// Attaches detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Serializes the entry as a row for sinks that persist to a table.
    pub fn to_row(&self) -> Value {
        serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "user_id": self.user_id,
            "client_id": self.client_id,
            "action": self.action,
            "resource": self.resource,
            "success": self.success,
            "details": self.details,
            "created_at": self.timestamp.to_rfc3339(),
        })
    }
}

/// Durable destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one entry. Failures are logged by the flush task and never
    /// propagated to the audited operation.
    async fn persist(&self, entry: &AuditEntry) -> ProviderResult<()>;
}

/// Sink that persists entries to the `audit_log` table of a provider.
pub struct RowAuditSink {
    provider: crate::core::SharedProvider,
}

impl RowAuditSink {
    /// Creates a sink over the given provider.
    pub fn new(provider: crate::core::SharedProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AuditSink for RowAuditSink {
    async fn persist(&self, entry: &AuditEntry) -> ProviderResult<()> {
        self.provider
            .insert_row("audit_log", entry.to_row())
            .await
            .map(|_| ())
    }
}

/// Bounded audit log with optional asynchronous persistence.
pub struct AuditLog {
    ring: Mutex<VecDeque<AuditEntry>>,
    sender: Option<mpsc::Sender<AuditEntry>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.ring.lock().len())
            .field("persistent", &self.sender.is_some())
            .finish()
    }
}

impl AuditLog {
    /// Creates a log with no durable sink (ring buffer only).
    pub fn in_memory() -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            sender: None,
            flusher: Mutex::new(None),
        }
    }

    /// Creates a log that flushes entries to `sink` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEntry>(FLUSH_QUEUE_DEPTH);
        let flusher = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                if let Err(err) = sink.persist(&entry).await {
                    tracing::warn!(error = %err, action = %entry.action, "audit persistence failed");
                }
            }
        });
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            sender: Some(sender),
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// Records a decision. Never blocks and never fails.
    pub fn record(&self, entry: AuditEntry) {
        {
            let mut ring = self.ring.lock();
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(entry.clone());
        }

        if let Some(sender) = &self.sender {
            if let Err(mpsc::error::TrySendError::Full(dropped)) = sender.try_send(entry) {
                tracing::debug!(
                    action = %dropped.action,
                    "audit flush queue full, entry retained in ring only"
                );
            }
        }
    }

    /// Returns the most recent `n` entries, newest last.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let ring = self.ring.lock();
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Returns whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Stops the flush task. Entries still queued may be dropped; the ring
    /// retains them.
    pub async fn shutdown(&self) {
        let handle = { self.flusher.lock().take() };
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    struct RecordingSink {
        entries: SyncMutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn persist(&self, entry: &AuditEntry) -> ProviderResult<()> {
            self.entries.lock().push(entry.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn persist(&self, _entry: &AuditEntry) -> ProviderResult<()> {
            Err(crate::error::ProviderError::Backend(
                crate::error::BackendError::Serialization {
                    message: "sink down".to_string(),
                },
            ))
        }
    }

    #[test]
    fn test_ring_caps_at_capacity() {
        let log = AuditLog::in_memory();
        for i in 0..(RING_CAPACITY + 50) {
            log.record(AuditEntry::new(format!("u{i}"), None, "check", "clients", true));
        }
        assert_eq!(log.len(), RING_CAPACITY);

        // Oldest entries were dropped.
        let recent = log.recent(RING_CAPACITY);
        assert_eq!(recent.first().unwrap().user_id, "u50");
    }

    #[test]
    fn test_recent_returns_newest_last() {
        let log = AuditLog::in_memory();
        log.record(AuditEntry::new("u1", Some("c1"), "a", "r", true));
        log.record(AuditEntry::new("u2", Some("c1"), "b", "r", false));

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].user_id, "u2");
        assert!(!recent[1].success);
    }

    #[tokio::test]
    async fn test_sink_receives_entries() {
        let sink = Arc::new(RecordingSink {
            entries: SyncMutex::new(Vec::new()),
        });
        let log = AuditLog::with_sink(sink.clone());

        log.record(AuditEntry::new("u1", Some("c1"), "check", "clients", true));

        // Give the flush task a tick to drain.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(sink.entries.lock().len(), 1);

        log.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_failure_never_surfaces() {
        let log = AuditLog::with_sink(Arc::new(FailingSink));

        // record() has no error path; the ring still retains the entry.
        log.record(AuditEntry::new("u1", None, "check", "clients", false));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(log.len(), 1);

        log.shutdown().await;
    }

    #[test]
    fn test_entry_to_row_shape() {
        let row = AuditEntry::new("u1", Some("c1"), "delete_deliveries", "deliveries", false)
            .with_details("role below manager")
            .to_row();
        assert_eq!(row["user_id"], "u1");
        assert_eq!(row["client_id"], "c1");
        assert_eq!(row["success"], false);
        assert!(row["id"].as_str().is_some());
    }
}
