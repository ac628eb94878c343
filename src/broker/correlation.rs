//! Request/response correlation table with TTL-bound cleanup
//! (SPEC_FULL §3 "Request-Response Correlation Entry", §4.1).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use super::metrics::BrokerMetrics;
use crate::util::RequestId;

/// The content map delivered to a correlation entry's waiter: either a
/// provider-shaped `capability_response` payload or `{error: <text>}`.
pub type CorrelationValue = std::collections::HashMap<String, Value>;

struct SenderSlot {
    sender: Option<oneshot::Sender<CorrelationValue>>,
    created_at: DateTime<Utc>,
}

/// Owns every in-flight `request_id -> waiter` mapping.
///
/// Split into two maps because a `oneshot::Receiver` cannot be cloned or
/// looked up twice: `create` stashes both halves under `request_id`, a
/// later `take_receiver` (called from `wait_for_response`) hands the
/// receive half to its caller, while the sender half stays reachable so a
/// `capability_response`/`error` arriving on the dispatch path can still
/// resolve it.
pub struct CorrelationTable {
    senders: DashMap<RequestId, SenderSlot>,
    receivers: DashMap<RequestId, oneshot::Receiver<CorrelationValue>>,
    ttl: Duration,
    stopped: Arc<AtomicBool>,
    metrics: Arc<BrokerMetrics>,
}

impl CorrelationTable {
    /// Build a new table. `ttl` bounds how long an entry may remain
    /// unfulfilled before the GC sweep cancels it.
    pub fn new(ttl: Duration, metrics: Arc<BrokerMetrics>) -> Self {
        Self {
            senders: DashMap::new(),
            receivers: DashMap::new(),
            ttl,
            stopped: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Register a new correlation entry for `request_id`.
    pub fn create(&self, request_id: RequestId) {
        let (tx, rx) = oneshot::channel();
        self.senders.insert(
            request_id,
            SenderSlot {
                sender: Some(tx),
                created_at: Utc::now(),
            },
        );
        self.receivers.insert(request_id, rx);
    }

    /// Take the receiver for `request_id`, if the entry still exists and
    /// hasn't already been taken by another waiter.
    pub fn take_receiver(
        &self,
        request_id: RequestId,
    ) -> Option<oneshot::Receiver<CorrelationValue>> {
        self.receivers.remove(&request_id).map(|(_, rx)| rx)
    }

    /// Resolve the entry for `request_id` with `value`. Returns `true` if
    /// an unfulfilled entry was present. A missing or already-fulfilled
    /// entry is not an error (SPEC_FULL §4.1: "An already-fulfilled or
    /// missing entry is a warning, not an error").
    pub fn fulfill(&self, request_id: RequestId, value: CorrelationValue) -> bool {
        if let Some((_, mut slot)) = self.senders.remove(&request_id) {
            if let Some(sender) = slot.sender.take() {
                // Ignore send errors: the waiter may have already timed
                // out and dropped its receiver.
                let _ = sender.send(value);
                return true;
            }
        }
        false
    }

    /// Drop whatever state remains for `request_id` without resolving it
    /// (used when a caller's own `wait_for_response` timeout or error
    /// path fires).
    pub fn remove(&self, request_id: RequestId) {
        self.senders.remove(&request_id);
        self.receivers.remove(&request_id);
    }

    /// Number of outstanding correlation entries.
    pub fn active_count(&self) -> usize {
        self.senders.len()
    }

    /// Whether the table has been stopped (used by callers to distinguish
    /// a receiver error caused by shutdown from one caused by TTL expiry).
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Remove every entry older than `ttl`, dropping their senders so
    /// waiters observe a closed channel.
    fn sweep_expired(&self) {
        let now = Utc::now();
        let ttl_ms = self.ttl.as_millis() as i64;
        let mut expired = Vec::new();
        for entry in self.senders.iter() {
            if now.signed_duration_since(entry.created_at).num_milliseconds() > ttl_ms {
                expired.push(*entry.key());
            }
        }
        for request_id in expired {
            if self.senders.remove(&request_id).is_some() {
                self.receivers.remove(&request_id);
                self.metrics.record_future_cleanup();
                debug!(%request_id, "correlation entry expired past ttl");
            }
        }
    }

    /// Cancel every outstanding entry (broker shutdown); waiters observe
    /// `Cancelled` rather than `Timeout`.
    pub fn cancel_all(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.senders.clear();
        self.receivers.clear();
    }

    /// Spawn the background GC task that sweeps every `cleanup_interval`.
    /// The returned handle should be aborted on broker shutdown.
    pub fn spawn_gc(self: &Arc<Self>, cleanup_interval: Duration) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                table.sweep_expired();
            }
        })
    }
}
