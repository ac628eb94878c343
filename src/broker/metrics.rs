//! Broker-wide observability counters (SPEC_FULL §4.1 "Observed metrics").

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Monotonic counters plus the circuit-breaker flag, all updated with
/// relaxed atomics: exact ordering between counters does not matter, only
/// that increments are never lost under concurrent access.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    direct_messages: AtomicU64,
    queued_messages: AtomicU64,
    broadcast_messages: AtomicU64,
    dropped_messages: AtomicU64,
    backpressure_events: AtomicU64,
    future_cleanups: AtomicU64,
    circuit_breaker_active: AtomicBool,
}

/// Point-in-time snapshot of [`BrokerMetrics`], suitable for exposing to a
/// caller of `MessageBroker::metrics()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Fast-path direct deliveries.
    pub direct_messages: u64,
    /// Messages that went through a priority queue.
    pub queued_messages: u64,
    /// Capability-request broadcasts fanned out to providers.
    pub broadcast_messages: u64,
    /// Messages dropped under backpressure.
    pub dropped_messages: u64,
    /// Times the backpressure policy intervened (eviction or drop).
    pub backpressure_events: u64,
    /// Correlation entries reaped by the TTL sweep.
    pub future_cleanups: u64,
    /// Whether the circuit breaker is currently tripped.
    pub circuit_breaker_active: bool,
}

impl BrokerMetrics {
    /// Construct a fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_direct(&self) {
        self.direct_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queued(&self) {
        self.queued_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self) {
        self.broadcast_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backpressure_event(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_future_cleanup(&self) {
        self.future_cleanups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_circuit_breaker(&self, active: bool) {
        self.circuit_breaker_active.store(active, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting; individual fields
    /// may be off by one relative to each other under concurrent updates,
    /// which is acceptable for a metrics endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            direct_messages: self.direct_messages.load(Ordering::Relaxed),
            queued_messages: self.queued_messages.load(Ordering::Relaxed),
            broadcast_messages: self.broadcast_messages.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            future_cleanups: self.future_cleanups.load(Ordering::Relaxed),
            circuit_breaker_active: self.circuit_breaker_active.load(Ordering::Relaxed),
        }
    }
}
