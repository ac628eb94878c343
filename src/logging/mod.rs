//! Append-only observability sinks: [`ProtocolUsageLogger`] and
//! [`InteractionLogger`] (SPEC_FULL §4.10).
//!
//! Both are narrow `async_trait` interfaces with exactly one append
//! method, mirroring this codebase's `Monitor<E>` / `NoopMonitor`
//! framing but specialized to the two named sinks rather than a generic
//! event type, since SPEC_FULL §4.10 fixes their field shapes.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

// Layer 3: Internal module imports
// (none)

/// One row of the protocol usage log: everything SPEC_FULL §4.5
/// "Logging" and §6 "Protocol usage log" name.
#[derive(Debug, Clone)]
pub struct ProtocolUsageEntry {
    pub protocol_name: String,
    pub protocol_id: String,
    pub extracted_args: std::collections::HashMap<String, Value>,
    pub trigger_phrase: String,
    pub matched_phrase: String,
    pub timestamp: DateTime<Utc>,
    pub timezone: String,
    pub success: bool,
    pub latency_ms: f64,
    pub user_id: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
}

/// One row of the interaction log: everything SPEC_FULL §4.10/§6
/// "Interaction log" name.
#[derive(Debug, Clone)]
pub struct InteractionEntry {
    pub utterance: String,
    pub response: String,
    pub intent: Option<String>,
    pub capability: Option<String>,
    pub protocol_executed: Option<String>,
    pub latency_ms: f64,
    pub success: bool,
    pub user_id: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
}

/// Sink for [`ProtocolUsageEntry`] rows, one per protocol execution.
#[async_trait]
pub trait ProtocolUsageLogger: Send + Sync {
    async fn log_usage(&self, entry: ProtocolUsageEntry);
}

/// Sink for [`InteractionEntry`] rows, one per user-facing request.
#[async_trait]
pub trait InteractionLogger: Send + Sync {
    async fn log_interaction(&self, entry: InteractionEntry);
}

/// Zero-overhead sink that discards every entry, so the orchestrator and
/// executor are fully testable without a concrete sink (SPEC_FULL §4.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

#[async_trait]
impl ProtocolUsageLogger for NoopLogger {
    async fn log_usage(&self, _entry: ProtocolUsageEntry) {}
}

#[async_trait]
impl InteractionLogger for NoopLogger {
    async fn log_interaction(&self, _entry: InteractionEntry) {}
}

/// In-process test double that appends every entry to a `Vec` behind a
/// `parking_lot::Mutex`, used by this crate's own integration tests
/// (SPEC_FULL §4.10).
#[derive(Debug, Default)]
pub struct MemoryLogger {
    usage: Mutex<Vec<ProtocolUsageEntry>>,
    interactions: Mutex<Vec<InteractionEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every usage entry recorded so far, oldest first.
    pub fn usage_entries(&self) -> Vec<ProtocolUsageEntry> {
        self.usage.lock().clone()
    }

    /// Snapshot of every interaction entry recorded so far, oldest first.
    pub fn interaction_entries(&self) -> Vec<InteractionEntry> {
        self.interactions.lock().clone()
    }
}

impl Clone for ProtocolUsageEntry {
    fn clone(&self) -> Self {
        Self {
            protocol_name: self.protocol_name.clone(),
            protocol_id: self.protocol_id.clone(),
            extracted_args: self.extracted_args.clone(),
            trigger_phrase: self.trigger_phrase.clone(),
            matched_phrase: self.matched_phrase.clone(),
            timestamp: self.timestamp,
            timezone: self.timezone.clone(),
            success: self.success,
            latency_ms: self.latency_ms,
            user_id: self.user_id.clone(),
            device: self.device.clone(),
            location: self.location.clone(),
        }
    }
}

impl Clone for InteractionEntry {
    fn clone(&self) -> Self {
        Self {
            utterance: self.utterance.clone(),
            response: self.response.clone(),
            intent: self.intent.clone(),
            capability: self.capability.clone(),
            protocol_executed: self.protocol_executed.clone(),
            latency_ms: self.latency_ms,
            success: self.success,
            user_id: self.user_id.clone(),
            device: self.device.clone(),
            location: self.location.clone(),
            source: self.source.clone(),
        }
    }
}

#[async_trait]
impl ProtocolUsageLogger for MemoryLogger {
    async fn log_usage(&self, entry: ProtocolUsageEntry) {
        self.usage.lock().push(entry);
    }
}

#[async_trait]
impl InteractionLogger for MemoryLogger {
    async fn log_interaction(&self, entry: InteractionEntry) {
        self.interactions.lock().push(entry);
    }
}
