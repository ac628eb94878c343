//! The capability-provider contract (SPEC_FULL §6 "Provider contract").

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;

// Layer 3: Internal module imports
use super::in_memory::MessageBroker;
use crate::message::Message;

/// A handle providers use to call back into the broker that registered
/// them.
///
/// `MessageBroker` is itself a cheap `Arc`-backed clone (SPEC_FULL §9
/// "Back-references": the broker indexes providers by name without
/// owning them, so a provider holding a `BrokerHandle` does not create a
/// destructor cycle — the broker's provider directory never holds a
/// strong reference back to whatever owns the provider).
pub type BrokerHandle = MessageBroker;

/// A named component advertising a capability set and a
/// `receive_message` entry point.
///
/// Implementations are expected to be cheap to hold behind `Arc<dyn
/// Provider>` in the broker's provider directory (SPEC_FULL §6, §9).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, used as the broker's directory key and as
    /// `to_agent` / `from_agent` in messages.
    fn name(&self) -> &str;

    /// Capability strings this provider advertises at registration time.
    fn capabilities(&self) -> Vec<String>;

    /// Entry point for every message the broker delivers to this
    /// provider, whether via fast-path or broadcast fan-out.
    async fn receive_message(&self, message: Message);

    /// Optional in-process function table lookup, used by the executor
    /// to bypass the queue for deterministic one-party calls (SPEC_FULL
    /// §4.5). Returns `None` if this provider has no such function,
    /// `Some(Err(_))` if the call itself failed.
    async fn call_function(
        &self,
        _function: &str,
        _params: HashMap<String, Value>,
    ) -> Option<Result<HashMap<String, Value>, String>> {
        None
    }

    /// Called once, immediately after registration, so the provider can
    /// retain a [`BrokerHandle`] for sending responses back. Default is a
    /// no-op for providers that never need to call back (pure
    /// request/response consumers driven entirely by the executor).
    fn on_registered(&self, _broker: BrokerHandle) {}
}
