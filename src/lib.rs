//! # conduit-rt - Agent Message Bus and Protocol Runtime
//!
//! A priority-aware in-process message broker, a scripted-protocol
//! runtime, and the end-to-end request orchestrator that sits in front
//! of both, for systems that route a user utterance through a set of
//! cooperating capability providers (SPEC_FULL.md §1-§2).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use conduit_rt::prelude::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Lights;
//!
//! #[async_trait]
//! impl Provider for Lights {
//!     fn name(&self) -> &str { "lights" }
//!     fn capabilities(&self) -> Vec<String> { vec!["set_color_name".into()] }
//!     async fn receive_message(&self, _msg: Message) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = MessageBroker::new(BrokerConfig::default());
//!     broker.register_provider(Arc::new(Lights), true, false);
//!     broker.start();
//! }
//! ```
//!
//! # Core Subsystems
//!
//! - [`message`] - the immutable [`message::Message`] envelope and
//!   priority classification (SPEC_FULL §3, §4.1).
//! - [`broker`] - the priority queues, worker pool, request/response
//!   correlation table, capability registry and backpressure policy
//!   (SPEC_FULL §4.1, §4.2, §5).
//! - [`protocol`] - the declarative protocol data model, persistent
//!   registry, trigger matcher, step executor and response formatter
//!   (SPEC_FULL §4.3-§4.6, §4.9).
//! - [`recorder`] - turns a live sequence of dispatched capability calls
//!   into a replayable protocol (SPEC_FULL §4.8).
//! - [`orchestrator`] - the top-level request pipeline: night-mode gate,
//!   fast-path protocol match, NLU fallback, conversation history
//!   (SPEC_FULL §4.7).
//! - [`logging`] - the two append-only observability sinks (SPEC_FULL
//!   §4.10, §6).
//! - [`memory`] - the fact/vector memory service boundaries consumed by
//!   a memory-capability provider (SPEC_FULL §4.11).
//! - [`config`] - ambient runtime configuration, feature flags, and
//!   per-user profile/override state (SPEC_FULL §2.1, §2.2, §3).
//! - [`util`] - identifier newtypes and normalization helpers shared
//!   across the above.
//!
//! # Architecture Principles
//!
//! - **No package-level singletons.** Metrics, the correlation table and
//!   conversation history are owned by one [`broker::MessageBroker`] /
//!   [`orchestrator::Orchestrator`] instance passed explicitly
//!   (SPEC_FULL §9 "Global mutable state").
//! - **Nothing inside a provider ever unwinds the broker.** Provider
//!   failures are converted to `{error: ...}` step results or error
//!   messages, never propagated as panics across the broker boundary
//!   (SPEC_FULL §7).
//! - **Ownership cycle broken by name, not by reference.** The broker
//!   indexes providers by name; providers receive a [`broker::BrokerHandle`]
//!   back-reference instead of owning the broker (SPEC_FULL §9).
//!
//! # See Also
//!
//! - `SPEC_FULL.md` - the full functional specification this crate
//!   implements.
//! - `DESIGN.md` - the grounding ledger recording which teacher/example
//!   code each module is built from.

pub mod broker;
pub mod config;
pub mod constants;
pub mod logging;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod prelude;
pub mod protocol;
pub mod recorder;
pub mod util;

// Re-export commonly used types so `conduit_rt::Foo` works without
// reaching into submodules, mirroring the prelude's grouping.
pub use broker::{
    BrokerError, BrokerHandle, BrokerMetrics, CapabilityRegistry, CorrelationTable,
    MessageBroker, MetricsSnapshot, Provider,
};
pub use config::{AgentProfile, FeatureFlags, RuntimeConfig, UserConfig};
pub use constants::{INTENT_MATCHING_CAPABILITY, WAKE_PROTOCOL_NAME};
pub use logging::{InteractionEntry, InteractionLogger, ProtocolUsageEntry, ProtocolUsageLogger};
pub use memory::{FactMemoryService, MemoryMatch, VectorMemoryService};
pub use message::{Message, MessagePriority};
pub use orchestrator::{ConversationHistory, HistoryTurn, Orchestrator, RequestMetadata};
pub use protocol::{
    ArgumentDefinition, ArgumentType, MatchResult, Protocol, ProtocolExecutor, ProtocolResponse,
    ProtocolRegistry, ProtocolRuntime, ProtocolStep, ResponseFormatter, ResponseMode,
    TriggerMatcher,
};
pub use recorder::{Recorder, RecorderError, RecorderSink};
pub use util::{MessageId, ProtocolId, RequestId};
