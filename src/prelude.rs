//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits for
//! wiring a capability provider, a protocol, or a full orchestrator pass
//! through this crate. Import it to get started quickly:
//!
//! ```rust
//! use conduit_rt::prelude::*;
//! ```
//!
//! # What's Included
//!
//! ## Messaging
//! - [`Message`] - the immutable envelope exchanged through the broker
//! - [`MessagePriority`] - High/Normal/Low classification
//!
//! ## Message Broker
//! - [`MessageBroker`] - the concrete broker engine
//! - [`BrokerConfig`] - queue capacities, TTL, worker count
//! - [`Provider`] - the capability-provider contract
//! - [`BrokerHandle`] - the back-reference given to providers at registration
//! - [`CapabilityRegistry`] - active/dormant capability lookup
//! - [`BrokerError`] - error types a caller may observe
//! - [`BrokerMetrics`] / [`MetricsSnapshot`] - broker-wide counters
//!
//! ## Protocol Runtime
//! - [`Protocol`], [`ProtocolStep`], [`ArgumentDefinition`], [`ProtocolResponse`] - the data model
//! - [`ProtocolRegistry`] - the persistent, duplicate-checked protocol store
//! - [`TriggerMatcher`] - utterance → protocol + extracted arguments
//! - [`ProtocolExecutor`] - runs a matched protocol's steps
//! - [`ResponseFormatter`] - renders a run's result as text
//! - [`ProtocolRuntime`] - the facade composing the four above
//!
//! ## Recording
//! - [`Recorder`] - turns dispatched capability calls into a protocol
//! - [`RecorderSink`] - where a finished recording is persisted
//!
//! ## Orchestration
//! - [`Orchestrator`] - the end-to-end request pipeline
//! - [`ConversationHistory`] - bounded per-user FIFO of prior turns
//! - [`RequestMetadata`] - per-request user/device/location context
//!
//! ## Observability
//! - [`InteractionLogger`] / [`ProtocolUsageLogger`] - the two append-only sinks
//!
//! ## Memory
//! - [`FactMemoryService`] / [`VectorMemoryService`] - external memory collaborators
//!
//! ## Configuration
//! - [`RuntimeConfig`] - tunables (queue capacity, TTLs, timeouts)
//! - [`FeatureFlags`] - boolean toggles gating which providers are wired up
//! - [`UserConfig`] / [`AgentProfile`] - per-user overrides and profile state
//!
//! ## Utilities
//! - [`MessageId`], [`RequestId`], [`ProtocolId`] - identifier newtypes
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_rt::prelude::*;
//! use async_trait::async_trait;
//!
//! struct Lights;
//!
//! #[async_trait]
//! impl Provider for Lights {
//!     fn name(&self) -> &str { "lights" }
//!     fn capabilities(&self) -> Vec<String> { vec!["set_color_name".into()] }
//!     async fn receive_message(&self, _msg: Message) {}
//! }
//! ```

// Messaging
pub use crate::message::{Message, MessagePriority};

// Message broker
pub use crate::broker::{
    BrokerConfig, BrokerError, BrokerHandle, BrokerMetrics, CapabilityRegistry, MessageBroker,
    MetricsSnapshot, Provider,
};

// Protocol runtime
pub use crate::protocol::{
    ArgumentDefinition, ArgumentType, MatchResult, Protocol, ProtocolExecutor, ProtocolResponse,
    ProtocolRegistry, ProtocolRuntime, ProtocolStep, ResponseFormatter, ResponseMode,
    TriggerMatcher,
};

// Recording
pub use crate::recorder::{Recorder, RecorderError, RecorderSink};

// Orchestration
pub use crate::orchestrator::{ConversationHistory, HistoryTurn, Orchestrator, RequestMetadata};

// Observability
pub use crate::logging::{InteractionEntry, InteractionLogger, ProtocolUsageEntry, ProtocolUsageLogger};

// Memory
pub use crate::memory::{FactMemoryService, MemoryMatch, VectorMemoryService};

// Configuration
pub use crate::config::{AgentProfile, FeatureFlags, RuntimeConfig, UserConfig};

// Utilities
pub use crate::util::{MessageId, ProtocolId, RequestId};
