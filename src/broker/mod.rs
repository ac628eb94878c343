//! The capability message broker: priority queues, request/response
//! correlation, the capability registry, and the provider contract
//! (SPEC_FULL §4.1, §4.2, §6, §9).
//!
//! # Components
//!
//! - [`MessageBroker`] - the concrete broker engine
//! - [`Provider`] - the trait every capability provider implements
//! - [`CapabilityRegistry`] - active/dormant capability → provider lookup
//! - [`CorrelationTable`] - request/response correlation with TTL GC
//! - [`PriorityQueues`] - the three-tier bounded FIFO with backpressure
//! - [`BrokerError`] - error types a caller may observe
//! - [`BrokerMetrics`] / [`MetricsSnapshot`] - broker-wide counters
//!
//! This file contains only module declarations and re-exports; the
//! implementation lives in the individual submodules.

pub mod capability_registry;
pub mod correlation;
pub mod error;
pub mod in_memory;
pub mod metrics;
pub mod provider;
pub mod queue;

pub use capability_registry::CapabilityRegistry;
pub use correlation::{CorrelationTable, CorrelationValue};
pub use error::BrokerError;
pub use in_memory::{BroadcastRecorder, BrokerConfig, MessageBroker};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use provider::{BrokerHandle, Provider};
pub use queue::{EnqueueOutcome, PriorityQueues};
