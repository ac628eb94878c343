//! Utility types and helpers shared across the broker, protocol runtime,
//! and orchestrator.

pub mod ids;
pub mod normalize;
pub mod serde_helpers;

pub use ids::{MessageId, ProtocolId, RequestId};
pub use serde_helpers::duration_serde;
