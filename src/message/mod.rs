//! The message envelope exchanged between capability providers through
//! the broker (SPEC_FULL §3, §4.1).

pub mod message;
pub mod priority;

pub use message::{Message, CAPABILITY_REQUEST, CAPABILITY_RESPONSE, ERROR};
pub use priority::{classify, MessagePriority};
