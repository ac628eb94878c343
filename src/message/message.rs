//! The wire-level `Message` envelope (SPEC_FULL §3).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use super::priority::{classify, MessagePriority};
use crate::util::ids::{MessageId, RequestId};

/// Reserved message type marking a broadcast capability request.
pub const CAPABILITY_REQUEST: &str = "capability_request";
/// Reserved message type marking a reply to a capability request.
pub const CAPABILITY_RESPONSE: &str = "capability_response";
/// Reserved message type marking an error reply.
pub const ERROR: &str = "error";

/// An immutable message passed between providers through the
/// [`crate::broker::MessageBroker`].
///
/// Once constructed a `Message` is never mutated; the broker's fan-out
/// path clones the envelope (cheaply — `content` is reference-counted via
/// `serde_json::Value`'s internal sharing for strings/arrays) rather than
/// mutating a shared instance, so callers may treat `content` as
/// effectively read-only even across concurrent deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Name of the provider (or orchestrator component) that sent this.
    pub from_agent: String,
    /// Target provider name, or `None` for a broadcast.
    pub to_agent: Option<String>,
    /// `capability_request`, `capability_response`, `error`, or free-form.
    pub message_type: String,
    /// Dynamic payload. Capability requests carry
    /// `{capability, data, allowed_agents?}`; responses carry either a
    /// provider-shaped payload or
    /// `{response, metadata?, actions?, results?, tool_calls?}`.
    pub content: HashMap<String, Value>,
    /// Correlation key linking a request to its eventual response.
    pub request_id: Option<RequestId>,
    /// Id of the message this one is replying to, if any.
    pub reply_to: Option<MessageId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a new message. `content` defaults to an empty map; use
    /// the builder methods below to attach fields.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: Option<String>,
        message_type: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            from_agent: from_agent.into(),
            to_agent,
            message_type: message_type.into(),
            content: HashMap::new(),
            request_id: None,
            reply_to: None,
            created_at: Utc::now(),
        }
    }

    /// Builder method: attach a content map.
    pub fn with_content(mut self, content: HashMap<String, Value>) -> Self {
        self.content = content;
        self
    }

    /// Builder method: set a single content field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Builder method: set the correlation id.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Builder method: set the reply-to id.
    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// The priority this message would classify to absent an explicit
    /// override from the sender (SPEC_FULL §4.1's classification table).
    pub fn default_priority(&self) -> MessagePriority {
        classify(&self.message_type)
    }

    /// Read the `error` field out of `content`, if present, per the error
    /// envelope convention of SPEC_FULL §6.
    pub fn error_text(&self) -> Option<&str> {
        self.content.get("error").and_then(Value::as_str)
    }

    /// Convenience constructor for an `error` message.
    pub fn error(
        from_agent: impl Into<String>,
        to_agent: Option<String>,
        request_id: Option<RequestId>,
        error_text: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(from_agent, to_agent, ERROR);
        msg.request_id = request_id;
        msg.content
            .insert("error".to_string(), Value::String(error_text.into()));
        msg
    }
}
