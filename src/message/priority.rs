//! Message priority classification (SPEC_FULL §4.1).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Routing priority for a [`crate::message::Message`].
///
/// Drain order across the broker's three queues is strictly
/// `High` before `Normal` before `Low`; within a queue, FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessagePriority {
    /// Best-effort, background traffic. Eligible for eviction under
    /// backpressure.
    Low = 0,
    /// Default priority: `capability_request` and free-form sends.
    Normal = 1,
    /// `capability_response` and `error` messages, plus anything a sender
    /// explicitly escalates.
    High = 2,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Classify a message type string per the table in SPEC_FULL §4.1.
///
/// Senders may still override this by passing an explicit priority to
/// `MessageBroker::send`.
pub fn classify(message_type: &str) -> MessagePriority {
    match message_type {
        "capability_response" | "error" => MessagePriority::High,
        "capability_request" => MessagePriority::Normal,
        _ => MessagePriority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_high_over_normal_over_low() {
        assert!(MessagePriority::High > MessagePriority::Normal);
        assert!(MessagePriority::Normal > MessagePriority::Low);
    }

    #[test]
    fn default_is_normal() {
        assert_eq!(MessagePriority::default(), MessagePriority::Normal);
    }

    #[test]
    fn classifies_known_types() {
        assert_eq!(classify("capability_response"), MessagePriority::High);
        assert_eq!(classify("error"), MessagePriority::High);
        assert_eq!(classify("capability_request"), MessagePriority::Normal);
        assert_eq!(classify("chit_chat"), MessagePriority::Low);
    }
}
