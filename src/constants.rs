//! Fixed protocol/capability names shared across the broker, the protocol
//! runtime and the orchestrator (SPEC_FULL §2.2, §4.3, §4.7).

/// Name of the always-loaded protocol that recognizes the wake phrase
/// before any user-defined protocol is consulted.
pub const WAKE_PROTOCOL_NAME: &str = "wake";

/// Capability name the orchestrator's intent matcher broadcasts under;
/// excluded from protocol-usage recording so that matching attempts
/// themselves don't pollute the usage log (SPEC_FULL §2.2, §4.7).
pub const INTENT_MATCHING_CAPABILITY: &str = "intent_matching";
