//! Error types surfaced by the protocol registry, matcher and executor
//! (SPEC_FULL §7).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::ProtocolId;

/// Failure modes of the protocol subsystem.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// `get`/`find_matching_protocol` found nothing for the given id.
    #[error("protocol not found: {0}")]
    NotFound(ProtocolId),

    /// `register` rejected a name collision under the name-normalization
    /// rule (SPEC_FULL §4.3 invariant 1).
    #[error("a protocol named '{0}' already exists")]
    DuplicateName(String),

    /// `register` rejected a trigger-phrase-set collision under the
    /// trigger normalization rule (SPEC_FULL §4.3 invariant 2).
    #[error("a protocol with an equivalent trigger-phrase set already exists: {0}")]
    DuplicateTriggerSet(String),

    /// A loaded or registered definition failed basic structural
    /// validation (empty name, etc).
    #[error("invalid protocol definition: {0}")]
    InvalidDefinition(String),

    /// JSON (de)serialization of a protocol definition failed.
    #[error("failed to parse protocol JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The persistent store returned an error.
    #[error("protocol storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A step failed to execute (surfaced for steps whose failure the
    /// caller asked to treat as fatal; normal executor operation instead
    /// records a per-step `{error: ...}` entry and continues, per
    /// SPEC_FULL §4.5/§7).
    #[error("step execution failed: {0}")]
    Execution(String),
}
