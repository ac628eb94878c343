//! Comprehensive broker error types with context.
//!
//! This module defines all error types that can occur during message broker
//! operations, including request correlation failures, timeouts, and
//! registry management errors (SPEC_FULL §7).

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::RequestId;

/// Comprehensive broker error types with contextual information.
///
/// `BrokerError` represents the failure modes named by SPEC_FULL §7 that
/// are allowed to bubble to a caller: `UnknownRequest` (programmer error)
/// and `Timeout`. Everything else originating inside a provider is
/// converted into an error message or a step-scoped error entry rather
/// than propagated as a Rust error (§7's "nothing originating inside a
/// provider ever unwinds the broker" rule).
///
/// # Example
///
/// ```rust
/// use conduit_rt::broker::BrokerError;
/// use conduit_rt::util::RequestId;
/// use std::time::Duration;
///
/// let error = BrokerError::UnknownRequest(RequestId::new());
/// assert!(error.to_string().contains("Unknown request"));
/// ```
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `wait_for_response` was called with a `request_id` that has no
    /// correlation entry (SPEC_FULL §4.1, §7).
    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    /// A correlation entry's TTL elapsed, or an explicit `wait_for_response`
    /// timeout expired, before a response arrived.
    #[error("Timeout waiting for request {request_id} after {waited:?}")]
    Timeout {
        /// The request that timed out.
        request_id: RequestId,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The broker was stopped while a correlation entry was still
    /// outstanding; its waiter observes this instead of `Timeout`.
    #[error("Request {0} cancelled because the broker is shutting down")]
    Cancelled(RequestId),

    /// No provider advertises the requested capability.
    #[error("No provider advertises capability: {0}")]
    NoProvider(String),

    /// The named provider is not present in `allowed_agents`.
    #[error("Provider not in allowed_agents: {0}")]
    ProviderDisallowed(String),

    /// A provider's in-process function (or a `capability_request` it
    /// answered) returned an error.
    #[error("Step execution failed: {0}")]
    StepExecutionError(String),

    /// A registry mutation (register/unregister provider, activate/
    /// deactivate capabilities) failed.
    #[error("Registry error: {0}")]
    RegistryError(String),
}
