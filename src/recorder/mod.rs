//! Records a protocol's steps as they are dispatched, so a user
//! utterance that matched no existing protocol can still be turned into
//! a new, reusable one by "recording" what was actually done
//! (SPEC_FULL §4.8).
//!
//! [`Recorder`] implements [`crate::broker::BroadcastRecorder`] so the
//! broker can feed it capability broadcasts without depending on this
//! module, and [`crate::protocol::ProtocolExecutor`] accepts the same
//! trait object for steps dispatched through a provider's direct
//! function table (SPEC_FULL §4.5 "Recording").

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

// Layer 3: Internal module imports
use crate::broker::BroadcastRecorder;
use crate::protocol::{Protocol, ProtocolStep};

/// Failure modes of the recording lifecycle.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// `record_step`, `replace_step` or `stop` was called before `start`.
    #[error("recorder is not currently recording a protocol")]
    NotRecording,
    /// `replace_step` named an index past the end of the steps recorded
    /// so far.
    #[error("step index {index} is out of range (only {len} steps recorded)")]
    StepOutOfRange { index: usize, len: usize },
}

/// Receives the finished [`Protocol`] when a recording session ends
/// (persisting it, e.g. into a [`crate::protocol::ProtocolRegistry`], is
/// the caller's concern — this crate keeps the sink abstract so the
/// recorder itself never depends on the registry's storage backend).
#[async_trait]
pub trait RecorderSink: Send + Sync {
    async fn save(&self, protocol: Protocol);
}

/// Builds up a [`Protocol`] one step at a time as a broker dispatches
/// capability requests, so an unmatched-but-successful interaction can
/// be captured and replayed later.
///
/// Holds its in-progress state behind a single `parking_lot::Mutex`
/// rather than splitting fields across several locks: every method call
/// is a short, synchronous mutation, and recording sessions are
/// one-at-a-time by construction (a new `start` replaces whatever was
/// being built).
pub struct Recorder {
    state: Mutex<Option<Protocol>>,
    sink: Option<std::sync::Arc<dyn RecorderSink>>,
}

impl Recorder {
    /// Build a recorder with no sink; [`Recorder::stop`] only returns the
    /// finished protocol.
    pub fn new() -> Self {
        Self { state: Mutex::new(None), sink: None }
    }

    /// Build a recorder that also persists the finished protocol to
    /// `sink` on [`Recorder::stop`].
    pub fn with_sink(sink: std::sync::Arc<dyn RecorderSink>) -> Self {
        Self { state: Mutex::new(None), sink: Some(sink) }
    }

    /// Begin a new recording session, discarding any prior in-progress
    /// protocol that was never stopped.
    pub fn start(&self, name: impl Into<String>, description: impl Into<String>) {
        let protocol = Protocol::new(name, description);
        *self.state.lock() = Some(protocol);
        info!("recording session started");
    }

    /// Append a step to the in-progress protocol.
    pub fn record_step(
        &self,
        agent: impl Into<String>,
        function: impl Into<String>,
        parameters: HashMap<String, Value>,
        parameter_mappings: HashMap<String, String>,
    ) -> Result<(), RecorderError> {
        let mut guard = self.state.lock();
        let protocol = guard.as_mut().ok_or(RecorderError::NotRecording)?;
        protocol.push_step(ProtocolStep {
            agent: agent.into(),
            function: function.into(),
            parameters,
            parameter_mappings,
        });
        Ok(())
    }

    /// Overwrite the step at `index` in place (used when a recorded step
    /// needs its parameters corrected before the session is stopped).
    pub fn replace_step(&self, index: usize, step: ProtocolStep) -> Result<(), RecorderError> {
        let mut guard = self.state.lock();
        let protocol = guard.as_mut().ok_or(RecorderError::NotRecording)?;
        let len = protocol.steps.len();
        let slot = protocol.steps.get_mut(index).ok_or(RecorderError::StepOutOfRange { index, len })?;
        *slot = step;
        Ok(())
    }

    /// How many steps the in-progress protocol has recorded so far.
    /// Returns `0` when no session is in progress.
    pub fn step_count(&self) -> usize {
        self.state.lock().as_ref().map(|p| p.steps.len()).unwrap_or(0)
    }

    /// Finish the recording session, persist the result to the attached
    /// sink (if any), and return the finished protocol.
    pub async fn stop(&self) -> Result<Protocol, RecorderError> {
        let protocol = self.state.lock().take().ok_or(RecorderError::NotRecording)?;
        if let Some(sink) = &self.sink {
            sink.save(protocol.clone()).await;
        }
        info!(protocol = %protocol.name, steps = protocol.steps.len(), "recording session stopped");
        Ok(protocol)
    }

    /// Discard the in-progress session without persisting anything.
    pub fn clear(&self) {
        if self.state.lock().take().is_some() {
            info!("recording session cleared");
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastRecorder for Recorder {
    fn record_broadcast(&self, capability: &str, providers: &[String], data: &HashMap<String, Value>) {
        let Some(agent) = providers.first() else {
            return;
        };
        if let Err(error) = self.record_step(agent.clone(), capability.to_string(), data.clone(), HashMap::new()) {
            warn!(%error, capability, "dropped a broadcast that arrived outside an active recording session");
        }
    }
}
