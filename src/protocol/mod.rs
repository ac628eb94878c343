//! The protocol subsystem: data model, persistent registry, trigger
//! matcher, step executor, response formatter, the facade composing them,
//! and the bulk directory loader (SPEC_FULL §4.3-§4.6, §4.9).
//!
//! # Components
//!
//! - [`model`] - [`Protocol`], [`ProtocolStep`], [`ArgumentDefinition`], [`ProtocolResponse`]
//! - [`registry`] - [`ProtocolRegistry`], the SQLite-backed persistent store
//! - [`matcher`] - [`TriggerMatcher`], utterance → protocol + arguments
//! - [`executor`] - [`ProtocolExecutor`], runs a matched protocol's steps
//! - [`formatter`] - [`ResponseFormatter`], renders a run's result as text
//! - [`runtime`] - [`ProtocolRuntime`], the facade composing the above
//! - [`loader`] - bulk JSON directory loading
//! - [`error`] - [`ProtocolError`]

pub mod error;
pub mod executor;
pub mod formatter;
pub mod loader;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod runtime;

pub use error::ProtocolError;
pub use executor::{ExecutionResult, ProtocolExecutor};
pub use formatter::{AiCollaborator, ResponseFormatter};
pub use loader::load_directory;
pub use matcher::{MatchResult, MatcherError, TriggerMatcher};
pub use model::{ArgumentDefinition, ArgumentType, Protocol, ProtocolResponse, ProtocolStep, ResponseMode};
pub use registry::{ConflictKind, ProtocolRegistry, RegisterOutcome};
pub use runtime::ProtocolRuntime;
