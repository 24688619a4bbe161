//! Error types for Callflow.
//!
//! All errors in Callflow are represented by the `CallflowError` enum.
//! Expected routing outcomes such as "all buyers busy" or an admission
//! denial are NOT errors; they travel through flow edges as
//! `RotationDecision` / `Admission` values.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Callflow operations.
///
/// Each variant represents a specific category of error that can occur
/// during flow authoring, compilation, or call execution.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum CallflowError {
    /// Engine-level errors (startup, shutdown, unknown call ids).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, etc.).
    #[error("{0}")]
    Convert(String),

    /// A flow declares two nodes with the same id.
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    /// A node references a node id that does not exist in the flow.
    #[error("node '{node_id}' references non-existent node '{target}'")]
    DanglingReference {
        node_id: String,
        target: String,
    },

    /// The entry target does not resolve to a node in the flow.
    #[error("entry target node '{0}' not found in nodes")]
    EntryTargetMissing(String),

    /// An `if` node condition could not be evaluated.
    #[error("condition error: {0}")]
    Condition(String),

    /// Runtime execution errors (node not found in plan, dead ends).
    #[error("{0}")]
    Runtime(String),

    /// Per-call session errors.
    #[error("{0}")]
    Session(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// External collaborator failures (buyer directory, billing, media).
    #[error("{0}")]
    Collaborator(String),
}

impl From<CallflowError> for String {
    fn from(val: CallflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for CallflowError {
    fn from(error: std::io::Error) -> Self {
        CallflowError::Engine(error.to_string())
    }
}

impl From<CallflowError> for std::io::Error {
    fn from(val: CallflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for CallflowError {
    fn from(error: serde_json::Error) -> Self {
        CallflowError::Convert(error.to_string())
    }
}
