//! Error types for the workflow crate.
//!
//! Errors are layered per concern:
//! - `ConfigError`: structural and reference validation of a configuration
//! - `RegistryError`: function registry population
//! - `StoreError`: persistence backend and serialization failures
//! - `EngineError`: engine lifecycle operations (wraps lower errors)
//!
//! Failures *inside* a running execution (a node throwing, an unsupported
//! node type) are not surfaced as `Err` values; they terminate the owning
//! execution and are recorded as [`crate::execution::ErrorInfo`] on its
//! state.

use crate::execution::ExecutionStatus;
use amber_relay_core::{EdgeId, ExecutionId, NodeId};
use std::fmt;

/// Errors from validating a workflow configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No node of kind `start` exists in the configuration.
    NoStartNode,
    /// More than one node of kind `start` exists in the configuration.
    MultipleStartNodes { count: usize },
    /// Two nodes share the same id.
    DuplicateNodeId { node_id: NodeId },
    /// An edge references a node id that does not exist.
    UnknownEdgeEndpoint { edge_id: EdgeId, node_id: NodeId },
    /// A node or edge condition references a function name that is not
    /// present in the registry.
    UnknownFunctionRef { name: String, referenced_by: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStartNode => write!(f, "workflow has no start node"),
            Self::MultipleStartNodes { count } => {
                write!(f, "workflow has {count} start nodes, expected exactly one")
            }
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::UnknownEdgeEndpoint { edge_id, node_id } => {
                write!(f, "edge {edge_id} references unknown node {node_id}")
            }
            Self::UnknownFunctionRef {
                name,
                referenced_by,
            } => {
                write!(
                    f,
                    "function \"{name}\" referenced by {referenced_by} is not registered"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from populating the function registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry with the same name is already registered. Names are
    /// case-sensitive and never shadowed.
    NameConflict { name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameConflict { name } => {
                write!(f, "function \"{name}\" is already registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors from the state persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed.
    Backend { message: String },
    /// An execution record could not be serialized or deserialized.
    Serialization { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { message } => write!(f, "state store backend error: {message}"),
            Self::Serialization { message } => {
                write!(f, "state serialization error: {message}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from engine lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No execution with the given id is tracked by this engine.
    ExecutionNotFound { execution_id: ExecutionId },
    /// The requested operation is not valid in the execution's current state.
    InvalidTransition {
        execution_id: ExecutionId,
        from: ExecutionStatus,
        operation: &'static str,
    },
    /// Configuration validation failure.
    Config(ConfigError),
    /// Persistence failure.
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::InvalidTransition {
                execution_id,
                from,
                operation,
            } => {
                write!(
                    f,
                    "cannot {operation} execution {execution_id} in state {from}"
                )
            }
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
