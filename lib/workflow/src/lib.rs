//! Graph-based workflow execution engine for the amber-relay platform.
//!
//! This crate interprets a declarative node/edge configuration, drives
//! executions through nodes via pluggable functions, evaluates conditional
//! routing between nodes, and maintains resumable, inspectable execution
//! state. It provides:
//!
//! - **Configuration Model**: nodes, edges, conditions, and settings with
//!   structural validation
//! - **Function Registry**: named extension points supplying node and edge
//!   behavior, populated before any execution starts
//! - **Node Executor**: per-node-kind execution with attempt tracking and
//!   history recording
//! - **Edge Router**: declaration-ordered condition evaluation with
//!   short-circuit, fallback, and default semantics
//! - **HTTP Actions**: templated outbound requests usable as node actions
//!   or edge conditions
//! - **State Manager**: persistence of execution records over a narrow
//!   key-value contract
//! - **Workflow Engine**: the step loop, lifecycle operations, and
//!   state-change subscriptions

pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod http;
pub mod registry;
pub mod router;
pub mod store;
pub mod template;

pub use definition::{
    BackoffStrategy, Edge, EdgeCondition, ErrorHandling, Node, NodeKind, NodeSettings,
    RetryPolicy, WorkflowConfig, WorkflowSettings,
};
pub use engine::{SubscriberId, WorkflowEngine};
pub use error::{ConfigError, EngineError, RegistryError, StoreError};
pub use execution::{
    ErrorCode, ErrorInfo, Execution, ExecutionStatus, HistoryEntry, HistoryOutcome, NodeRunState,
    NodeRunStatus,
};
pub use executor::NodeExecutor;
pub use graph::WorkflowGraph;
pub use http::{HttpAction, HttpActionClient, HttpActionError, HttpActionResponse, HttpAuth, HttpMethod};
pub use registry::{
    EdgeFn, FunctionDefinition, FunctionError, FunctionKind, FunctionParams, FunctionRegistry,
    NodeFn, RegistryEntry,
};
pub use router::EdgeRouter;
pub use store::{MemoryStateStore, StateManager, StateStore};
