//! Runtime execution state.
//!
//! An [`Execution`] is one run of a workflow configuration. It tracks:
//! - the workflow-level status state machine
//! - per-node execution state (created lazily on first visit)
//! - an append-only history of node visits
//! - the opaque context payload and the execution-scoped variable map
//!
//! All of it is JSON-serializable; the persisted record is exactly this
//! structure.

use amber_relay_core::{ExecutionId, NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;

/// The overall status of an execution.
///
/// Transitions are monotone through
/// `idle → running ⇄ paused → {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not started.
    Idle,
    /// Actively stepping through nodes.
    Running,
    /// Suspended between steps; resumable.
    Paused,
    /// All nodes ran, or a branch ended with no next node.
    Completed,
    /// A node failed; the execution terminated.
    Failed,
    /// Stopped by request.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while the execution can still make progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The execution status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    /// Created but never started.
    Pending,
    /// Currently executing.
    Running,
    /// Last visit completed successfully.
    Completed,
    /// Last visit failed.
    Failed,
    /// Skipped (branch not taken).
    Skipped,
}

/// Error detail attached to a failed execution or node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// The node the error originated from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    /// Creates an error with the current timestamp.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the originating node.
    #[must_use]
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }
}

/// Machine-readable error codes recorded on execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The configuration has no start node.
    NoStartNode,
    /// The current node id resolved to no node.
    NodeNotFound,
    /// A node function or action failed.
    NodeExecutionFailed,
    /// The node kind has no executor support.
    UnsupportedNodeType,
    /// An outbound HTTP action failed or returned a non-success status.
    HttpRequestFailed,
}

/// Per-node execution state, created lazily on a node's first visit.
///
/// `attempts` accumulates across re-visits; loops in the graph are legal
/// and each pass through a node increments the counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRunState {
    /// The node this state belongs to.
    pub node_id: NodeId,
    /// Current status.
    pub status: NodeRunStatus,
    /// Number of times this node has begun execution.
    pub attempts: u32,
    /// When the most recent visit started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent visit finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error detail from the most recent failed visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl NodeRunState {
    /// Creates a pending state for a node.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            status: NodeRunStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Marks the start of a visit: running, stamped, attempts incremented.
    pub fn begin(&mut self) {
        self.status = NodeRunStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.attempts += 1;
    }

    /// Marks the visit completed.
    pub fn complete(&mut self) {
        self.status = NodeRunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the visit failed.
    pub fn fail(&mut self, error: ErrorInfo) {
        self.status = NodeRunStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Duration of the most recent visit in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let start = self.started_at?;
        let end = self.finished_at?;
        u64::try_from((end - start).num_milliseconds()).ok()
    }
}

/// Outcome of a node visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Success,
    Failure,
}

/// Immutable record of one node visit, appended in visitation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// The visited node.
    pub node_id: NodeId,
    /// The node's label at visit time.
    pub action: String,
    /// Whether the visit succeeded.
    pub outcome: HistoryOutcome,
    /// How long the visit took, in milliseconds.
    pub duration_ms: u64,
    /// Context payload before the visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    /// Context payload after a successful visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    /// Failure detail for a failed visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HistoryEntry {
    /// Creates a success entry with input/output context snapshots.
    #[must_use]
    pub fn success(
        node_id: NodeId,
        action: impl Into<String>,
        duration_ms: u64,
        input: JsonValue,
        output: JsonValue,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id,
            action: action.into(),
            outcome: HistoryOutcome::Success,
            duration_ms,
            input: Some(input),
            output: Some(output),
            detail: None,
        }
    }

    /// Creates a failure entry with the input snapshot and failure detail.
    #[must_use]
    pub fn failure(
        node_id: NodeId,
        action: impl Into<String>,
        duration_ms: u64,
        input: JsonValue,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id,
            action: action.into(),
            outcome: HistoryOutcome::Failure,
            duration_ms,
            input: Some(input),
            output: None,
            detail: Some(detail.into()),
        }
    }
}

/// One runtime instance of a workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// The workflow this execution runs.
    pub workflow_id: WorkflowId,
    /// Unique id of this run.
    pub execution_id: ExecutionId,
    /// Workflow-level status.
    pub status: ExecutionStatus,
    /// The node the step loop will execute next. `None` once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    /// Opaque domain payload threaded through the execution.
    pub context_data: JsonValue,
    /// Per-node execution state, keyed by node id.
    pub node_states: HashMap<NodeId, NodeRunState>,
    /// Append-only record of node visits.
    pub history: Vec<HistoryEntry>,
    /// Free-form execution-scoped key/value storage.
    pub variables: Map<String, JsonValue>,
    /// When the execution was created.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error detail if the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Execution {
    /// Creates a fresh idle execution with a generated id.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        context_data: JsonValue,
        variables: Map<String, JsonValue>,
    ) -> Self {
        Self {
            workflow_id,
            execution_id: ExecutionId::new(),
            status: ExecutionStatus::Idle,
            current_node_id: None,
            context_data,
            node_states: HashMap::new(),
            history: Vec::new(),
            variables,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Returns the state for a node, if it has been visited.
    #[must_use]
    pub fn node_state(&self, node_id: &NodeId) -> Option<&NodeRunState> {
        self.node_states.get(node_id)
    }

    /// Returns the state for a node, creating it on first visit.
    pub fn node_state_mut(&mut self, node_id: &NodeId) -> &mut NodeRunState {
        self.node_states
            .entry(node_id.clone())
            .or_insert_with(|| NodeRunState::new(node_id.clone()))
    }

    /// Finalizes the execution as completed.
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.current_node_id = None;
    }

    /// Finalizes the execution as failed with the given error.
    pub fn fail(&mut self, error: ErrorInfo) {
        self.status = ExecutionStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.current_node_id = None;
        self.error = Some(error);
    }

    /// Finalizes the execution as cancelled.
    pub fn cancel(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self.current_node_id = None;
    }

    /// History entries for a specific node, in visitation order.
    pub fn history_for(&self, node_id: &NodeId) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().filter(move |e| &e.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_terminal() {
        assert!(!ExecutionStatus::Idle.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_active() {
        assert!(ExecutionStatus::Running.is_active());
        assert!(ExecutionStatus::Paused.is_active());
        assert!(!ExecutionStatus::Idle.is_active());
        assert!(!ExecutionStatus::Cancelled.is_active());
    }

    #[test]
    fn node_state_begin_increments_attempts() {
        let mut state = NodeRunState::new(NodeId::new("a"));
        assert_eq!(state.attempts, 0);

        state.begin();
        assert_eq!(state.status, NodeRunStatus::Running);
        assert_eq!(state.attempts, 1);
        assert!(state.started_at.is_some());

        state.complete();
        assert_eq!(state.status, NodeRunStatus::Completed);

        // Re-visit: attempts accumulate, never reset.
        state.begin();
        state.complete();
        assert_eq!(state.attempts, 2);
    }

    #[test]
    fn node_state_failure_records_error() {
        let mut state = NodeRunState::new(NodeId::new("a"));
        state.begin();
        state.fail(ErrorInfo::new(ErrorCode::NodeExecutionFailed, "boom"));

        assert_eq!(state.status, NodeRunStatus::Failed);
        assert!(state.finished_at.is_some());
        assert_eq!(
            state.error.as_ref().map(|e| e.code),
            Some(ErrorCode::NodeExecutionFailed)
        );
    }

    #[test]
    fn execution_lifecycle() {
        let mut execution = Execution::new(
            WorkflowId::new("wf-1"),
            json!({"lead": "ada"}),
            Map::new(),
        );

        assert_eq!(execution.status, ExecutionStatus::Idle);
        assert!(execution.current_node_id.is_none());
        assert!(execution.finished_at.is_none());

        execution.status = ExecutionStatus::Running;
        execution.current_node_id = Some(NodeId::new("start-1"));

        execution.complete();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.current_node_id.is_none());
        assert!(execution.finished_at.is_some());
    }

    #[test]
    fn failing_clears_current_node() {
        let mut execution = Execution::new(WorkflowId::new("wf-1"), json!({}), Map::new());
        execution.status = ExecutionStatus::Running;
        execution.current_node_id = Some(NodeId::new("a"));

        execution.fail(ErrorInfo::new(ErrorCode::NodeNotFound, "node a not found"));

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.current_node_id.is_none());
        assert_eq!(
            execution.error.as_ref().map(|e| e.code),
            Some(ErrorCode::NodeNotFound)
        );
    }

    #[test]
    fn node_state_created_lazily() {
        let mut execution = Execution::new(WorkflowId::new("wf-1"), json!({}), Map::new());
        let node_id = NodeId::new("a");

        assert!(execution.node_state(&node_id).is_none());
        execution.node_state_mut(&node_id).begin();
        assert_eq!(execution.node_state(&node_id).map(|s| s.attempts), Some(1));
    }

    #[test]
    fn history_for_filters_by_node() {
        let mut execution = Execution::new(WorkflowId::new("wf-1"), json!({}), Map::new());
        execution.history.push(HistoryEntry::success(
            NodeId::new("a"),
            "A",
            3,
            json!({}),
            json!({}),
        ));
        execution.history.push(HistoryEntry::failure(
            NodeId::new("b"),
            "B",
            1,
            json!({}),
            "boom",
        ));
        execution.history.push(HistoryEntry::success(
            NodeId::new("a"),
            "A",
            2,
            json!({}),
            json!({}),
        ));

        assert_eq!(execution.history_for(&NodeId::new("a")).count(), 2);
        assert_eq!(execution.history_for(&NodeId::new("b")).count(), 1);
    }

    #[test]
    fn execution_serde_roundtrip() {
        let mut execution = Execution::new(
            WorkflowId::new("wf-1"),
            json!({"email": "a@example.com"}),
            Map::new(),
        );
        execution.variables.insert("score".to_string(), json!(0.8));
        execution.node_state_mut(&NodeId::new("a")).begin();
        execution.history.push(HistoryEntry::success(
            NodeId::new("a"),
            "Classify",
            12,
            json!({}),
            json!({"category": "warm"}),
        ));

        let json = serde_json::to_string(&execution).expect("serialize");
        let parsed: Execution = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(execution, parsed);
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Cancelled).expect("serialize");
        assert_eq!(json, "\"cancelled\"");
    }
}
