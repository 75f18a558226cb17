//! Node executor.
//!
//! Executes one node's work against the current execution state. The
//! signature is infallible: failures are encoded into the returned state
//! (node marked failed, failure history entry, execution status `failed`
//! with attached error) so the engine's step loop can treat every outcome
//! uniformly.

use crate::definition::{Node, NodeKind};
use crate::execution::{ErrorCode, ErrorInfo, Execution, HistoryEntry};
use crate::http::{HttpAction, HttpActionClient};
use crate::registry::{FunctionDefinition, FunctionParams, FunctionRegistry};
use crate::template;
use amber_relay_scheduler::Scheduler;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Executes one node at a time against an execution's state.
#[derive(Debug)]
pub struct NodeExecutor {
    registry: Arc<FunctionRegistry>,
    scheduler: Arc<Scheduler>,
    http: HttpActionClient,
}

impl NodeExecutor {
    /// Creates an executor over the given registry and scheduler.
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            registry,
            scheduler,
            http: HttpActionClient::new(),
        }
    }

    /// Executes `node` against `state`, returning the next state.
    ///
    /// Marks the node running (stamping a start time and incrementing its
    /// attempts counter), dispatches on the node kind, then records either
    /// a success history entry with before/after context snapshots or a
    /// failure entry plus a failed execution status.
    pub async fn execute(&self, node: &Node, mut state: Execution) -> Execution {
        let input_context = state.context_data.clone();
        state.node_state_mut(&node.id).begin();

        match self.dispatch(node, state.clone()).await {
            Ok(mut next) => {
                let duration_ms = {
                    let node_state = next.node_state_mut(&node.id);
                    node_state.complete();
                    node_state.duration_ms().unwrap_or(0)
                };
                next.history.push(HistoryEntry::success(
                    node.id.clone(),
                    node.label.clone(),
                    duration_ms,
                    input_context,
                    next.context_data.clone(),
                ));
                next
            }
            Err(error) => {
                let error = error.with_node(node.id.clone());
                tracing::error!(
                    node_id = %node.id,
                    code = ?error.code,
                    "node execution failed: {}",
                    error.message
                );
                let duration_ms = {
                    let node_state = state.node_state_mut(&node.id);
                    node_state.fail(error.clone());
                    node_state.duration_ms().unwrap_or(0)
                };
                state.history.push(HistoryEntry::failure(
                    node.id.clone(),
                    node.label.clone(),
                    duration_ms,
                    input_context,
                    error.message.clone(),
                ));
                state.fail(error);
                state
            }
        }
    }

    async fn dispatch(&self, node: &Node, state: Execution) -> Result<Execution, ErrorInfo> {
        match node.kind {
            // Pass-through control points. Decision nodes carry no logic of
            // their own; routing happens on their outgoing edges.
            NodeKind::Start | NodeKind::End | NodeKind::Decision => Ok(state),
            NodeKind::Wait => {
                let duration = Duration::from_millis(node.config.wait_ms.unwrap_or(0));
                self.scheduler.wait(duration).await;
                Ok(state)
            }
            NodeKind::Action => self.execute_action(node, state).await,
            NodeKind::Parallel | NodeKind::Merge => Err(ErrorInfo::new(
                ErrorCode::UnsupportedNodeType,
                format!("node kind {:?} is not executable", node.kind),
            )),
        }
    }

    async fn execute_action(&self, node: &Node, state: Execution) -> Result<Execution, ErrorInfo> {
        let params = node.config.params.clone();

        if let Some(action) = &node.config.http {
            return self.execute_http(action, state, params.as_ref()).await;
        }

        let Some(name) = node.config.function_ref.as_deref() else {
            return Err(ErrorInfo::new(
                ErrorCode::NodeExecutionFailed,
                format!(
                    "action node {} has neither a function reference nor an http action",
                    node.id
                ),
            ));
        };

        match self.registry.definition(name) {
            None => Err(ErrorInfo::new(
                ErrorCode::NodeExecutionFailed,
                format!("function \"{name}\" is not registered"),
            )),
            Some(FunctionDefinition::Node(function)) => function(state, params)
                .await
                .map_err(|e| ErrorInfo::new(ErrorCode::NodeExecutionFailed, e.to_string())),
            Some(FunctionDefinition::Http(action)) => {
                let action = action.clone();
                self.execute_http(&action, state, params.as_ref()).await
            }
            Some(FunctionDefinition::Edge(_)) => Err(ErrorInfo::new(
                ErrorCode::NodeExecutionFailed,
                format!("\"{name}\" is an edge condition, not a node function"),
            )),
        }
    }

    /// Performs an HTTP action for a node: a non-2xx status or transport
    /// failure is a hard failure; a 2xx JSON object body is merged
    /// shallowly into the context payload.
    async fn execute_http(
        &self,
        action: &HttpAction,
        mut state: Execution,
        params: Option<&FunctionParams>,
    ) -> Result<Execution, ErrorInfo> {
        let scope = template::scope_for(&state, params);
        let response = self
            .http
            .send(action, &scope)
            .await
            .map_err(|e| ErrorInfo::new(ErrorCode::HttpRequestFailed, e.to_string()))?;

        if !response.is_success() {
            return Err(ErrorInfo::new(
                ErrorCode::HttpRequestFailed,
                format!(
                    "request to {} returned status {}",
                    action.url, response.status
                ),
            ));
        }

        if let JsonValue::Object(fields) = response.body {
            match &mut state.context_data {
                JsonValue::Object(context) => {
                    for (key, value) in fields {
                        context.insert(key, value);
                    }
                }
                other => *other = JsonValue::Object(fields),
            }
        }

        Ok(state)
    }
}
