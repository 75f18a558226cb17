//! Edge router.
//!
//! Given a completed node, picks the next node id by evaluating the
//! outgoing edges' conditions in declaration order:
//!
//! 1. Conditional edges are evaluated strictly in declaration order; the
//!    first satisfied edge wins and later ones are not evaluated.
//! 2. The first `fallback_target` seen while scanning is the designated
//!    "else" target, used when no condition is satisfied.
//! 3. With no satisfied condition and no fallback, the first
//!    unconditioned edge (if any) is the default transition.
//! 4. Otherwise the branch ends.
//!
//! Condition failures (unknown function, function error, HTTP transport
//! failure) are logged and treated as "not satisfied" — the asymmetry with
//! node actions, which hard-fail on the same errors, is intentional.

use crate::definition::{Edge, EdgeCondition};
use crate::execution::Execution;
use crate::graph::WorkflowGraph;
use crate::http::{HttpAction, HttpActionClient};
use crate::registry::{FunctionDefinition, FunctionParams, FunctionRegistry};
use crate::template;
use amber_relay_core::NodeId;
use std::sync::Arc;

/// Evaluates conditional routing between nodes.
#[derive(Debug)]
pub struct EdgeRouter {
    graph: Arc<WorkflowGraph>,
    registry: Arc<FunctionRegistry>,
    http: HttpActionClient,
}

impl EdgeRouter {
    /// Creates a router over the given graph and registry.
    #[must_use]
    pub fn new(graph: Arc<WorkflowGraph>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            graph,
            registry,
            http: HttpActionClient::new(),
        }
    }

    /// Picks the next node after `current`, or `None` if the branch ends.
    pub async fn next_node(&self, current: &NodeId, state: &Execution) -> Option<NodeId> {
        let outgoing = self.graph.outgoing_edges(current);
        if outgoing.is_empty() {
            return None;
        }

        let mut fallback: Option<&NodeId> = None;
        let mut default_edge: Option<&Edge> = None;

        for &edge in &outgoing {
            let Some(condition) = &edge.condition else {
                if default_edge.is_none() {
                    default_edge = Some(edge);
                }
                continue;
            };

            // The first declared fallback is the designated "else" target,
            // regardless of which edge it is attached to.
            if fallback.is_none()
                && let Some(target) = &condition.fallback_target
            {
                fallback = Some(target);
            }

            if self.evaluate(edge, condition, state).await {
                return Some(edge.target.clone());
            }
        }

        if let Some(target) = fallback {
            return Some(target.clone());
        }
        if let Some(edge) = default_edge {
            return Some(edge.target.clone());
        }
        None
    }

    /// Evaluates one edge condition. Never escalates: every failure mode
    /// is logged and reported as "not satisfied".
    async fn evaluate(&self, edge: &Edge, condition: &EdgeCondition, state: &Execution) -> bool {
        if let Some(action) = &condition.http {
            return self
                .evaluate_http(edge, action, state, condition.params.as_ref())
                .await;
        }

        let Some(name) = condition.function_ref.as_deref() else {
            return false;
        };

        match self.registry.definition(name) {
            None => {
                tracing::warn!(
                    edge_id = %edge.id,
                    function = name,
                    "edge condition function is not registered; treating as not satisfied"
                );
                false
            }
            Some(FunctionDefinition::Edge(function)) => {
                match function(state.clone(), condition.params.clone()).await {
                    Ok(Some(value)) => !value.is_null(),
                    Ok(None) => false,
                    Err(error) => {
                        tracing::warn!(
                            edge_id = %edge.id,
                            function = name,
                            error = %error,
                            "edge condition failed; treating as not satisfied"
                        );
                        false
                    }
                }
            }
            Some(FunctionDefinition::Http(action)) => {
                let action = action.clone();
                self.evaluate_http(edge, &action, state, condition.params.as_ref())
                    .await
            }
            Some(FunctionDefinition::Node(_)) => {
                tracing::warn!(
                    edge_id = %edge.id,
                    function = name,
                    "\"{name}\" is a node function, not an edge condition; treating as not satisfied"
                );
                false
            }
        }
    }

    /// An HTTP-backed condition is satisfied iff the response is 2xx.
    /// Transport failures are caught and treated as not satisfied.
    async fn evaluate_http(
        &self,
        edge: &Edge,
        action: &HttpAction,
        state: &Execution,
        params: Option<&FunctionParams>,
    ) -> bool {
        let scope = template::scope_for(state, params);
        match self.http.send(action, &scope).await {
            Ok(response) => response.is_success(),
            Err(error) => {
                tracing::warn!(
                    edge_id = %edge.id,
                    error = %error,
                    "edge condition request failed; treating as not satisfied"
                );
                false
            }
        }
    }
}
