//! Workflow configuration model.
//!
//! A configuration is the declarative description the engine interprets:
//! an ordered sequence of nodes, an ordered sequence of edges, optional
//! initial variables, and optional workflow-level settings. Configurations
//! arrive already parsed (loading and transport are the embedding
//! application's concern) and are validated before an engine is built
//! around them.

use crate::error::ConfigError;
use crate::http::HttpAction;
use crate::registry::FunctionRegistry;
use amber_relay_core::{EdgeId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

/// The kind of a workflow node, which determines its execution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point of the workflow. Exactly one per configuration.
    Start,
    /// Terminal node; reaching it completes the execution.
    End,
    /// Invokes a registered function or an inline HTTP action.
    Action,
    /// Suspends the execution for a configured duration.
    Wait,
    /// Pass-through control point; routing happens on its outgoing edges.
    Decision,
    /// Declared for forward compatibility; not yet executable.
    Parallel,
    /// Declared for forward compatibility; not yet executable.
    Merge,
}

/// Backoff strategy of a declared retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// Per-node retry policy.
///
/// Declared on node configurations and carried through serialization; no
/// engine component currently consults it. A failed node terminates its
/// execution regardless of this policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// How delays between attempts grow.
    pub backoff: BackoffStrategy,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// Node-specific configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Name of a registered function to invoke (`action` nodes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_ref: Option<String>,
    /// Parameters passed to the function or HTTP action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, JsonValue>>,
    /// Suspension duration for `wait` nodes, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
    /// Inline HTTP action (`action` nodes, alternative to `function_ref`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpAction>,
    /// Declared retry policy; currently inert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

/// A unit of work or control point in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the configuration.
    pub id: NodeId,
    /// Determines execution behavior.
    pub kind: NodeKind,
    /// Human-readable label, recorded on history entries.
    pub label: String,
    /// Node-specific configuration.
    #[serde(default)]
    pub config: NodeSettings,
}

impl Node {
    /// Creates a node with default (empty) settings.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            config: NodeSettings::default(),
        }
    }

    /// Sets the node configuration.
    #[must_use]
    pub fn with_config(mut self, config: NodeSettings) -> Self {
        self.config = config;
        self
    }

    /// Sets a function reference on the node configuration.
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.config.function_ref = Some(name.into());
        self
    }

    /// Sets the wait duration on the node configuration.
    #[must_use]
    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.config.wait_ms = Some(wait_ms);
        self
    }

    /// Sets an inline HTTP action on the node configuration.
    #[must_use]
    pub fn with_http(mut self, action: HttpAction) -> Self {
        self.config.http = Some(action);
        self
    }

    /// Sets function/action parameters on the node configuration.
    #[must_use]
    pub fn with_params(mut self, params: Map<String, JsonValue>) -> Self {
        self.config.params = Some(params);
        self
    }
}

/// A predicate attached to an edge.
///
/// Carries either a function reference or an inline HTTP action, optional
/// parameters, and an optional fallback target used when no condition on
/// the source node's outgoing edges is satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeCondition {
    /// Name of a registered edge-condition function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_ref: Option<String>,
    /// Inline HTTP action; satisfied iff the response status is 2xx.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpAction>,
    /// Parameters passed to the function or HTTP action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, JsonValue>>,
    /// Designated "else" target when no condition is satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_target: Option<NodeId>,
}

impl EdgeCondition {
    /// Creates a condition backed by a registered function.
    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function_ref: Some(name.into()),
            ..Self::default()
        }
    }

    /// Creates a condition backed by an inline HTTP action.
    #[must_use]
    pub fn http(action: HttpAction) -> Self {
        Self {
            http: Some(action),
            ..Self::default()
        }
    }

    /// Sets the fallback target.
    #[must_use]
    pub fn with_fallback(mut self, target: impl Into<NodeId>) -> Self {
        self.fallback_target = Some(target.into());
        self
    }

    /// Sets condition parameters.
    #[must_use]
    pub fn with_params(mut self, params: Map<String, JsonValue>) -> Self {
        self.params = Some(params);
        self
    }
}

/// A directed transition between nodes, optionally guarded by a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier within the configuration.
    pub id: EdgeId,
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Optional guard; unconditioned edges are default transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    /// Creates an unconditioned edge.
    #[must_use]
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Attaches a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Returns true if this edge carries a condition.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// Error-handling mode declared in workflow settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    Stop,
    Continue,
    Skip,
}

/// Workflow-level settings.
///
/// Declared and carried through serialization; no engine component
/// currently consults these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
}

/// A complete workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Identifier of this workflow.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this workflow does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version of this configuration.
    pub version: String,
    /// Nodes, in declaration order.
    pub nodes: Vec<Node>,
    /// Edges, in declaration order. Order is significant for routing.
    pub edges: Vec<Edge>,
    /// Initial contents of the execution variable map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_variables: Option<Map<String, JsonValue>>,
    /// Workflow-level settings; currently inert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<WorkflowSettings>,
}

impl WorkflowConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new(
        id: impl Into<WorkflowId>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: version.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            initial_variables: None,
            settings: None,
        }
    }

    /// Returns the node with the given id, if any.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == node_id)
    }

    /// Returns the start node, if any. Validation guarantees exactly one.
    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// Validates the structure of the configuration.
    ///
    /// Checks:
    /// - node ids are unique
    /// - exactly one node of kind `start` exists
    /// - every edge's source and target reference an existing node
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                return Err(ConfigError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
        }

        let start_count = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        match start_count {
            0 => return Err(ConfigError::NoStartNode),
            1 => {}
            count => return Err(ConfigError::MultipleStartNodes { count }),
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint) {
                    return Err(ConfigError::UnknownEdgeEndpoint {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validates that every function reference resolves in the registry.
    ///
    /// Run after [`validate`](Self::validate), before any execution starts,
    /// so unknown names fail fast instead of at first use.
    ///
    /// # Errors
    ///
    /// Returns the first unresolved reference found.
    pub fn validate_references(&self, registry: &FunctionRegistry) -> Result<(), ConfigError> {
        for node in &self.nodes {
            if let Some(name) = node.config.function_ref.as_deref()
                && !registry.contains(name)
            {
                return Err(ConfigError::UnknownFunctionRef {
                    name: name.to_string(),
                    referenced_by: format!("node {}", node.id),
                });
            }
        }

        for edge in &self.edges {
            if let Some(condition) = &edge.condition
                && let Some(name) = condition.function_ref.as_deref()
                && !registry.contains(name)
            {
                return Err(ConfigError::UnknownFunctionRef {
                    name: name.to_string(),
                    referenced_by: format!("edge {}", edge.id),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryEntry;

    fn minimal_config() -> WorkflowConfig {
        let mut config = WorkflowConfig::new("wf-1", "Test", "1.0.0");
        config.nodes = vec![
            Node::new("start-1", NodeKind::Start, "Start"),
            Node::new("end-1", NodeKind::End, "End"),
        ];
        config.edges = vec![Edge::new("e1", "start-1", "end-1")];
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let mut config = minimal_config();
        config.nodes.remove(0);
        config.edges.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoStartNode));
    }

    #[test]
    fn multiple_start_nodes_are_rejected() {
        let mut config = minimal_config();
        config
            .nodes
            .push(Node::new("start-2", NodeKind::Start, "Another Start"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::MultipleStartNodes { count: 2 })
        );
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut config = minimal_config();
        config
            .nodes
            .push(Node::new("end-1", NodeKind::Action, "Dup"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateNodeId {
                node_id: NodeId::new("end-1"),
            })
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut config = minimal_config();
        config.edges.push(Edge::new("e2", "start-1", "nowhere"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownEdgeEndpoint {
                edge_id: EdgeId::new("e2"),
                node_id: NodeId::new("nowhere"),
            })
        );
    }

    #[test]
    fn unknown_node_function_ref_is_rejected() {
        let mut config = minimal_config();
        config.nodes.push(
            Node::new("act-1", NodeKind::Action, "Send").with_function("send_email"),
        );
        config.edges.push(Edge::new("e2", "start-1", "act-1"));

        let registry = FunctionRegistry::new();
        let err = config.validate_references(&registry).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownFunctionRef { ref name, .. } if name == "send_email"
        ));
    }

    #[test]
    fn known_function_refs_pass() {
        let mut config = minimal_config();
        config.nodes.push(
            Node::new("act-1", NodeKind::Action, "Send").with_function("send_email"),
        );
        config.edges.push(
            Edge::new("e2", "start-1", "act-1")
                .with_condition(EdgeCondition::function("has_email")),
        );

        let mut registry = FunctionRegistry::new();
        registry
            .register(RegistryEntry::node("send_email", "Send", |state, _| async move {
                Ok(state)
            }))
            .expect("register node fn");
        registry
            .register(RegistryEntry::edge("has_email", "Check", |_, _| async {
                Ok(None)
            }))
            .expect("register edge fn");

        assert!(config.validate_references(&registry).is_ok());
    }

    #[test]
    fn node_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&NodeKind::Decision).expect("serialize");
        assert_eq!(json, "\"decision\"");
        let parsed: NodeKind = serde_json::from_str("\"wait\"").expect("deserialize");
        assert_eq!(parsed, NodeKind::Wait);
    }

    #[test]
    fn config_serde_roundtrip() {
        let mut config = minimal_config();
        config.nodes.push(
            Node::new("wait-1", NodeKind::Wait, "Cool down")
                .with_wait_ms(500)
                .with_params(Map::new()),
        );
        config.edges.push(
            Edge::new("e3", "start-1", "wait-1").with_condition(
                EdgeCondition::function("still_warm").with_fallback("end-1"),
            ),
        );
        config.settings = Some(WorkflowSettings {
            max_retries: Some(3),
            timeout_ms: Some(60_000),
            error_handling: Some(ErrorHandling::Stop),
        });

        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: WorkflowConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, parsed);
    }

    #[test]
    fn retry_policy_is_carried_but_declared_inert() {
        let node = Node::new("act-1", NodeKind::Action, "Send").with_config(NodeSettings {
            function_ref: Some("send_email".to_string()),
            retry: Some(RetryPolicy {
                max_attempts: 3,
                backoff: BackoffStrategy::Exponential,
                initial_delay_ms: 100,
                max_delay_ms: Some(5_000),
            }),
            ..NodeSettings::default()
        });

        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }
}
