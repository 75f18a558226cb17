//! Function registry: named extension points supplying node and edge
//! behavior.
//!
//! Before any execution starts, the embedding application registers every
//! function its configurations reference by name. A definition is either a
//! node function (produces the next execution state), an edge-condition
//! function (decides whether a transition is satisfied), or an HTTP-action
//! descriptor evaluated through the HTTP protocol.
//!
//! Registration is a build-time phase: the registry is fully populated and
//! handed to the engine's constructor, which validates every reference in
//! the configuration against it.

use crate::error::RegistryError;
use crate::execution::Execution;
use crate::http::HttpAction;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Parameters passed to node and edge functions.
pub type FunctionParams = Map<String, JsonValue>;

/// Error returned by a registered node or edge function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionError {
    message: String,
}

impl FunctionError {
    /// Creates a function error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FunctionError {}

/// Boxed async node function.
///
/// Receives the execution state and the node's parameters; returns the next
/// state. An error fails the node and terminates the execution.
pub type NodeFn = Arc<
    dyn Fn(Execution, Option<FunctionParams>) -> BoxFuture<'static, Result<Execution, FunctionError>>
        + Send
        + Sync,
>;

/// Boxed async edge-condition function.
///
/// Satisfied iff it resolves to `Some` non-null value. Errors are caught at
/// the router boundary and treated as "not satisfied".
pub type EdgeFn = Arc<
    dyn Fn(
            Execution,
            Option<FunctionParams>,
        ) -> BoxFuture<'static, Result<Option<JsonValue>, FunctionError>>
        + Send
        + Sync,
>;

/// What a registry entry supplies behavior for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Node behavior (invoked by `action` nodes).
    Node,
    /// Edge-condition behavior (invoked during routing).
    Edge,
}

/// The polymorphic definition behind a registered name.
#[derive(Clone)]
pub enum FunctionDefinition {
    /// A node function.
    Node(NodeFn),
    /// An edge-condition function.
    Edge(EdgeFn),
    /// An HTTP-action descriptor, evaluated through the HTTP protocol.
    Http(HttpAction),
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(_) => f.write_str("FunctionDefinition::Node"),
            Self::Edge(_) => f.write_str("FunctionDefinition::Edge"),
            Self::Http(action) => write!(f, "FunctionDefinition::Http({})", action.url),
        }
    }
}

/// A named, typed extension point.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Unique name referenced from configurations.
    pub name: String,
    /// Whether this entry supplies node or edge behavior.
    pub kind: FunctionKind,
    /// Human-readable description.
    pub description: String,
    /// The definition itself.
    pub definition: FunctionDefinition,
}

impl RegistryEntry {
    /// Creates a node-function entry from an async closure.
    pub fn node<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        function: F,
    ) -> Self
    where
        F: Fn(Execution, Option<FunctionParams>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Execution, FunctionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: FunctionKind::Node,
            description: description.into(),
            definition: FunctionDefinition::Node(Arc::new(move |state, params| {
                Box::pin(function(state, params))
            })),
        }
    }

    /// Creates an edge-condition entry from an async closure.
    pub fn edge<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        function: F,
    ) -> Self
    where
        F: Fn(Execution, Option<FunctionParams>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<JsonValue>, FunctionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: FunctionKind::Edge,
            description: description.into(),
            definition: FunctionDefinition::Edge(Arc::new(move |state, params| {
                Box::pin(function(state, params))
            })),
        }
    }

    /// Creates a node entry backed by an HTTP-action descriptor.
    #[must_use]
    pub fn http_node(
        name: impl Into<String>,
        description: impl Into<String>,
        action: HttpAction,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::Node,
            description: description.into(),
            definition: FunctionDefinition::Http(action),
        }
    }

    /// Creates an edge-condition entry backed by an HTTP-action descriptor.
    #[must_use]
    pub fn http_edge(
        name: impl Into<String>,
        description: impl Into<String>,
        action: HttpAction,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::Edge,
            description: description.into(),
            definition: FunctionDefinition::Http(action),
        }
    }
}

/// Name → definition lookup for node functions, edge conditions, and
/// HTTP-action descriptors. Names are unique, case-sensitive, and never
/// shadowed.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NameConflict`] if the name is already taken.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<(), RegistryError> {
        if self.entries.contains_key(&entry.name) {
            return Err(RegistryError::NameConflict {
                name: entry.name.clone(),
            });
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Returns the definition behind a name, if registered.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&FunctionDefinition> {
        self.entries.get(name).map(|entry| &entry.definition)
    }

    /// Returns the full entry behind a name, if registered.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// Returns true if a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterates over all registered entries.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpAction, HttpMethod};
    use amber_relay_core::WorkflowId;
    use serde_json::json;

    fn sample_execution() -> Execution {
        Execution::new(WorkflowId::new("wf-1"), json!({}), Map::new())
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(RegistryEntry::node(
                "send_email",
                "Send an email to the lead",
                |state, _| async move { Ok(state) },
            ))
            .expect("register");

        assert!(registry.contains("send_email"));
        assert!(matches!(
            registry.definition("send_email"),
            Some(FunctionDefinition::Node(_))
        ));
        assert_eq!(
            registry.entry("send_email").map(|e| e.kind),
            Some(FunctionKind::Node)
        );
        assert!(registry.definition("unknown").is_none());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(RegistryEntry::edge("check", "first", |_, _| async {
                Ok(None)
            }))
            .expect("first registration");

        let err = registry
            .register(RegistryEntry::edge("check", "second", |_, _| async {
                Ok(None)
            }))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::NameConflict {
                name: "check".to_string(),
            }
        );
        // The original entry is untouched.
        assert_eq!(registry.entry("check").map(|e| e.description.as_str()), Some("first"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(RegistryEntry::edge("check", "lower", |_, _| async {
                Ok(None)
            }))
            .expect("register");

        assert!(registry.contains("check"));
        assert!(!registry.contains("Check"));
    }

    #[test]
    fn http_entry_carries_the_descriptor() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(RegistryEntry::http_edge(
                "email_replied",
                "Check reply status",
                HttpAction::new(HttpMethod::Get, "https://api.example.com/email-status"),
            ))
            .expect("register");

        match registry.definition("email_replied") {
            Some(FunctionDefinition::Http(action)) => {
                assert_eq!(action.method, HttpMethod::Get);
            }
            other => panic!("expected http definition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn node_function_is_invocable() {
        let entry = RegistryEntry::node("tag", "Tag the payload", |mut state, params| async move {
            let tag = params
                .as_ref()
                .and_then(|p| p.get("tag"))
                .cloned()
                .unwrap_or(JsonValue::Null);
            state.variables.insert("tag".to_string(), tag);
            Ok(state)
        });

        let FunctionDefinition::Node(function) = &entry.definition else {
            panic!("expected node definition");
        };

        let mut params = Map::new();
        params.insert("tag".to_string(), json!("warm"));
        let state = function(sample_execution(), Some(params))
            .await
            .expect("function succeeds");
        assert_eq!(state.variables.get("tag"), Some(&json!("warm")));
    }

    #[tokio::test]
    async fn edge_function_reports_satisfaction() {
        let entry = RegistryEntry::edge("always", "Always satisfied", |_, _| async {
            Ok(Some(json!("matched")))
        });

        let FunctionDefinition::Edge(function) = &entry.definition else {
            panic!("expected edge definition");
        };

        let result = function(sample_execution(), None).await.expect("evaluates");
        assert_eq!(result, Some(json!("matched")));
    }
}
