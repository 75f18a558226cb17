//! Strongly-typed ID types for workflow entities.
//!
//! Two families of identifiers exist:
//!
//! - Generated identifiers (`ExecutionId`) use ULID (Universally Unique
//!   Lexicographically Sortable Identifier) format, providing both
//!   uniqueness under concurrent creation and temporal ordering.
//! - Configuration-authored identifiers (`WorkflowId`, `NodeId`, `EdgeId`)
//!   wrap the strings supplied by a workflow configuration. They carry no
//!   format requirements beyond being non-empty by convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing a generated ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Try with prefix first
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = if let Some(stripped) = s.strip_prefix(prefix_with_underscore) {
                    stripped
                } else {
                    // Try parsing as raw ULID
                    s
                };

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Macro to generate a strongly-typed wrapper around a configuration-authored
/// string identifier.
macro_rules! define_config_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from the given string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    ExecutionId,
    "exec"
);

define_config_id!(
    /// Identifier of a workflow configuration.
    WorkflowId
);

define_config_id!(
    /// Identifier of a node within a workflow configuration.
    NodeId
);

define_config_id!(
    /// Identifier of an edge within a workflow configuration.
    EdgeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_display_format() {
        let id = ExecutionId::new();
        let display = id.to_string();
        assert!(display.starts_with("exec_"));
    }

    #[test]
    fn execution_id_parse_with_prefix() {
        let id = ExecutionId::new();
        let display = id.to_string();
        let parsed: ExecutionId = display.parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn execution_id_parse_without_prefix() {
        let ulid = Ulid::new();
        let id: ExecutionId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn execution_id_parse_invalid_ulid() {
        let result: Result<ExecutionId, _> = "not_a_ulid".parse();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "ExecutionId");
    }

    #[test]
    fn execution_ids_are_unique() {
        use std::collections::HashSet;

        let ids: HashSet<ExecutionId> = (0..64).map(|_| ExecutionId::new()).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn node_id_display_is_raw() {
        let id = NodeId::new("start-1");
        assert_eq!(id.to_string(), "start-1");
        assert_eq!(id.as_str(), "start-1");
    }

    #[test]
    fn config_id_equality() {
        let a = NodeId::new("n1");
        let b = NodeId::from("n1");
        assert_eq!(a, b);
    }

    #[test]
    fn config_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(WorkflowId::new("wf-a"));
        set.insert(WorkflowId::new("wf-b"));
        set.insert(WorkflowId::new("wf-a")); // duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn config_id_serde_is_transparent() {
        let id = NodeId::new("decision-2");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"decision-2\"");
        let parsed: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }

    #[test]
    fn execution_id_serde_roundtrip() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: ExecutionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
