//! Petgraph-backed lookup structure for a validated configuration.
//!
//! The configuration's node/edge vectors are the source of truth; this
//! graph is derived at engine construction for O(1) node lookup and
//! outgoing-edge traversal. Cycles are legal: loops in a workflow simply
//! re-visit nodes, accumulating attempts.

use crate::definition::{Edge, Node, WorkflowConfig};
use crate::error::ConfigError;
use amber_relay_core::NodeId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// A workflow graph using petgraph's directed graph.
#[derive(Debug)]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Builds the graph from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate node ids or edges referencing unknown
    /// nodes. [`WorkflowConfig::validate`] reports the same violations; the
    /// checks here keep the graph sound even if validation was skipped.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, ConfigError> {
        let mut graph = DiGraph::new();
        let mut node_index_map = HashMap::new();

        for node in &config.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(ConfigError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
            let index = graph.add_node(node.clone());
            node_index_map.insert(node.id.clone(), index);
        }

        for edge in &config.edges {
            let source = node_index_map.get(&edge.source).ok_or_else(|| {
                ConfigError::UnknownEdgeEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                }
            })?;
            let target = node_index_map.get(&edge.target).ok_or_else(|| {
                ConfigError::UnknownEdgeEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                }
            })?;
            graph.add_edge(*source, *target, edge.clone());
        }

        Ok(Self {
            graph,
            node_index_map,
        })
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the outgoing edges of a node in declaration order.
    ///
    /// Routing semantics depend on configuration order, and
    /// `edges_directed` walks petgraph's adjacency list most-recently-added
    /// first, so the collected edges are reversed.
    #[must_use]
    pub fn outgoing_edges(&self, node_id: &NodeId) -> Vec<&Edge> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        let mut edges: Vec<&Edge> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| e.weight())
            .collect();
        edges.reverse();
        edges
    }
}
