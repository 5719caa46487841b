//! Dependency analysis for the routing graph
//!
//! This module turns a [`SignalGraph`] into a petgraph `DiGraph` to determine
//! signal-flow order (sources before sinks). A routing loop is an error,
//! never a feedback path.

use crate::error::GraphError;
use crate::signal_graph::{NodeId, SignalGraph};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

/// Represents the routing dependency graph
///
/// # Graph Structure
/// - Nodes: every node of the signal graph
/// - Edges: signal flow, source → destination (audio and modulation alike)
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
}

impl DependencyGraph {
    /// Build the dependency graph from a signal graph description
    ///
    /// # Errors
    /// - If a connection references a node that was never added
    pub fn build(signal: &SignalGraph) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for id in signal.node_ids() {
            let idx = graph.add_node(id.clone());
            node_map.insert(id.clone(), idx);
        }

        for conn in signal.connections() {
            let from = *node_map
                .get(&conn.from)
                .ok_or_else(|| GraphError::UnknownNode(conn.from.0.clone()))?;
            let to = *node_map
                .get(&conn.to)
                .ok_or_else(|| GraphError::UnknownNode(conn.to.0.clone()))?;
            graph.add_edge(from, to, ());
        }

        Ok(Self { graph })
    }

    /// Topologically sorted order: every node comes after everything that
    /// feeds it.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        toposort(&self.graph, None)
            .map(|order| order.iter().map(|&idx| self.graph[idx].clone()).collect())
            .map_err(|_cycle| GraphError::Cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_graph::NodeSpec;

    fn gain() -> NodeSpec {
        NodeSpec::Gain { volume_db: 0.0 }
    }

    fn position(order: &[NodeId], name: &str) -> usize {
        order.iter().position(|n| n.as_str() == name).unwrap()
    }

    /// a → c → e, b → d → e
    fn two_chains() -> SignalGraph {
        let mut graph = SignalGraph::new();
        for name in ["e", "d", "c", "b", "a"] {
            graph.add_node(NodeId::new(name), gain()).unwrap();
        }
        for (from, to) in [("a", "c"), ("c", "e"), ("b", "d"), ("d", "e")] {
            graph.connect(&NodeId::new(from), &NodeId::new(to)).unwrap();
        }
        graph
    }

    #[test]
    fn test_execution_order_respects_edges() {
        let deps = DependencyGraph::build(&two_chains()).unwrap();
        let order = deps.execution_order().unwrap();
        assert_eq!(order.len(), 5);
        assert!(position(&order, "a") < position(&order, "c"));
        assert!(position(&order, "c") < position(&order, "e"));
        assert!(position(&order, "b") < position(&order, "d"));
        assert!(position(&order, "d") < position(&order, "e"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = SignalGraph::new();
        for name in ["x", "y", "z"] {
            graph.add_node(NodeId::new(name), gain()).unwrap();
        }
        for (from, to) in [("x", "y"), ("y", "z"), ("z", "x")] {
            graph.connect(&NodeId::new(from), &NodeId::new(to)).unwrap();
        }
        let deps = DependencyGraph::build(&graph).unwrap();
        assert_eq!(deps.execution_order(), Err(GraphError::Cycle));
    }
}
