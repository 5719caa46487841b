//! Signal graph description
//!
//! The routing graph is first described as plain data: named nodes, what
//! each node is, and which node feeds which. Nothing is handed to the audio
//! host until the whole description has been validated, so a broken graph
//! never leaves half-built nodes behind.

use crate::config::{Adsr, ChorusSettings, ReverbSettings};
use crate::dependency_graph::DependencyGraph;
use crate::error::GraphError;
use crate::recipe::{FilterKind, VoiceId, Wave};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for nodes in the signal graph
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        NodeId(name.into())
    }

    /// Node belonging to a voice chain, e.g. `bass.filter`.
    pub fn voice(voice: VoiceId, part: &str) -> Self {
        NodeId(format!("{}.{}", voice.name(), part))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How one node feeds another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Audio signal into the destination's input
    Audio,
    /// Control signal driving one of the destination's parameters
    Modulation,
}

/// Connection between nodes in the signal graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: ConnectionKind,
}

/// Types of nodes in the signal graph
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    /// Polyphonic oscillator voice with an amplitude envelope
    Synth {
        voice: VoiceId,
        wave: Wave,
        envelope: Adsr,
    },
    Filter {
        kind: FilterKind,
        cutoff: f64,
        q: f64,
    },
    /// Envelope sweeping a filter cutoff upward by `octaves`
    FilterEnvelope {
        base_cutoff: f64,
        octaves: f64,
        shape: Adsr,
    },
    /// Voice output level in dB
    Gain { volume_db: f64 },
    Reverb(ReverbSettings),
    Chorus(ChorusSettings),
    Delay {
        time_secs: f64,
        feedback: f64,
        wet: f64,
    },
    /// Sidechain gain stage; unity at rest
    Duck { depth: f64 },
    Master { volume_db: f64 },
}

impl NodeSpec {
    /// Short type name used in logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::Synth { .. } => "synth",
            NodeSpec::Filter { .. } => "filter",
            NodeSpec::FilterEnvelope { .. } => "filter_env",
            NodeSpec::Gain { .. } => "gain",
            NodeSpec::Reverb(_) => "reverb",
            NodeSpec::Chorus(_) => "chorus",
            NodeSpec::Delay { .. } => "delay",
            NodeSpec::Duck { .. } => "duck",
            NodeSpec::Master { .. } => "master",
        }
    }
}

/// Main signal graph structure
///
/// Nodes keep their insertion order so every traversal is deterministic.
#[derive(Debug, Clone, Default)]
pub struct SignalGraph {
    nodes: Vec<(NodeId, NodeSpec)>,
    index: HashMap<NodeId, usize>,
    connections: Vec<Connection>,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, id: NodeId, spec: NodeSpec) -> Result<NodeId, GraphError> {
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id.0));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push((id.clone(), spec));
        Ok(id)
    }

    /// Route audio from one node into another
    pub fn connect(&mut self, from: &NodeId, to: &NodeId) -> Result<(), GraphError> {
        self.add_connection(from, to, ConnectionKind::Audio)
    }

    /// Route a control signal into another node's parameter
    pub fn modulate(&mut self, from: &NodeId, to: &NodeId) -> Result<(), GraphError> {
        self.add_connection(from, to, ConnectionKind::Modulation)
    }

    fn add_connection(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        kind: ConnectionKind,
    ) -> Result<(), GraphError> {
        for id in [from, to] {
            if !self.index.contains_key(id) {
                return Err(GraphError::UnknownNode(id.0.clone()));
            }
        }
        self.connections.push(Connection {
            from: from.clone(),
            to: to.clone(),
            kind,
        });
        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.index.get(id).map(|&i| &self.nodes[i].1)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|(id, _)| id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Destinations fed by `id`
    pub fn outputs_of(&self, id: &NodeId) -> Vec<&NodeId> {
        self.connections
            .iter()
            .filter(|c| &c.from == id)
            .map(|c| &c.to)
            .collect()
    }

    /// Construction order: every destination exists before anything is
    /// connected into it, so the master comes first.
    pub fn build_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut order = DependencyGraph::build(self)?.execution_order()?;
        order.reverse();
        Ok(order)
    }

    /// Teardown order: sources first, master last.
    pub fn dispose_order(&self) -> Result<Vec<NodeId>, GraphError> {
        DependencyGraph::build(self)?.execution_order()
    }
}
