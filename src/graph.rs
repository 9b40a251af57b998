use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{EnergyError, Result};

pub type NodeId = usize;
pub type EdgeId = usize;

/// Read-only view of the graph storage consumed by the inference engine.
///
/// Nodes are `0..num_nodes()` and edges `0..num_edges()`. Edge ids are stable:
/// adding edges never renumbers existing ones.
pub trait Graph {
    type NodeLabel;

    fn num_nodes(&self) -> usize;
    fn num_edges(&self) -> usize;
    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)>;
    fn node_label(&self, node: NodeId) -> Option<&Self::NodeLabel>;
    fn node_id(&self, label: &Self::NodeLabel) -> Option<NodeId>;
}

/// Adjacency-free edge list with an injective node id <-> label mapping.
#[derive(Debug, Clone)]
pub struct LabeledGraph<N> {
    labels: Vec<Option<N>>,
    ids: HashMap<N, NodeId>,
    edges: Vec<(NodeId, NodeId)>,
}

impl<N: Eq + Hash + Clone> Default for LabeledGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Eq + Hash + Clone> LabeledGraph<N> {
    pub fn new() -> Self {
        Self {
            labels: Vec::new(),
            ids: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Graph with `num_nodes` unlabeled nodes and no edges.
    pub fn with_nodes(num_nodes: usize) -> Self {
        let mut graph = Self::new();
        graph.labels.resize(num_nodes, None);
        graph
    }

    pub fn add_node(&mut self) -> NodeId {
        self.labels.push(None);
        self.labels.len() - 1
    }

    pub fn add_labeled_node(&mut self, label: N) -> Result<NodeId> {
        if let Some(&existing) = self.ids.get(&label) {
            return Err(EnergyError::DuplicateNodeLabel(existing));
        }
        let id = self.labels.len();
        self.ids.insert(label.clone(), id);
        self.labels.push(Some(label));
        Ok(id)
    }

    /// Appends `(from, to)`; the returned id stays valid for the graph's lifetime.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId> {
        for node in [from, to] {
            if node >= self.labels.len() {
                return Err(EnergyError::NodeOutOfRange {
                    node,
                    num_nodes: self.labels.len(),
                });
            }
        }
        self.edges.push((from, to));
        Ok(self.edges.len() - 1)
    }

    /// Edges with their ids in ascending order of `from`, ties in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, (NodeId, NodeId))> + '_ {
        let mut order: Vec<EdgeId> = (0..self.edges.len()).collect();
        order.sort_by_key(|&e| self.edges[e].0);
        order.into_iter().map(move |e| (e, self.edges[e]))
    }
}

impl<N: Eq + Hash + Clone> Graph for LabeledGraph<N> {
    type NodeLabel = N;

    fn num_nodes(&self) -> usize {
        self.labels.len()
    }

    fn num_edges(&self) -> usize {
        self.edges.len()
    }

    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)> {
        self.edges
            .get(edge)
            .copied()
            .ok_or(EnergyError::EdgeOutOfRange {
                edge,
                num_edges: self.edges.len(),
            })
    }

    fn node_label(&self, node: NodeId) -> Option<&N> {
        self.labels.get(node).and_then(Option::as_ref)
    }

    fn node_id(&self, label: &N) -> Option<NodeId> {
        self.ids.get(label).copied()
    }
}
