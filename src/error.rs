use thiserror::Error;

use crate::graph::{EdgeId, NodeId};

pub type Result<T> = std::result::Result<T, EnergyError>;

/// Errors raised while building a graph, evaluating potentials or running a solver.
///
/// Non-convergence is deliberately absent: `Solver::solve` reports it as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnergyError {
    #[error("node {node} is out of range for a graph with {num_nodes} nodes.")]
    NodeOutOfRange { node: NodeId, num_nodes: usize },
    #[error("edge {edge} is out of range for a graph with {num_edges} edges.")]
    EdgeOutOfRange { edge: EdgeId, num_edges: usize },
    #[error("no node carries the requested label.")]
    UnknownNodeLabel,
    #[error("label is already attached to node {0}.")]
    DuplicateNodeLabel(NodeId),
    #[error("edges {first} and {second} join the same node pair ({from}, {to}); wrap the energy in MergedEdges first.")]
    DuplicateEdge {
        first: EdgeId,
        second: EdgeId,
        from: NodeId,
        to: NodeId,
    },
    #[error("{kind} potential {value} is not a finite non-negative number (at {at}).")]
    InvalidPotential {
        kind: &'static str,
        at: String,
        value: f64,
    },
    #[error("node {0} has an empty label domain.")]
    EmptyDomain(NodeId),
    #[error("node {0} returned a label domain different from the one seen previously.")]
    InconsistentDomain(NodeId),
    #[error("label is not part of the domain of node {0}.")]
    LabelNotInDomain(NodeId),
    #[error("node {0} lists the same label more than once in its domain.")]
    DuplicateLabel(NodeId),
    #[error("{kind} table for {at} has {found} entries where {expected} are required.")]
    TableShape {
        kind: &'static str,
        at: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),
    #[error("solver has not been initialized with an energy function.")]
    NotInitialized,
    #[error("beliefs are unavailable before the first call to solve.")]
    NotSolved,
    #[error("message along edge {edge} towards node {node} has no mass (sum {sum}).")]
    DegenerateMessage { edge: EdgeId, node: NodeId, sum: f64 },
    #[error("belief of node {0} has no mass.")]
    DegenerateBelief(NodeId),
    #[error("every joint labeling has zero potential.")]
    ZeroPartition,
    #[error("exact enumeration needs {0} joint states, above the supported maximum.")]
    TooManyStates(u128),
}

impl EnergyError {
    pub(crate) fn unary(node: NodeId, value: f64) -> Self {
        EnergyError::InvalidPotential {
            kind: "unary",
            at: format!("node {node}"),
            value,
        }
    }

    pub(crate) fn pairwise(edge: EdgeId, value: f64) -> Self {
        EnergyError::InvalidPotential {
            kind: "pairwise",
            at: format!("edge {edge}"),
            value,
        }
    }
}
