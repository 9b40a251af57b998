use std::collections::HashMap;

use crate::error::{EnergyError, Result};
use crate::graph::{EdgeId, Graph, NodeId};

/// Caller-supplied source of label domains and potentials.
///
/// Values are returned as-is; `GraphEnergy` validates them (non-negative, finite,
/// stable domains) at the point of use.
pub trait PotentialHandler<G: Graph + ?Sized> {
    type Label: Clone + PartialEq;

    /// Compatibility of `from_label` at the edge's `from` endpoint with `to_label` at its `to` endpoint.
    fn pairwise_potential(
        &self,
        graph: &G,
        edge: EdgeId,
        from_label: &Self::Label,
        to_label: &Self::Label,
    ) -> f64;

    /// Local compatibility of `label`; `assigned` is the node's evidence, if any.
    fn unary_potential(
        &self,
        graph: &G,
        node: NodeId,
        label: &Self::Label,
        assigned: Option<&Self::Label>,
    ) -> f64;

    fn possible_labels(&self, graph: &G, node: NodeId) -> Vec<Self::Label>;
}

/// Explicit tables over the integer labels `0..num_labels`.
///
/// Nodes and edges without a table get potential 1. A node with evidence keeps its
/// table entry for the assigned label and 0 everywhere else. Tables of the wrong
/// shape are rejected when set.
#[derive(Debug, Clone)]
pub struct TablePotentials {
    num_labels: usize,
    unary: HashMap<NodeId, Vec<f64>>,
    // NB row-major, rows index the from label.
    pairwise: HashMap<EdgeId, Vec<f64>>,
}

impl TablePotentials {
    pub fn new(num_labels: usize) -> Self {
        Self {
            num_labels,
            unary: HashMap::new(),
            pairwise: HashMap::new(),
        }
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn with_unary(mut self, node: NodeId, table: Vec<f64>) -> Result<Self> {
        self.set_unary(node, table)?;
        Ok(self)
    }

    pub fn with_pairwise(mut self, edge: EdgeId, rows: Vec<Vec<f64>>) -> Result<Self> {
        self.set_pairwise(edge, rows)?;
        Ok(self)
    }

    /// Unary table for `node`, one entry per label.
    pub fn set_unary(&mut self, node: NodeId, table: Vec<f64>) -> Result<()> {
        if table.len() != self.num_labels {
            return Err(EnergyError::TableShape {
                kind: "unary",
                at: format!("node {node}"),
                expected: self.num_labels,
                found: table.len(),
            });
        }
        self.unary.insert(node, table);
        Ok(())
    }

    /// Pairwise table for `edge`, `num_labels` rows of `num_labels` entries.
    pub fn set_pairwise(&mut self, edge: EdgeId, rows: Vec<Vec<f64>>) -> Result<()> {
        if rows.len() != self.num_labels {
            return Err(EnergyError::TableShape {
                kind: "pairwise",
                at: format!("edge {edge}"),
                expected: self.num_labels,
                found: rows.len(),
            });
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != self.num_labels) {
            return Err(EnergyError::TableShape {
                kind: "pairwise",
                at: format!("edge {edge} row {i}"),
                expected: self.num_labels,
                found: row.len(),
            });
        }
        self.pairwise.insert(edge, rows.into_iter().flatten().collect());
        Ok(())
    }
}

impl<G: Graph + ?Sized> PotentialHandler<G> for TablePotentials {
    type Label = usize;

    fn pairwise_potential(&self, _graph: &G, edge: EdgeId, from_label: &usize, to_label: &usize) -> f64 {
        match self.pairwise.get(&edge) {
            // NB shapes are checked on insert, so only foreign labels miss.
            Some(table) if *from_label < self.num_labels && *to_label < self.num_labels => {
                table[from_label * self.num_labels + to_label]
            }
            Some(_) => 0.0,
            None => 1.0,
        }
    }

    fn unary_potential(&self, _graph: &G, node: NodeId, label: &usize, assigned: Option<&usize>) -> f64 {
        if assigned.is_some_and(|a| a != label) {
            return 0.0;
        }
        match self.unary.get(&node) {
            Some(table) => table.get(*label).copied().unwrap_or(0.0),
            None => 1.0,
        }
    }

    fn possible_labels(&self, _graph: &G, _node: NodeId) -> Vec<usize> {
        (0..self.num_labels).collect()
    }
}

/// Homogeneous Potts-style coupling: every edge scores `same` when both endpoints
/// agree and `different` otherwise.
///
/// Unary potentials are flat without evidence. With evidence the assigned label
/// scores `evidence_strength` and every other label `1 - evidence_strength`.
#[derive(Debug, Clone)]
pub struct AgreementPotentials<L> {
    labels: Vec<L>,
    same: f64,
    different: f64,
    evidence_strength: f64,
}

impl<L: Clone + PartialEq> AgreementPotentials<L> {
    pub fn new(labels: Vec<L>, same: f64, different: f64) -> Self {
        Self {
            labels,
            same,
            different,
            evidence_strength: 1.0,
        }
    }

    /// Soft evidence; 1.0 (the default) makes evidence hard.
    pub fn with_evidence_strength(mut self, strength: f64) -> Self {
        self.evidence_strength = strength;
        self
    }
}

impl<G: Graph + ?Sized, L: Clone + PartialEq> PotentialHandler<G> for AgreementPotentials<L> {
    type Label = L;

    fn pairwise_potential(&self, _graph: &G, _edge: EdgeId, from_label: &L, to_label: &L) -> f64 {
        if from_label == to_label {
            self.same
        } else {
            self.different
        }
    }

    fn unary_potential(&self, _graph: &G, _node: NodeId, label: &L, assigned: Option<&L>) -> f64 {
        match assigned {
            None => 1.0,
            Some(a) if a == label => self.evidence_strength,
            Some(_) => 1.0 - self.evidence_strength,
        }
    }

    fn possible_labels(&self, _graph: &G, _node: NodeId) -> Vec<L> {
        self.labels.clone()
    }
}
