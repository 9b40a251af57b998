use std::cell::RefCell;

use log::debug;

use crate::error::{EnergyError, Result};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::handler::PotentialHandler;
use crate::solver::Solver;
use crate::utils::potential_to_cost;

/// Nodes with label domains and edges with pairwise tables.
///
/// All queries are pure once the underlying graph and potentials are fixed.
pub trait EnergyFunction {
    type Label: Clone + PartialEq;

    fn num_nodes(&self) -> usize;
    fn num_edges(&self) -> usize;
    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)>;
    fn possible_labels(&self, node: NodeId) -> Result<Vec<Self::Label>>;
    fn unary_potential(&self, node: NodeId, label: &Self::Label) -> Result<f64>;
    fn pairwise_potential(
        &self,
        edge: EdgeId,
        from_label: &Self::Label,
        to_label: &Self::Label,
    ) -> Result<f64>;

    fn unary_cost(&self, node: NodeId, label: &Self::Label) -> Result<f64> {
        Ok(potential_to_cost(self.unary_potential(node, label)?))
    }

    fn pairwise_cost(
        &self,
        edge: EdgeId,
        from_label: &Self::Label,
        to_label: &Self::Label,
    ) -> Result<f64> {
        Ok(potential_to_cost(self.pairwise_potential(edge, from_label, to_label)?))
    }

    /// Evidence recorded for `node`, if any.
    fn assigned_label(&self, _node: NodeId) -> Option<Self::Label> {
        None
    }
}

impl<E: EnergyFunction + ?Sized> EnergyFunction for &E {
    type Label = E::Label;

    fn num_nodes(&self) -> usize {
        (**self).num_nodes()
    }

    fn num_edges(&self) -> usize {
        (**self).num_edges()
    }

    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)> {
        (**self).edge_endpoints(edge)
    }

    fn possible_labels(&self, node: NodeId) -> Result<Vec<E::Label>> {
        (**self).possible_labels(node)
    }

    fn unary_potential(&self, node: NodeId, label: &E::Label) -> Result<f64> {
        (**self).unary_potential(node, label)
    }

    fn pairwise_potential(&self, edge: EdgeId, from_label: &E::Label, to_label: &E::Label) -> Result<f64> {
        (**self).pairwise_potential(edge, from_label, to_label)
    }

    fn assigned_label(&self, node: NodeId) -> Option<E::Label> {
        (**self).assigned_label(node)
    }
}

/// A node addressed either by integer id or by the graph's external label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKey<'a, N> {
    Id(NodeId),
    Label(&'a N),
}

impl<'a, N> From<NodeId> for NodeKey<'a, N> {
    fn from(id: NodeId) -> Self {
        NodeKey::Id(id)
    }
}

impl<'a, N> From<&'a N> for NodeKey<'a, N> {
    fn from(label: &'a N) -> Self {
        NodeKey::Label(label)
    }
}

/// Rejects empty domains and domains listing a label twice.
pub(crate) fn check_domain<L: PartialEq>(node: NodeId, labels: &[L]) -> Result<()> {
    if labels.is_empty() {
        return Err(EnergyError::EmptyDomain(node));
    }
    if labels.iter().enumerate().any(|(i, l)| labels[..i].contains(l)) {
        return Err(EnergyError::DuplicateLabel(node));
    }
    Ok(())
}

pub(crate) fn check_potential(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Energy function over a `Graph` whose potentials come from a `PotentialHandler`.
///
/// Also holds the evidence (fixed labels) and turns solver output into label ->
/// probability pairs.
pub struct GraphEnergy<G, H>
where
    G: Graph,
    H: PotentialHandler<G>,
{
    graph: G,
    handler: H,
    assignments: Vec<Option<H::Label>>,
    // NB first domain seen per node, later calls must match it.
    domains: RefCell<Vec<Option<Vec<H::Label>>>>,
}

impl<G, H> GraphEnergy<G, H>
where
    G: Graph,
    H: PotentialHandler<G>,
{
    pub fn new(graph: G, handler: H) -> Self {
        let n = graph.num_nodes();
        Self {
            graph,
            handler,
            assignments: vec![None; n],
            domains: RefCell::new(vec![None; n]),
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Resolves a node key to its integer id, delegating label lookup to the graph.
    pub fn node_id<'a>(&self, key: impl Into<NodeKey<'a, G::NodeLabel>>) -> Result<NodeId>
    where
        G::NodeLabel: 'a,
    {
        match key.into() {
            NodeKey::Id(node) => self.check_node(node).map(|_| node),
            NodeKey::Label(label) => self.graph.node_id(label).ok_or(EnergyError::UnknownNodeLabel),
        }
    }

    /// Records `label` as evidence for a node.
    pub fn set_label<'a>(&mut self, key: impl Into<NodeKey<'a, G::NodeLabel>>, label: H::Label) -> Result<()>
    where
        G::NodeLabel: 'a,
    {
        let node = self.node_id(key)?;
        if !self.possible_labels(node)?.contains(&label) {
            return Err(EnergyError::LabelNotInDomain(node));
        }
        debug!("evidence recorded for node {node}");
        self.assignments[node] = Some(label);
        Ok(())
    }

    pub fn clear_label<'a>(&mut self, key: impl Into<NodeKey<'a, G::NodeLabel>>) -> Result<()>
    where
        G::NodeLabel: 'a,
    {
        let node = self.node_id(key)?;
        self.assignments[node] = None;
        Ok(())
    }

    pub fn assigned<'a>(&self, key: impl Into<NodeKey<'a, G::NodeLabel>>) -> Result<Option<&H::Label>>
    where
        G::NodeLabel: 'a,
    {
        let node = self.node_id(key)?;
        Ok(self.assignments[node].as_ref())
    }

    /// Label -> probability pairs for a node, in domain order.
    ///
    /// Nodes with evidence report all mass on the assigned label. Otherwise the
    /// solver's beliefs are renormalized to sum to exactly 1.
    pub fn beliefs<'a, S>(
        &self,
        key: impl Into<NodeKey<'a, G::NodeLabel>>,
        solver: &S,
    ) -> Result<Vec<(H::Label, f64)>>
    where
        G::NodeLabel: 'a,
        S: Solver<Label = H::Label>,
    {
        let node = self.node_id(key)?;
        let domain = self.possible_labels(node)?;
        // NB lifecycle errors apply to evidence nodes too.
        solver.marginals()?;

        if let Some(assigned) = &self.assignments[node] {
            return Ok(domain
                .into_iter()
                .map(|label| {
                    let p = if &label == assigned { 1.0 } else { 0.0 };
                    (label, p)
                })
                .collect());
        }

        let values = domain
            .iter()
            .map(|label| solver.belief(node, label))
            .collect::<Result<Vec<f64>>>()?;
        let total: f64 = values.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(EnergyError::DegenerateBelief(node));
        }

        Ok(domain.into_iter().zip(values).map(|(label, p)| (label, p / total)).collect())
    }

    pub fn belief_of<'a, S>(
        &self,
        key: impl Into<NodeKey<'a, G::NodeLabel>>,
        label: &H::Label,
        solver: &S,
    ) -> Result<f64>
    where
        G::NodeLabel: 'a,
        S: Solver<Label = H::Label>,
    {
        let node = self.node_id(key)?;
        self.beliefs(NodeKey::Id(node), solver)?
            .into_iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| p)
            .ok_or(EnergyError::LabelNotInDomain(node))
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        let num_nodes = self.graph.num_nodes();
        if node >= num_nodes {
            return Err(EnergyError::NodeOutOfRange { node, num_nodes });
        }
        Ok(())
    }
}

impl<G, H> EnergyFunction for GraphEnergy<G, H>
where
    G: Graph,
    H: PotentialHandler<G>,
{
    type Label = H::Label;

    fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)> {
        self.graph.edge_endpoints(edge)
    }

    fn possible_labels(&self, node: NodeId) -> Result<Vec<H::Label>> {
        self.check_node(node)?;
        let labels = self.handler.possible_labels(&self.graph, node);
        check_domain(node, &labels)?;

        let mut seen = self.domains.borrow_mut();
        if seen[node].as_ref().is_some_and(|previous| previous != &labels) {
            return Err(EnergyError::InconsistentDomain(node));
        }
        if seen[node].is_none() {
            seen[node] = Some(labels.clone());
        }
        Ok(labels)
    }

    fn unary_potential(&self, node: NodeId, label: &H::Label) -> Result<f64> {
        self.check_node(node)?;
        let value = self.handler.unary_potential(
            &self.graph,
            node,
            label,
            self.assignments[node].as_ref(),
        );
        if !check_potential(value) {
            return Err(EnergyError::unary(node, value));
        }
        Ok(value)
    }

    fn pairwise_potential(&self, edge: EdgeId, from_label: &H::Label, to_label: &H::Label) -> Result<f64> {
        self.graph.edge_endpoints(edge)?;
        let value = self.handler.pairwise_potential(&self.graph, edge, from_label, to_label);
        if !check_potential(value) {
            return Err(EnergyError::pairwise(edge, value));
        }
        Ok(value)
    }

    fn assigned_label(&self, node: NodeId) -> Option<H::Label> {
        self.assignments.get(node).cloned().flatten()
    }
}
