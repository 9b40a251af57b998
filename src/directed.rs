use log::{debug, info, warn};

use crate::energy::EnergyFunction;
use crate::error::{EnergyError, Result};
use crate::graph::NodeId;
use crate::model::{is_forward, MessageView, Messages, Model};
use crate::solver::{Solver, SolverConfig};
use crate::utils::{normalize, scaled_product};

/// Belief propagation that reads each edge as `from` (parent) -> `to` (child).
///
/// Causal messages (pi) flow along the edges, diagnostic messages (lambda) flow
/// against them so that downstream evidence still reaches upstream nodes. A
/// node's belief is its unary term times the pi support of all its parents and
/// the lambda support of all its children.
///
/// By default a lambda message ignores the pi support of the sender's other
/// parents, i.e. co-parents are treated as independent. This is exact on chains
/// and on any graph where every node has at most one parent, and approximate
/// where several parents converge.
pub struct DirectedPropagation<L> {
    config: SolverConfig,
    couple_parents: bool,
    model: Option<Model<L>>,
    messages: Messages,
    schedule: Vec<usize>,
    beliefs: Vec<Vec<f64>>,
    iterations: usize,
    converged: bool,
    solved: bool,
}

impl<L: Clone + PartialEq> DirectedPropagation<L> {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            couple_parents: false,
            model: None,
            messages: Messages::default(),
            schedule: Vec::new(),
            beliefs: Vec::new(),
            iterations: 0,
            converged: false,
            solved: false,
        })
    }

    /// Lets lambda messages carry the pi support of co-parents, which makes the
    /// solver coincide with plain sum-product.
    pub fn with_coupled_parents(mut self, couple: bool) -> Self {
        self.couple_parents = couple;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Normalized product of the pi messages a node receives from its parents;
    /// uniform for roots.
    pub fn causal_support(&self, node: NodeId) -> Result<Vec<f64>> {
        self.support(node, true)
    }

    /// Normalized product of the lambda messages a node receives from its
    /// children; uniform for leaves.
    pub fn diagnostic_support(&self, node: NodeId) -> Result<Vec<f64>> {
        self.support(node, false)
    }

    fn support(&self, node: NodeId, causal: bool) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or(EnergyError::NotInitialized)?;
        if !self.solved {
            return Err(EnergyError::NotSolved);
        }
        if node >= model.num_nodes() {
            return Err(EnergyError::NodeOutOfRange {
                node,
                num_nodes: model.num_nodes(),
            });
        }

        let view = self.messages.view();
        let mut support = vec![1.0; model.domains[node].len()];
        for &incoming in model.inbox[node].iter().filter(|&&m| is_forward(m) == causal) {
            scaled_product(&mut support, view.get(incoming));
        }
        let norm = normalize(&mut support);
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(EnergyError::DegenerateBelief(node));
        }
        Ok(support)
    }
}

fn directed_update<L: Clone + PartialEq>(
    model: &Model<L>,
    couple_parents: bool,
    m: usize,
    previous: &MessageView<'_>,
    out: &mut [f64],
) {
    let weights = if is_forward(m) || couple_parents {
        model.cavity(m, previous, |_| true)
    } else {
        // NB lambda: only the sender's own children feed back.
        model.cavity(m, previous, |incoming| !is_forward(incoming))
    };
    model.contract(m, &weights, out);
}

impl<L: Clone + PartialEq> Solver for DirectedPropagation<L> {
    type Label = L;

    fn init<E>(&mut self, energy: &E) -> Result<()>
    where
        E: EnergyFunction<Label = L> + ?Sized,
    {
        let model = Model::compile(energy)?;

        let mut parents = vec![0usize; model.num_nodes()];
        for &(_, to) in &model.edges {
            parents[to] += 1;
        }
        let roots = parents.iter().filter(|&&p| p == 0).count();
        let converging = parents.iter().filter(|&&p| p > 1).count();
        debug!(
            "Directed propagation over {} edges: {} roots, {} nodes with several parents",
            model.edges.len(),
            roots,
            converging
        );

        self.messages = Messages::uniform(&model);
        self.schedule = (0..model.num_messages()).collect();
        self.beliefs = Vec::new();
        self.iterations = 0;
        self.converged = false;
        self.solved = false;
        self.model = Some(model);
        Ok(())
    }

    fn solve(&mut self) -> Result<bool> {
        let model = self.model.as_ref().ok_or(EnergyError::NotInitialized)?;
        let SolverConfig {
            max_iterations,
            tolerance,
            damping,
        } = self.config;
        let couple_parents = self.couple_parents;

        self.converged = false;
        for iter in 0..max_iterations {
            let max_diff = self
                .messages
                .sweep(model, &self.schedule, damping, |m, previous, out| {
                    directed_update(model, couple_parents, m, previous, out)
                })?;
            self.iterations += 1;

            debug!("Directed sweep {iter}: max_diff={max_diff:.3e}");

            if max_diff < tolerance {
                info!("Directed propagation converged after {} sweeps (max_diff={max_diff:.3e})", iter + 1);
                self.converged = true;
                break;
            }
        }

        if !self.converged {
            warn!("Directed propagation stopped at the iteration cap of {max_iterations} sweeps without converging");
        }

        let view = self.messages.view();
        self.beliefs = (0..model.num_nodes())
            .map(|node| model.belief(node, &view))
            .collect::<Result<_>>()?;
        self.solved = true;

        Ok(self.converged)
    }

    fn belief(&self, node: NodeId, label: &L) -> Result<f64> {
        let model = self.model.as_ref().ok_or(EnergyError::NotInitialized)?;
        let k = model.label_index(node, label)?;
        Ok(self.marginals()?[node][k])
    }

    fn marginals(&self) -> Result<&[Vec<f64>]> {
        if self.model.is_none() {
            return Err(EnergyError::NotInitialized);
        }
        if !self.solved {
            return Err(EnergyError::NotSolved);
        }
        Ok(&self.beliefs)
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn converged(&self) -> bool {
        self.converged
    }
}
