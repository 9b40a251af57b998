use log::{debug, info, warn};

use crate::energy::EnergyFunction;
use crate::error::{EnergyError, Result};
use crate::graph::NodeId;
use crate::model::{Messages, Model};
use crate::solver::{Solver, SolverConfig};

/// Synchronous sum-product (loopy) belief propagation over the undirected
/// skeleton of the energy function.
///
/// Every sweep recomputes all messages from the previous sweep's messages only,
///
///   m(a->b)[lb] = sum_la unary(a, la) * psi(la, lb) * prod_{c != b} m(c->a)[la],
///
/// so the update order cannot change the result. Exact on forests, typically
/// within diameter-many sweeps; an approximation on graphs with cycles.
pub struct SumProduct<L> {
    config: SolverConfig,
    model: Option<Model<L>>,
    messages: Messages,
    // NB order in which a sweep visits the directed messages.
    schedule: Vec<usize>,
    beliefs: Vec<Vec<f64>>,
    iterations: usize,
    converged: bool,
    solved: bool,
}

impl<L: Clone + PartialEq> SumProduct<L> {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
            messages: Messages::default(),
            schedule: Vec::new(),
            beliefs: Vec::new(),
            iterations: 0,
            converged: false,
            solved: false,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl<L: Clone + PartialEq> Solver for SumProduct<L> {
    type Label = L;

    fn init<E>(&mut self, energy: &E) -> Result<()>
    where
        E: EnergyFunction<Label = L> + ?Sized,
    {
        let model = Model::compile(energy)?;
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

        self.converged = false;
        for iter in 0..max_iterations {
            let max_diff = self
                .messages
                .sweep(model, &self.schedule, damping, |m, previous, out| {
                    let weights = model.cavity(m, previous, |_| true);
                    model.contract(m, &weights, out);
                })?;
            self.iterations += 1;

            debug!("Sum-product sweep {iter}: max_diff={max_diff:.3e}");

            if max_diff < tolerance {
                info!("Sum-product converged after {} sweeps (max_diff={max_diff:.3e})", iter + 1);
                self.converged = true;
                break;
            }
        }

        if !self.converged {
            warn!("Sum-product stopped at the iteration cap of {max_iterations} sweeps without converging");
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

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;
    use crate::energy::{GraphEnergy, NodeKey};
    use crate::exact::exact_marginals;
    use crate::graph::LabeledGraph;
    use crate::handler::{AgreementPotentials, TablePotentials};

    fn golden_chain() -> GraphEnergy<LabeledGraph<u32>, TablePotentials> {
        let mut g = LabeledGraph::with_nodes(3);
        g.add_edge(0, 1).unwrap();
        g.add_edge(1, 2).unwrap();
        let h = TablePotentials::new(2)
            .with_pairwise(0, vec![vec![1.0, 2.0], vec![4.0, 1.0]]).unwrap()
            .with_pairwise(1, vec![vec![1.0, 3.0], vec![3.0, 1.0]]).unwrap();
        GraphEnergy::new(g, h)
    }

    // NB a 4-cycle with a chord, so sweeps never settle in a single pass.
    fn loopy() -> GraphEnergy<LabeledGraph<u32>, TablePotentials> {
        let mut g = LabeledGraph::with_nodes(4);
        for (f, t) in [(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)] {
            g.add_edge(f, t).unwrap();
        }
        let mut h = TablePotentials::new(3)
            .with_unary(0, vec![0.7, 0.2, 0.1]).unwrap()
            .with_unary(3, vec![0.1, 0.3, 0.6]).unwrap();
        for e in 0..5 {
            let s = 1.0 + 0.15 * e as f64;
            h.set_pairwise(e, vec![vec![s, 1.0, 0.8], vec![1.0, 1.3, 1.0], vec![0.8, 1.0, s]]).unwrap();
        }
        GraphEnergy::new(g, h)
    }

    #[test]
    fn test_golden_chain() {
        let energy = golden_chain();
        let mut solver = SumProduct::new(SolverConfig::default()).unwrap();
        solver.init(&energy).unwrap();
        assert!(solver.solve().unwrap());

        let expected = [[0.375, 0.625], [0.625, 0.375], [0.4375, 0.5625]];
        for (node, exp) in expected.iter().enumerate() {
            for label in 0..2 {
                let b = solver.belief(node, &label).unwrap();
                assert!((b - exp[label]).abs() < 1e-4, "node={node} label={label} belief={b}");
            }
        }
        // NB a chain of diameter 2 settles after a handful of sweeps.
        assert!(solver.iterations() <= 4, "iterations={}", solver.iterations());
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut solver: SumProduct<usize> = SumProduct::new(SolverConfig::default()).unwrap();
        assert_eq!(solver.solve(), Err(EnergyError::NotInitialized));
        assert_eq!(solver.belief(0, &0), Err(EnergyError::NotInitialized));

        solver.init(&golden_chain()).unwrap();
        assert_eq!(solver.belief(0, &0), Err(EnergyError::NotSolved));

        solver.solve().unwrap();
        assert_eq!(solver.belief(0, &7), Err(EnergyError::LabelNotInDomain(0)));
        assert!(matches!(solver.belief(9, &0), Err(EnergyError::NodeOutOfRange { .. })));

        assert!(matches!(
            SumProduct::<usize>::new(SolverConfig::default().with_damping(1.5)),
            Err(EnergyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_schedule_permutation_is_bitwise_identical() {
        let energy = loopy();
        let config = SolverConfig::default().with_max_iterations(7);

        let mut reference = SumProduct::new(config.clone()).unwrap();
        reference.init(&energy).unwrap();
        reference.solve().unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let mut permuted = SumProduct::new(config.clone()).unwrap();
            permuted.init(&energy).unwrap();
            permuted.schedule.shuffle(&mut rng);
            permuted.solve().unwrap();

            assert_eq!(permuted.messages.view().get(3), reference.messages.view().get(3));
            assert_eq!(permuted.marginals().unwrap(), reference.marginals().unwrap());
        }
    }

    #[test]
    fn test_reinit_is_deterministic() {
        let energy = loopy();
        let mut solver = SumProduct::new(SolverConfig::default()).unwrap();

        solver.init(&energy).unwrap();
        solver.solve().unwrap();
        let first = solver.marginals().unwrap().to_vec();
        let first_iters = solver.iterations();

        solver.init(&energy).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.marginals().unwrap(), first.as_slice());
        assert_eq!(solver.iterations(), first_iters);
    }

    #[test]
    fn test_loopy_is_close_to_exact() {
        let energy = loopy();
        let exact = exact_marginals(&energy).unwrap();

        let mut solver = SumProduct::new(SolverConfig::default().with_max_iterations(500)).unwrap();
        solver.init(&energy).unwrap();
        assert!(solver.solve().unwrap());

        for (bp, ex) in solver.marginals().unwrap().iter().zip(&exact) {
            assert!((bp.iter().sum::<f64>() - 1.0).abs() < 1e-6);
            for (a, b) in bp.iter().zip(ex) {
                assert!((a - b).abs() < 0.05, "bp={bp:?} exact={ex:?}");
            }
        }
    }

    #[test]
    fn test_damping_reaches_same_fixed_point() {
        let energy = golden_chain();

        let mut plain = SumProduct::new(SolverConfig::default().with_tolerance(1e-10)).unwrap();
        plain.init(&energy).unwrap();
        assert!(plain.solve().unwrap());

        let damped_config = SolverConfig::default()
            .with_tolerance(1e-10)
            .with_max_iterations(1_000)
            .with_damping(0.5);
        let mut damped = SumProduct::new(damped_config).unwrap();
        damped.init(&energy).unwrap();
        assert!(damped.solve().unwrap());
        assert!(damped.iterations() > plain.iterations());

        for (a, b) in plain.marginals().unwrap().iter().zip(damped.marginals().unwrap()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let energy = loopy();
        let mut solver = SumProduct::new(SolverConfig::default().with_max_iterations(1)).unwrap();
        solver.init(&energy).unwrap();

        assert!(!solver.solve().unwrap());
        assert!(!solver.converged());
        assert_eq!(solver.iterations(), 1);
        for belief in solver.marginals().unwrap() {
            assert!((belief.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_high_degree_node_is_stable() {
        // NB 0.5^1100 underflows, so the hub's products must be rescaled.
        let leaves = 1100;
        let mut g = LabeledGraph::<u32>::with_nodes(leaves + 1);
        for leaf in 1..=leaves {
            g.add_edge(0, leaf).unwrap();
        }
        let mut energy = GraphEnergy::new(g, AgreementPotentials::new(vec![0u8, 1], 0.6, 0.4));

        let mut solver = SumProduct::new(SolverConfig::default()).unwrap();
        solver.init(&energy).unwrap();
        assert!(solver.solve().unwrap());
        assert_eq!(solver.marginals().unwrap()[0], vec![0.5, 0.5]);

        energy.set_label(NodeKey::Id(1), 1).unwrap();
        solver.init(&energy).unwrap();
        assert!(solver.solve().unwrap());

        let hub = &solver.marginals().unwrap()[0];
        assert!((hub[1] - 0.6).abs() < 1e-12, "hub={hub:?}");
        let leaf = &solver.marginals().unwrap()[leaves];
        assert!((leaf[1] - 0.52).abs() < 1e-12, "leaf={leaf:?}");
    }
}
