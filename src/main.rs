use graphbelief::{GraphEnergy, LabeledGraph, NodeKey, Solver, SolverConfig, SumProduct, TablePotentials};
use log::{error, info, warn};

fn run() -> graphbelief::Result<()> {
    // NB 3-node chain with asymmetric couplings and flat unary terms.
    let mut graph = LabeledGraph::new();
    for name in ["a", "b", "c"] {
        graph.add_labeled_node(name)?;
    }
    graph.add_edge(0, 1)?;
    graph.add_edge(1, 2)?;

    let handler = TablePotentials::new(2)
        .with_pairwise(0, vec![vec![1.0, 2.0], vec![4.0, 1.0]])?
        .with_pairwise(1, vec![vec![1.0, 3.0], vec![3.0, 1.0]])?;
    let energy = GraphEnergy::new(graph, handler);

    let mut solver = SumProduct::new(SolverConfig::default())?;
    solver.init(&energy)?;
    if !solver.solve()? {
        warn!("Beliefs are approximate, solver did not converge.");
    }

    for name in ["a", "b", "c"] {
        let beliefs = energy.beliefs(NodeKey::Label(&name), &solver)?;
        info!("node {name}: {beliefs:?}");
    }
    Ok(())
}

fn main() {
    env_logger::init();

    info!("Welcome to graphbelief.");

    if let Err(e) = run() {
        error!("Belief propagation failed: {e}");
        std::process::exit(1);
    }

    info!("Done.");
}
