use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graphbelief::{
    AgreementPotentials, DirectedPropagation, GraphEnergy, LabeledGraph, NodeKey, Solver, SolverConfig,
    SumProduct,
};

type Energy = GraphEnergy<LabeledGraph<u32>, AgreementPotentials<u8>>;

fn potentials() -> AgreementPotentials<u8> {
    AgreementPotentials::new(vec![0, 1], 0.8, 0.2)
}

fn build_chain(n_vars: usize) -> Energy {
    let mut g = LabeledGraph::with_nodes(n_vars);
    for i in 0..n_vars - 1 {
        g.add_edge(i, i + 1).unwrap();
    }
    let mut energy = GraphEnergy::new(g, potentials());
    energy.set_label(NodeKey::Id(0), 1).unwrap();
    energy
}

fn build_tree(layers: usize) -> Energy {
    let n_vars = (1 << layers) - 1;
    let mut g = LabeledGraph::with_nodes(n_vars);
    for i in 0..n_vars {
        for child in [2 * i + 1, 2 * i + 2] {
            if child < n_vars {
                g.add_edge(i, child).unwrap();
            }
        }
    }
    let mut energy = GraphEnergy::new(g, potentials());
    energy.set_label(NodeKey::Id(n_vars - 1), 0).unwrap();
    energy
}

fn build_hmrf(dim: usize) -> Energy {
    let mut g = LabeledGraph::with_nodes(dim * dim);
    for r in 0..dim {
        for c in 0..dim {
            let u = r * dim + c;
            if c + 1 < dim {
                g.add_edge(u, u + 1).unwrap();
            }
            if r + 1 < dim {
                g.add_edge(u, u + dim).unwrap();
            }
        }
    }
    let mut energy = GraphEnergy::new(g, potentials());
    energy.set_label(NodeKey::Id(0), 1).unwrap();
    energy
}

fn run<S: Solver<Label = u8>>(mut solver: S, energy: &Energy) -> bool {
    solver.init(energy).unwrap();
    solver.solve().unwrap()
}

fn bench_bp(c: &mut Criterion) {
    let mut group = c.benchmark_group("BeliefPropagation");
    let config = SolverConfig::default().with_max_iterations(100);

    for size in [10, 50, 100].iter() {
        let energy = build_chain(*size);
        group.bench_with_input(BenchmarkId::new("Chain", size), &energy, |b, energy| {
            b.iter(|| run(SumProduct::new(config.clone()).unwrap(), black_box(energy)));
        });
        group.bench_with_input(BenchmarkId::new("DirectedChain", size), &energy, |b, energy| {
            b.iter(|| run(DirectedPropagation::new(config.clone()).unwrap(), black_box(energy)));
        });
    }

    for layers in [5, 7].iter() {
        let n_vars = (1 << layers) - 1;
        let energy = build_tree(*layers);
        group.bench_with_input(BenchmarkId::new("Tree", n_vars), &energy, |b, energy| {
            b.iter(|| run(SumProduct::new(config.clone()).unwrap(), black_box(energy)));
        });
    }

    for dim in [5, 10].iter() {
        let n_vars = dim * dim;
        let energy = build_hmrf(*dim);
        group.bench_with_input(BenchmarkId::new("HMRF", n_vars), &energy, |b, energy| {
            b.iter(|| run(SumProduct::new(config.clone()).unwrap(), black_box(energy)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bp);
criterion_main!(benches);
