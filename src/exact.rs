use crate::energy::{check_domain, EnergyFunction};
use crate::error::{EnergyError, Result};

/// Largest number of joint labelings `exact_marginals` will enumerate.
pub const MAX_EXACT_STATES: u128 = 1 << 22;

/// Advances `assignment` like an odometer over `domains`; false once it wraps.
fn next_assignment(assignment: &mut [usize], domains: &[usize]) -> bool {
    for (a, &dom) in assignment.iter_mut().zip(domains) {
        *a += 1;
        if *a < dom {
            return true;
        }
        *a = 0;
    }
    false
}

/// Exact per-node marginals by brute-force enumeration of every joint labeling.
///
/// Works on any energy function, including ones with self-loops and duplicate
/// edges, so it is the reference the solvers are checked against.
/// NB warning: exponential complexity in the number of nodes.
pub fn exact_marginals<E>(energy: &E) -> Result<Vec<Vec<f64>>>
where
    E: EnergyFunction + ?Sized,
{
    let num_nodes = energy.num_nodes();

    let domains = (0..num_nodes)
        .map(|node| energy.possible_labels(node))
        .collect::<Result<Vec<_>>>()?;
    for (node, labels) in domains.iter().enumerate() {
        check_domain(node, labels)?;
    }
    let sizes: Vec<usize> = domains.iter().map(Vec::len).collect();

    let total = sizes.iter().try_fold(1u128, |acc, &d| acc.checked_mul(d as u128));
    match total {
        Some(t) if t <= MAX_EXACT_STATES => {}
        Some(t) => return Err(EnergyError::TooManyStates(t)),
        None => return Err(EnergyError::TooManyStates(u128::MAX)),
    }

    // NB costs, i.e. negative log potentials, cached once.
    let unary = domains
        .iter()
        .enumerate()
        .map(|(node, labels)| {
            labels
                .iter()
                .map(|l| energy.unary_cost(node, l))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut pairwise = Vec::with_capacity(energy.num_edges());
    for edge in 0..energy.num_edges() {
        let (from, to) = energy.edge_endpoints(edge)?;
        for node in [from, to] {
            if node >= num_nodes {
                return Err(EnergyError::NodeOutOfRange { node, num_nodes });
            }
        }
        let mut table = Vec::with_capacity(sizes[from] * sizes[to]);
        for lf in &domains[from] {
            for lt in &domains[to] {
                table.push(energy.pairwise_cost(edge, lf, lt)?);
            }
        }
        pairwise.push((from, to, table));
    }

    let mut marginals: Vec<Vec<f64>> = sizes.iter().map(|&d| vec![0.0; d]).collect();
    let mut partition = 0.0;
    let mut config = vec![0; num_nodes];

    loop {
        let mut cost = 0.0;
        for (node, &label) in config.iter().enumerate() {
            cost += unary[node][label];
        }
        for (from, to, table) in &pairwise {
            cost += table[config[*from] * sizes[*to] + config[*to]];
        }

        let prob = (-cost).exp();
        partition += prob;
        for (node, &label) in config.iter().enumerate() {
            marginals[node][label] += prob;
        }

        if !next_assignment(&mut config, &sizes) {
            break;
        }
    }

    if !(partition > 0.0) {
        return Err(EnergyError::ZeroPartition);
    }
    for marginal in &mut marginals {
        for p in marginal.iter_mut() {
            *p /= partition;
        }
    }
    Ok(marginals)
}
