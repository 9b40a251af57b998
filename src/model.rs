//! Index-based snapshot of an energy function plus the ping-pong message buffers
//! both solvers sweep over.
//!
//! Edge `k` of the model owns two directed messages: `2k` flows `from -> to`
//! (forward) and `2k + 1` flows `to -> from` (backward). Message `m ^ 1` is the
//! reverse of `m`.

use std::collections::HashMap;

use log::debug;

use crate::energy::{check_domain, check_potential, EnergyFunction};
use crate::error::{EnergyError, Result};
use crate::graph::{EdgeId, NodeId};
use crate::utils::{max_abs_diff, normalize, scaled_product};

pub(crate) struct Model<L> {
    pub(crate) domains: Vec<Vec<L>>,
    // NB self-loop diagonals are already folded in.
    pub(crate) unary: Vec<Vec<f64>>,
    pub(crate) edges: Vec<(NodeId, NodeId)>,
    // row-major, rows index the from label.
    pub(crate) pairwise: Vec<Vec<f64>>,
    // model edge -> edge id in the energy function.
    pub(crate) source: Vec<EdgeId>,
    // node -> messages it receives.
    pub(crate) inbox: Vec<Vec<usize>>,
}

impl<L: Clone + PartialEq> Model<L> {
    pub(crate) fn compile<E>(energy: &E) -> Result<Self>
    where
        E: EnergyFunction<Label = L> + ?Sized,
    {
        let num_nodes = energy.num_nodes();

        let mut domains = Vec::with_capacity(num_nodes);
        let mut unary = Vec::with_capacity(num_nodes);
        for node in 0..num_nodes {
            let labels = energy.possible_labels(node)?;
            check_domain(node, &labels)?;
            let row = labels
                .iter()
                .map(|label| {
                    let v = energy.unary_potential(node, label)?;
                    if !check_potential(v) {
                        return Err(EnergyError::unary(node, v));
                    }
                    Ok(v)
                })
                .collect::<Result<Vec<f64>>>()?;
            domains.push(labels);
            unary.push(row);
        }

        let mut edges = Vec::new();
        let mut pairwise = Vec::new();
        let mut source = Vec::new();
        let mut seen: HashMap<(NodeId, NodeId), EdgeId> = HashMap::new();
        let mut self_loops = 0;

        for edge in 0..energy.num_edges() {
            let (from, to) = energy.edge_endpoints(edge)?;
            for node in [from, to] {
                if node >= num_nodes {
                    return Err(EnergyError::NodeOutOfRange { node, num_nodes });
                }
            }

            let mut table = Vec::with_capacity(domains[from].len() * domains[to].len());
            for lf in &domains[from] {
                for lt in &domains[to] {
                    let v = energy.pairwise_potential(edge, lf, lt)?;
                    if !check_potential(v) {
                        return Err(EnergyError::pairwise(edge, v));
                    }
                    table.push(v);
                }
            }

            if from == to {
                // NB a self-loop only ever sees equal labels at both ends.
                let d = domains[from].len();
                for (k, u) in unary[from].iter_mut().enumerate() {
                    *u *= table[k * d + k];
                }
                self_loops += 1;
                continue;
            }

            let key = (from.min(to), from.max(to));
            if let Some(&first) = seen.get(&key) {
                return Err(EnergyError::DuplicateEdge {
                    first,
                    second: edge,
                    from,
                    to,
                });
            }
            seen.insert(key, edge);

            edges.push((from, to));
            pairwise.push(table);
            source.push(edge);
        }

        let mut inbox = vec![Vec::new(); num_nodes];
        for (k, &(from, to)) in edges.iter().enumerate() {
            inbox[to].push(2 * k);
            inbox[from].push(2 * k + 1);
        }

        debug!(
            "compiled model: {} nodes, {} edges, {} self-loops folded",
            num_nodes,
            edges.len(),
            self_loops
        );

        Ok(Self {
            domains,
            unary,
            edges,
            pairwise,
            source,
            inbox,
        })
    }

    pub(crate) fn num_nodes(&self) -> usize {
        self.domains.len()
    }

    pub(crate) fn num_messages(&self) -> usize {
        2 * self.edges.len()
    }

    /// (sender, receiver) of message `m`.
    pub(crate) fn endpoints(&self, m: usize) -> (NodeId, NodeId) {
        let (from, to) = self.edges[m / 2];
        if is_forward(m) {
            (from, to)
        } else {
            (to, from)
        }
    }

    pub(crate) fn receiver(&self, m: usize) -> NodeId {
        self.endpoints(m).1
    }

    pub(crate) fn label_index(&self, node: NodeId, label: &L) -> Result<usize> {
        let domain = self.domains.get(node).ok_or(EnergyError::NodeOutOfRange {
            node,
            num_nodes: self.num_nodes(),
        })?;
        domain
            .iter()
            .position(|l| l == label)
            .ok_or(EnergyError::LabelNotInDomain(node))
    }

    /// Unary term of the sender of `m` times every message it receives except the
    /// reverse of `m` and those rejected by `include`.
    pub(crate) fn cavity(
        &self,
        m: usize,
        messages: &MessageView<'_>,
        include: impl Fn(usize) -> bool,
    ) -> Vec<f64> {
        let (sender, _) = self.endpoints(m);
        let mut weights = self.unary[sender].clone();
        for &incoming in &self.inbox[sender] {
            if incoming == (m ^ 1) || !include(incoming) {
                continue;
            }
            scaled_product(&mut weights, messages.get(incoming));
        }
        weights
    }

    /// Sums the sender's `weights` through the pairwise table of `m`'s edge into `out`.
    pub(crate) fn contract(&self, m: usize, weights: &[f64], out: &mut [f64]) {
        let k = m / 2;
        let (from, to) = self.edges[k];
        let d_to = self.domains[to].len();
        let table = &self.pairwise[k];

        if is_forward(m) {
            for (j, o) in out.iter_mut().enumerate() {
                *o = weights
                    .iter()
                    .enumerate()
                    .map(|(i, w)| w * table[i * d_to + j])
                    .sum();
            }
        } else {
            debug_assert_eq!(out.len(), self.domains[from].len());
            for (i, o) in out.iter_mut().enumerate() {
                *o = weights
                    .iter()
                    .enumerate()
                    .map(|(j, w)| w * table[i * d_to + j])
                    .sum();
            }
        }
    }

    /// Unary term times every incoming message, normalized.
    pub(crate) fn belief(&self, node: NodeId, messages: &MessageView<'_>) -> Result<Vec<f64>> {
        let mut belief = self.unary[node].clone();
        for &incoming in &self.inbox[node] {
            scaled_product(&mut belief, messages.get(incoming));
        }
        let norm = normalize(&mut belief);
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(EnergyError::DegenerateBelief(node));
        }
        Ok(belief)
    }
}

pub(crate) fn is_forward(m: usize) -> bool {
    m % 2 == 0
}

/// Read-only access to one generation of messages.
pub(crate) struct MessageView<'a> {
    offsets: &'a [usize],
    data: &'a [f64],
}

impl MessageView<'_> {
    pub(crate) fn get(&self, m: usize) -> &[f64] {
        &self.data[self.offsets[m]..self.offsets[m + 1]]
    }
}

/// Double-buffered message storage: sweeps read `current` and write `next`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Messages {
    offsets: Vec<usize>,
    current: Vec<f64>,
    next: Vec<f64>,
}

impl Messages {
    /// Every message set to the uniform distribution over its receiver's domain.
    pub(crate) fn uniform<L: Clone + PartialEq>(model: &Model<L>) -> Self {
        let mut offsets = Vec::with_capacity(model.num_messages() + 1);
        let mut current = Vec::new();
        offsets.push(0);
        for m in 0..model.num_messages() {
            let d = model.domains[model.receiver(m)].len();
            current.extend(std::iter::repeat(1.0 / d as f64).take(d));
            offsets.push(current.len());
        }
        let next = current.clone();
        Self {
            offsets,
            current,
            next,
        }
    }

    pub(crate) fn view(&self) -> MessageView<'_> {
        MessageView {
            offsets: &self.offsets,
            data: &self.current,
        }
    }

    /// One synchronous sweep over `order`, which must list every message once.
    ///
    /// `compute` fills the unnormalized new value of a message from the previous
    /// generation only. Returns the largest absolute change of any entry.
    pub(crate) fn sweep<L, F>(
        &mut self,
        model: &Model<L>,
        order: &[usize],
        damping: f64,
        mut compute: F,
    ) -> Result<f64>
    where
        L: Clone + PartialEq,
        F: FnMut(usize, &MessageView<'_>, &mut [f64]),
    {
        let Messages {
            offsets,
            current,
            next,
        } = self;
        let previous = MessageView {
            offsets,
            data: current,
        };

        for &m in order {
            let (start, end) = (offsets[m], offsets[m + 1]);
            let out = &mut next[start..end];
            compute(m, &previous, out);

            let sum = normalize(out);
            if !(sum > 0.0 && sum.is_finite()) {
                return Err(EnergyError::DegenerateMessage {
                    edge: model.source[m / 2],
                    node: model.receiver(m),
                    sum,
                });
            }
            if damping > 0.0 {
                for (o, p) in out.iter_mut().zip(&current[start..end]) {
                    *o = (1.0 - damping) * *o + damping * p;
                }
            }
        }

        let max_diff = max_abs_diff(current, next);
        std::mem::swap(current, next);
        Ok(max_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::GraphEnergy;
    use crate::graph::LabeledGraph;
    use crate::handler::TablePotentials;

    fn energy(edges: &[(NodeId, NodeId)]) -> GraphEnergy<LabeledGraph<u32>, TablePotentials> {
        let mut g = LabeledGraph::with_nodes(3);
        for &(f, t) in edges {
            g.add_edge(f, t).unwrap();
        }
        let mut h = TablePotentials::new(2).with_unary(2, vec![1.0, 3.0]).unwrap();
        for e in 0..edges.len() {
            h.set_pairwise(e, vec![vec![1.0, 2.0], vec![4.0, 1.0]]).unwrap();
        }
        GraphEnergy::new(g, h)
    }

    #[test]
    fn test_compile_layout() {
        let model = Model::compile(&energy(&[(0, 1), (1, 2)])).unwrap();
        assert_eq!(model.num_messages(), 4);
        assert_eq!(model.endpoints(0), (0, 1));
        assert_eq!(model.endpoints(3), (2, 1));
        assert_eq!(model.inbox[1], vec![0, 3]);
        assert_eq!(model.pairwise[1], vec![1.0, 2.0, 4.0, 1.0]);
        assert_eq!(model.label_index(2, &1).unwrap(), 1);
        assert_eq!(model.label_index(2, &5), Err(EnergyError::LabelNotInDomain(2)));
    }

    #[test]
    fn test_self_loop_folds_into_unary() {
        let mut g: LabeledGraph<u32> = LabeledGraph::with_nodes(3);
        g.add_edge(0, 1).unwrap();
        g.add_edge(2, 2).unwrap();
        g.add_edge(2, 2).unwrap();
        let h = TablePotentials::new(2)
            .with_unary(2, vec![1.0, 3.0]).unwrap()
            .with_pairwise(1, vec![vec![2.0, 7.0], vec![7.0, 0.5]]).unwrap()
            .with_pairwise(2, vec![vec![3.0, 7.0], vec![7.0, 1.0]]).unwrap();
        let model = Model::compile(&GraphEnergy::new(g, h)).unwrap();

        assert_eq!(model.edges, vec![(0, 1)]);
        assert_eq!(model.source, vec![0]);
        assert_eq!(model.unary[2], vec![6.0, 1.5]);
    }

    #[test]
    fn test_unmerged_edges_are_rejected() {
        let err = Model::compile(&energy(&[(0, 1), (1, 0)])).err();
        assert_eq!(
            err,
            Some(EnergyError::DuplicateEdge { first: 0, second: 1, from: 1, to: 0 })
        );
    }

    #[test]
    fn test_contract_orientation() {
        let model = Model::compile(&energy(&[(0, 1)])).unwrap();
        let mut out = vec![0.0; 2];

        // forward: sum over rows.
        model.contract(0, &[1.0, 0.0], &mut out);
        assert_eq!(out, vec![1.0, 2.0]);

        // backward: sum over columns.
        model.contract(1, &[1.0, 0.0], &mut out);
        assert_eq!(out, vec![1.0, 4.0]);
    }

    #[test]
    fn test_uniform_messages_and_sweep() {
        let model = Model::compile(&energy(&[(0, 1)])).unwrap();
        let mut messages = Messages::uniform(&model);
        assert_eq!(messages.view().get(1), &[0.5, 0.5]);

        let diff = messages
            .sweep(&model, &[0, 1], 0.0, |m, prev, out| {
                let w = model.cavity(m, prev, |_| true);
                model.contract(m, &w, out);
            })
            .unwrap();

        assert_eq!(messages.view().get(0), &[5.0 / 8.0, 3.0 / 8.0]);
        assert_eq!(messages.view().get(1), &[3.0 / 8.0, 5.0 / 8.0]);
        assert!((diff - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_message() {
        let mut g: LabeledGraph<u32> = LabeledGraph::with_nodes(2);
        g.add_edge(0, 1).unwrap();
        let h = TablePotentials::new(2)
            .with_pairwise(0, vec![vec![0.0, 0.0], vec![0.0, 0.0]])
            .unwrap();
        let model = Model::compile(&GraphEnergy::new(g, h)).unwrap();
        let mut messages = Messages::uniform(&model);

        let err = messages.sweep(&model, &[0, 1], 0.0, |m, prev, out| {
            let w = model.cavity(m, prev, |_| true);
            model.contract(m, &w, out);
        });
        assert!(matches!(err, Err(EnergyError::DegenerateMessage { edge: 0, .. })));
    }

    struct Repeated;

    impl EnergyFunction for Repeated {
        type Label = char;

        fn num_nodes(&self) -> usize {
            2
        }

        fn num_edges(&self) -> usize {
            0
        }

        fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)> {
            Err(EnergyError::EdgeOutOfRange { edge, num_edges: 0 })
        }

        fn possible_labels(&self, node: NodeId) -> Result<Vec<char>> {
            Ok(if node == 0 { vec!['a', 'b'] } else { vec!['a', 'b', 'a'] })
        }

        fn unary_potential(&self, _: NodeId, _: &char) -> Result<f64> {
            Ok(1.0)
        }

        fn pairwise_potential(&self, _: EdgeId, _: &char, _: &char) -> Result<f64> {
            Ok(1.0)
        }
    }

    #[test]
    fn test_duplicate_labels_are_rejected() {
        assert_eq!(Model::compile(&Repeated).err(), Some(EnergyError::DuplicateLabel(1)));
    }
}
