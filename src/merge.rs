use std::collections::BTreeMap;

use log::debug;

use crate::energy::{check_domain, check_potential, EnergyFunction};
use crate::error::{EnergyError, Result};
use crate::graph::{EdgeId, NodeId};

struct MergedEdge {
    from: NodeId,
    to: NodeId,
    sources: Vec<EdgeId>,
    // NB None for self-loops, which pass through to the wrapped energy.
    table: Option<Vec<f64>>,
}

/// Canonical view of an energy function with at most one edge per unordered
/// node pair.
///
/// Edges joining the same two nodes, in either direction, are combined into one
/// edge `(min, max)` whose table is the element-wise product of the member
/// tables, transposing members stored as `(max, min)`. Self-loops are kept one
/// per input edge. Output edges are numbered by canonical key, independent
/// of the input edge order. Nodes, domains, unary potentials and evidence pass
/// through unchanged.
pub struct MergedEdges<E: EnergyFunction> {
    inner: E,
    domains: Vec<Vec<E::Label>>,
    edges: Vec<MergedEdge>,
}

impl<E: EnergyFunction> MergedEdges<E> {
    pub fn new(inner: E) -> Result<Self> {
        let num_nodes = inner.num_nodes();
        let domains = (0..num_nodes)
            .map(|node| {
                let labels = inner.possible_labels(node)?;
                check_domain(node, &labels)?;
                Ok(labels)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut groups: BTreeMap<(NodeId, NodeId), Vec<EdgeId>> = BTreeMap::new();
        for edge in 0..inner.num_edges() {
            let (a, b) = inner.edge_endpoints(edge)?;
            for node in [a, b] {
                if node >= num_nodes {
                    return Err(EnergyError::NodeOutOfRange { node, num_nodes });
                }
            }
            groups.entry((a.min(b), a.max(b))).or_default().push(edge);
        }

        let mut edges = Vec::with_capacity(groups.len());
        for ((lo, hi), members) in groups {
            if lo == hi {
                edges.extend(members.into_iter().map(|edge| MergedEdge {
                    from: lo,
                    to: hi,
                    sources: vec![edge],
                    table: None,
                }));
                continue;
            }

            let d_hi = domains[hi].len();
            let mut table = vec![1.0; domains[lo].len() * d_hi];
            for &edge in &members {
                let (from, _) = inner.edge_endpoints(edge)?;
                let reversed = from != lo;
                for (i, l_lo) in domains[lo].iter().enumerate() {
                    for (j, l_hi) in domains[hi].iter().enumerate() {
                        let v = if reversed {
                            inner.pairwise_potential(edge, l_hi, l_lo)?
                        } else {
                            inner.pairwise_potential(edge, l_lo, l_hi)?
                        };
                        if !check_potential(v) {
                            return Err(EnergyError::pairwise(edge, v));
                        }
                        table[i * d_hi + j] *= v;
                    }
                }
            }

            edges.push(MergedEdge {
                from: lo,
                to: hi,
                sources: members,
                table: Some(table),
            });
        }

        debug!(
            "Merged {} edges into {} canonical edges",
            inner.num_edges(),
            edges.len()
        );

        Ok(Self {
            inner,
            domains,
            edges,
        })
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Original edges combined into `edge`, in input order.
    pub fn source_edges(&self, edge: EdgeId) -> Result<&[EdgeId]> {
        self.get(edge).map(|e| e.sources.as_slice())
    }

    fn get(&self, edge: EdgeId) -> Result<&MergedEdge> {
        self.edges.get(edge).ok_or(EnergyError::EdgeOutOfRange {
            edge,
            num_edges: self.edges.len(),
        })
    }

    fn index_of(&self, node: NodeId, label: &E::Label) -> Result<usize> {
        self.domains[node]
            .iter()
            .position(|l| l == label)
            .ok_or(EnergyError::LabelNotInDomain(node))
    }
}

impl<E: EnergyFunction> EnergyFunction for MergedEdges<E> {
    type Label = E::Label;

    fn num_nodes(&self) -> usize {
        self.inner.num_nodes()
    }

    fn num_edges(&self) -> usize {
        self.edges.len()
    }

    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId)> {
        self.get(edge).map(|e| (e.from, e.to))
    }

    fn possible_labels(&self, node: NodeId) -> Result<Vec<E::Label>> {
        self.inner.possible_labels(node)
    }

    fn unary_potential(&self, node: NodeId, label: &E::Label) -> Result<f64> {
        self.inner.unary_potential(node, label)
    }

    fn pairwise_potential(&self, edge: EdgeId, from_label: &E::Label, to_label: &E::Label) -> Result<f64> {
        let merged = self.get(edge)?;
        match &merged.table {
            None => self.inner.pairwise_potential(merged.sources[0], from_label, to_label),
            Some(table) => {
                let i = self.index_of(merged.from, from_label)?;
                let j = self.index_of(merged.to, to_label)?;
                Ok(table[i * self.domains[merged.to].len() + j])
            }
        }
    }

    fn assigned_label(&self, node: NodeId) -> Option<E::Label> {
        self.inner.assigned_label(node)
    }
}
