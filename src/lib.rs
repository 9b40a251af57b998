//! Sum-product belief propagation over labeled graphs.
//!
//! A `Graph` plus a caller-supplied `PotentialHandler` form an `EnergyFunction`
//! (`GraphEnergy`); `MergedEdges` canonicalizes multi-edges; `SumProduct` and
//! `DirectedPropagation` compute per-node beliefs.

// NB declare the public modules.
pub mod directed;
pub mod energy;
pub mod error;
pub mod exact;
pub mod graph;
pub mod handler;
pub mod merge;
pub mod solver;
pub mod sum_product;
pub mod utils;

mod model;

pub use directed::DirectedPropagation;
pub use energy::{EnergyFunction, GraphEnergy, NodeKey};
pub use error::{EnergyError, Result};
pub use exact::exact_marginals;
pub use graph::{EdgeId, Graph, LabeledGraph, NodeId};
pub use handler::{AgreementPotentials, PotentialHandler, TablePotentials};
pub use merge::MergedEdges;
pub use solver::{Solver, SolverConfig};
pub use sum_product::SumProduct;
