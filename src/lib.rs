//! Counterexample-guided abstraction refinement for ReLU networks.
//!
//! The crate keeps a network as layered tables of concrete nodes wrapped by
//! abstract nodes (arnodes). Merging arnodes coarsens the abstraction,
//! splitting refines it, and every change is mirrored into a solver query
//! so that the abstraction can be checked at any point. See
//! [`network::run_cegar`] for the complete loop.

#![warn(missing_docs)]

pub mod network;
pub mod primitives;
pub mod solver;
pub mod storage;
pub mod types;

pub use network::{
    run_cegar, CegarConfig, CegarOutcome, CegarReport, Counterexample, DenseNetwork, Network,
    NetworkDescription, NetworkOptions, Property, Verdict,
};
pub use solver::{CaseSplitSolver, Query, SolveOptions, Solver};
pub use types::{CegarError, Result};
