//! Solver boundary: the query the engine builds, the identity manager that
//! keeps it in sync with the arnodes, and the solver interface.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::types::{Result, VarId};

mod identity;
mod query;
mod reference;
mod simplex;

pub use identity::{IdentityManager, VarPair};
pub use query::{Addend, Equation, Query, Relu, FEASIBILITY_EPS};
pub use reference::CaseSplitSolver;

/// Options passed through to a solver call.
#[derive(Clone, Debug, Default)]
pub struct SolveOptions {
    /// Wall-clock budget; the solver fails with
    /// [`crate::types::CegarError::SolverTimeout`] once it is spent.
    pub timeout: Option<Duration>,
    /// File receiving one JSON stats record per call.
    pub log_path: Option<PathBuf>,
}

/// Counters reported by a solver call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SolveStats {
    /// Declared variables.
    pub variables: u64,
    /// Equations in the query.
    pub equations: usize,
    /// ReLU constraints in the query.
    pub relus: usize,
    /// Search nodes visited.
    pub explored: u64,
    /// Search nodes cut off as infeasible.
    pub pruned: u64,
    /// Whether an assignment was found.
    pub sat: bool,
    /// Wall-clock time spent.
    pub elapsed_ms: u64,
}

/// Result of a solver call. The assignment is empty iff the query is UNSAT.
#[derive(Clone, Debug, Default)]
pub struct SolveOutcome {
    /// Value of every variable.
    pub assignment: BTreeMap<VarId, f64>,
    /// Call statistics.
    pub stats: SolveStats,
}

impl SolveOutcome {
    /// Whether a satisfying assignment was found.
    pub fn is_sat(&self) -> bool {
        !self.assignment.is_empty()
    }
}

/// A constraint solver for [`Query`] objects. The engine never looks past
/// this interface.
pub trait Solver {
    /// Solves `query`. Must return an empty assignment iff it is UNSAT.
    fn solve(&mut self, query: &Query, options: &SolveOptions) -> Result<SolveOutcome>;
}

impl<S: Solver + ?Sized> Solver for &mut S {
    fn solve(&mut self, query: &Query, options: &SolveOptions) -> Result<SolveOutcome> {
        (**self).solve(query, options)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn solve(&mut self, query: &Query, options: &SolveOptions) -> Result<SolveOutcome> {
        (**self).solve(query, options)
    }
}
