use serde::Serialize;
use tracing::{debug, info};

use super::config::CegarConfig;
use super::verify::{Counterexample, Verdict};
use super::Network;
use crate::solver::Solver;
use crate::types::{CegarError, Result};

/// Final answer of a CEGAR run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CegarOutcome {
    /// The property region is unreachable.
    Unsat,
    /// A concrete input reaches the property region.
    Sat {
        /// The witness.
        counterexample: Counterexample,
    },
    /// The run stopped before reaching an answer.
    Inconclusive {
        /// Why the run stopped.
        reason: String,
    },
}

/// Summary of a CEGAR run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CegarReport {
    /// Final answer.
    pub outcome: CegarOutcome,
    /// Merges applied while coarsening.
    pub merges: usize,
    /// Splits applied while refining.
    pub refinements: usize,
    /// Solver calls issued, abstract and concrete.
    pub solver_calls: usize,
}

/// Runs the abstraction-refinement loop on `network`.
///
/// Completes the abstraction, coarsens it with merges until no candidate is
/// left or the merge budget is spent, then alternates verification and
/// splits until the answer is not a spurious counterexample.
pub fn run_cegar(
    network: &mut Network,
    solver: &mut dyn Solver,
    config: &CegarConfig,
) -> Result<CegarReport> {
    let options = config.solve_options();
    let calls_before = network.solver_calls();
    network.abstract_network()?;

    let mut merges = 0;
    while config
        .refinement
        .merge_budget
        .map_or(true, |budget| merges < budget)
    {
        match network.decide_merge() {
            Ok(candidate) => {
                network.apply_merge(&candidate)?;
                merges += 1;
            }
            Err(err) if err.is_search_exhausted() => break,
            Err(err) => return Err(err),
        }
    }
    debug!(merges, "cegar.coarsened");

    let mut refinements = 0;
    let outcome = loop {
        let verdict = network.verify(solver, &options)?;
        info!(
            iteration = refinements,
            verdict = verdict_name(&verdict),
            "cegar.iteration"
        );
        match verdict {
            Verdict::Unsat => break CegarOutcome::Unsat,
            Verdict::Sat(counterexample) => break CegarOutcome::Sat { counterexample },
            Verdict::Spurious => {}
        }
        if config
            .refinement
            .max_refinements
            .is_some_and(|limit| refinements >= limit)
        {
            break CegarOutcome::Inconclusive {
                reason: format!("refinement budget of {refinements} splits spent"),
            };
        }
        match network.decide_split() {
            Ok(candidate) => {
                network.apply_split(&candidate)?;
                refinements += 1;
            }
            Err(CegarError::NoSplitCandidate) => {
                break CegarOutcome::Inconclusive {
                    reason: "spurious counterexample on a fully refined abstraction".into(),
                };
            }
            Err(err) => return Err(err),
        }
    };

    Ok(CegarReport {
        outcome,
        merges,
        refinements,
        solver_calls: network.solver_calls() - calls_before,
    })
}

fn verdict_name(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Sat(_) => "sat",
        Verdict::Unsat => "unsat",
        Verdict::Spurious => "spurious",
    }
}
