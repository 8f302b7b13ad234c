use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Instant;

use tracing::debug;

use super::query::{Query, Relu};
use super::simplex::LinearProgram;
use super::{SolveOptions, SolveOutcome, SolveStats, Solver};
use crate::types::{CegarError, Result, VarId};

const RELU_EPS: f64 = 1e-7;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Active,
    Inactive,
}

/// Exact reference solver: depth-first enumeration of ReLU phases, each
/// partial assignment checked for linear feasibility before descending.
///
/// Undecided ReLUs are relaxed to `out >= 0, out >= in`; a decided phase
/// turns the ReLU into linear constraints. The search stops at the first
/// feasible point that also satisfies every ReLU.
#[derive(Clone, Debug, Default)]
pub struct CaseSplitSolver {
    last: Option<SolveStats>,
}

impl CaseSplitSolver {
    /// Creates a solver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of the most recent call.
    pub fn last_stats(&self) -> Option<&SolveStats> {
        self.last.as_ref()
    }
}

impl Solver for CaseSplitSolver {
    fn solve(&mut self, query: &Query, options: &SolveOptions) -> Result<SolveOutcome> {
        let started = Instant::now();
        let columns = usize::try_from(query.number_of_variables())
            .map_err(|_| CegarError::Solver("too many variables".into()))?;
        let base = linear_part(query, columns)?;
        let relus = query.relus();
        let mut stats = SolveStats {
            variables: query.number_of_variables(),
            equations: query.equations().len(),
            relus: relus.len(),
            ..SolveStats::default()
        };

        let mut found = None;
        let mut stack: Vec<Vec<Option<Phase>>> = vec![vec![None; relus.len()]];
        while let Some(phases) = stack.pop() {
            if let Some(limit) = options.timeout {
                if started.elapsed() > limit {
                    debug!(explored = stats.explored, "solver.reference.timeout");
                    return Err(CegarError::SolverTimeout);
                }
            }
            stats.explored += 1;
            let lp = with_phases(&base, relus, &phases)?;
            let Some(point) = lp.solve()? else {
                stats.pruned += 1;
                continue;
            };
            let violated = relus.iter().zip(&phases).position(|(relu, phase)| {
                phase.is_none() && !relu_holds(relu, &point)
            });
            match violated {
                None => {
                    found = Some(point);
                    break;
                }
                Some(index) => {
                    for phase in [Phase::Inactive, Phase::Active] {
                        let mut next = phases.clone();
                        next[index] = Some(phase);
                        stack.push(next);
                    }
                }
            }
        }

        let assignment: BTreeMap<VarId, f64> = found
            .map(|point| {
                point
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (VarId(i as u64), v))
                    .collect()
            })
            .unwrap_or_default();
        stats.sat = !assignment.is_empty();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            sat = stats.sat,
            explored = stats.explored,
            pruned = stats.pruned,
            elapsed_ms = stats.elapsed_ms,
            "solver.reference.solve"
        );
        if let Some(path) = &options.log_path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            serde_json::to_writer(&mut file, &stats)?;
            writeln!(file)?;
        }
        self.last = Some(stats.clone());
        Ok(SolveOutcome { assignment, stats })
    }
}

fn column(var: VarId, columns: usize) -> Result<usize> {
    usize::try_from(var.0)
        .ok()
        .filter(|&c| c < columns)
        .ok_or_else(|| CegarError::Solver(format!("{var} is not a declared variable")))
}

fn linear_part(query: &Query, columns: usize) -> Result<LinearProgram> {
    let mut lp = LinearProgram::new(columns);
    for c in 0..columns {
        let var = VarId(c as u64);
        if let Some(lower) = query.lower_bound(var) {
            lp.tighten_lower(c, lower);
        }
        if let Some(upper) = query.upper_bound(var) {
            lp.tighten_upper(c, upper);
        }
    }
    for equation in query.equations() {
        let mut coeffs = Vec::with_capacity(equation.addends().len());
        for addend in equation.addends() {
            coeffs.push((column(addend.var, columns)?, addend.coefficient));
        }
        lp.add_row(coeffs, equation.scalar(), equation.scalar());
    }
    Ok(lp)
}

fn with_phases(base: &LinearProgram, relus: &[Relu], phases: &[Option<Phase>]) -> Result<LinearProgram> {
    let columns = base.columns();
    let mut lp = base.clone();
    for (relu, phase) in relus.iter().zip(phases) {
        let input = column(relu.input, columns)?;
        let output = column(relu.output, columns)?;
        match phase {
            Some(Phase::Active) => {
                lp.tighten_lower(input, 0.0);
                lp.add_row(vec![(output, 1.0), (input, -1.0)], 0.0, 0.0);
            }
            Some(Phase::Inactive) => {
                lp.tighten_upper(input, 0.0);
                lp.tighten_lower(output, 0.0);
                lp.tighten_upper(output, 0.0);
            }
            None => {
                lp.tighten_lower(output, 0.0);
                lp.add_row(vec![(output, 1.0), (input, -1.0)], 0.0, f64::INFINITY);
            }
        }
    }
    Ok(lp)
}

fn relu_holds(relu: &Relu, point: &[f64]) -> bool {
    let value = |var: VarId| point.get(var.0 as usize).copied().unwrap_or(0.0);
    (value(relu.output) - value(relu.input).max(0.0)).abs() <= RELU_EPS
}
