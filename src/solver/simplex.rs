//! Feasibility check for linear constraints over bounded variables.
//!
//! General simplex in the style of Dutertre and de Moura: every row gets a
//! slack variable equal to its linear expression, all bounds live on
//! variables, and a violated basic variable is repaired by pivoting with a
//! non-basic one that still has room. Bland's rule (smallest index first)
//! keeps the search from cycling.

use crate::types::{CegarError, Result};

const EPS: f64 = 1e-9;
const PIVOT_EPS: f64 = 1e-12;

#[derive(Clone, Debug)]
struct Row {
    coeffs: Vec<(usize, f64)>,
    lower: f64,
    upper: f64,
}

/// Linear constraints `lower <= Σ coeff·x <= upper` plus per-variable bounds.
#[derive(Clone, Debug)]
pub(crate) struct LinearProgram {
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<Row>,
}

impl LinearProgram {
    /// Creates a program over `columns` unbounded variables.
    pub(crate) fn new(columns: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; columns],
            upper: vec![f64::INFINITY; columns],
            rows: Vec::new(),
        }
    }

    pub(crate) fn columns(&self) -> usize {
        self.lower.len()
    }

    /// Raises the lower bound of `var` to at least `value`.
    pub(crate) fn tighten_lower(&mut self, var: usize, value: f64) {
        if let Some(lower) = self.lower.get_mut(var) {
            *lower = lower.max(value);
        }
    }

    /// Lowers the upper bound of `var` to at most `value`.
    pub(crate) fn tighten_upper(&mut self, var: usize, value: f64) {
        if let Some(upper) = self.upper.get_mut(var) {
            *upper = upper.min(value);
        }
    }

    /// Adds `lower <= Σ coeff·x <= upper`.
    pub(crate) fn add_row(&mut self, coeffs: Vec<(usize, f64)>, lower: f64, upper: f64) {
        self.rows.push(Row {
            coeffs,
            lower,
            upper,
        });
    }

    /// Finds a point satisfying every row and bound, `None` if there is none.
    pub(crate) fn solve(&self) -> Result<Option<Vec<f64>>> {
        Tableau::new(self)?.check()
    }
}

struct Tableau {
    columns: usize,
    lower: Vec<f64>,
    upper: Vec<f64>,
    values: Vec<f64>,
    /// `rows[i]` expresses `basic[i]` over the non-basic variables.
    rows: Vec<Vec<f64>>,
    basic: Vec<usize>,
    iteration_limit: usize,
}

impl Tableau {
    fn new(lp: &LinearProgram) -> Result<Self> {
        let columns = lp.columns();
        let total = columns + lp.rows.len();
        let mut lower = lp.lower.clone();
        let mut upper = lp.upper.clone();
        let mut rows = Vec::with_capacity(lp.rows.len());
        let mut basic = Vec::with_capacity(lp.rows.len());
        for (i, row) in lp.rows.iter().enumerate() {
            let mut dense = vec![0.0; total];
            for &(var, coeff) in &row.coeffs {
                let slot = dense.get_mut(var).filter(|_| var < columns).ok_or_else(|| {
                    CegarError::Solver(format!("row {i} references unknown variable {var}"))
                })?;
                *slot += coeff;
            }
            rows.push(dense);
            basic.push(columns + i);
            lower.push(row.lower);
            upper.push(row.upper);
        }

        let mut values: Vec<f64> = lower
            .iter()
            .zip(&upper)
            .map(|(&l, &u)| 0.0_f64.max(l).min(u))
            .collect();
        for (row, &b) in rows.iter().zip(&basic) {
            values[b] = dot(row, &values);
        }
        Ok(Self {
            columns,
            lower,
            upper,
            values,
            rows,
            basic,
            iteration_limit: 1_000 + 50 * total,
        })
    }

    fn check(mut self) -> Result<Option<Vec<f64>>> {
        if self
            .lower
            .iter()
            .zip(&self.upper)
            .any(|(&l, &u)| l > u + EPS)
        {
            return Ok(None);
        }
        for _ in 0..self.iteration_limit {
            let Some((row, below)) = self.violated_basic() else {
                self.values.truncate(self.columns);
                return Ok(Some(self.values));
            };
            let Some(entering) = self.entering(row, below) else {
                return Ok(None);
            };
            let b = self.basic[row];
            let target = if below { self.lower[b] } else { self.upper[b] };
            self.pivot_and_update(row, entering, target);
        }
        Err(CegarError::Solver(format!(
            "simplex made no progress after {} pivots",
            self.iteration_limit
        )))
    }

    /// Row of the smallest-index basic variable outside its bounds, and
    /// whether it sits below its lower bound.
    fn violated_basic(&self) -> Option<(usize, bool)> {
        self.basic
            .iter()
            .enumerate()
            .filter_map(|(row, &b)| {
                let v = self.values[b];
                if v < self.lower[b] - EPS {
                    Some((b, row, true))
                } else if v > self.upper[b] + EPS {
                    Some((b, row, false))
                } else {
                    None
                }
            })
            .min_by_key(|&(b, _, _)| b)
            .map(|(_, row, below)| (row, below))
    }

    /// Smallest-index non-basic variable able to move the basic variable of
    /// `row` in the needed direction.
    fn entering(&self, row: usize, increase: bool) -> Option<usize> {
        let coeffs = &self.rows[row];
        (0..coeffs.len()).find(|&j| {
            let a = coeffs[j];
            if a.abs() <= PIVOT_EPS || self.basic.contains(&j) {
                return false;
            }
            let can_rise = self.values[j] < self.upper[j] - EPS;
            let can_fall = self.values[j] > self.lower[j] + EPS;
            if increase {
                (a > 0.0 && can_rise) || (a < 0.0 && can_fall)
            } else {
                (a > 0.0 && can_fall) || (a < 0.0 && can_rise)
            }
        })
    }

    fn pivot_and_update(&mut self, row: usize, entering: usize, target: f64) {
        let b = self.basic[row];
        let a = self.rows[row][entering];
        let theta = (target - self.values[b]) / a;
        self.values[entering] += theta;
        for (k, coeffs) in self.rows.iter().enumerate() {
            let basic = self.basic[k];
            self.values[basic] += coeffs[entering] * theta;
        }
        self.values[b] = target;
        self.pivot(row, entering);
    }

    /// Makes `entering` basic in `row` and `basic[row]` non-basic.
    fn pivot(&mut self, row: usize, entering: usize) {
        let leaving = self.basic[row];
        let a = self.rows[row][entering];
        let mut pivot_row: Vec<f64> = self.rows[row].iter().map(|&c| -c / a).collect();
        pivot_row[entering] = 0.0;
        pivot_row[leaving] = 1.0 / a;

        for (k, coeffs) in self.rows.iter_mut().enumerate() {
            if k == row {
                continue;
            }
            let c = coeffs[entering];
            if c.abs() <= PIVOT_EPS {
                coeffs[entering] = 0.0;
                continue;
            }
            coeffs[entering] = 0.0;
            for (dst, &src) in coeffs.iter_mut().zip(&pivot_row) {
                *dst += c * src;
            }
        }
        self.rows[row] = pivot_row;
        self.basic[row] = entering;
    }
}

fn dot(row: &[f64], values: &[f64]) -> f64 {
    row.iter().zip(values).map(|(a, v)| a * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-7
    }

    #[test]
    fn finds_a_point_inside_the_box() {
        // x + y = 3, x in [0, 1], y in [0, 5]
        let mut lp = LinearProgram::new(2);
        lp.tighten_lower(0, 0.0);
        lp.tighten_upper(0, 1.0);
        lp.tighten_lower(1, 0.0);
        lp.tighten_upper(1, 5.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], 3.0, 3.0);
        let point = lp.solve().unwrap().unwrap();
        assert!(close(point[0] + point[1], 3.0));
        assert!(point[0] >= -1e-9 && point[0] <= 1.0 + 1e-9);
        assert!(point[1] >= -1e-9 && point[1] <= 5.0 + 1e-9);
    }

    #[test]
    fn detects_infeasibility() {
        // x + y >= 5 with x, y in [0, 2]
        let mut lp = LinearProgram::new(2);
        for var in 0..2 {
            lp.tighten_lower(var, 0.0);
            lp.tighten_upper(var, 2.0);
        }
        lp.add_row(vec![(0, 1.0), (1, 1.0)], 5.0, f64::INFINITY);
        assert!(lp.solve().unwrap().is_none());
    }

    #[test]
    fn crossed_bounds_are_infeasible() {
        let mut lp = LinearProgram::new(1);
        lp.tighten_lower(0, 1.0);
        lp.tighten_upper(0, 0.0);
        assert!(lp.solve().unwrap().is_none());
    }

    #[test]
    fn chains_of_equalities_propagate() {
        // y = 2x + 1, z = y - x, z >= 1.5, x in [0, 1]
        let mut lp = LinearProgram::new(3);
        lp.tighten_lower(0, 0.0);
        lp.tighten_upper(0, 1.0);
        lp.tighten_lower(2, 1.5);
        lp.add_row(vec![(1, -1.0), (0, 2.0)], -1.0, -1.0);
        lp.add_row(vec![(2, -1.0), (1, 1.0), (0, -1.0)], 0.0, 0.0);
        let point = lp.solve().unwrap().unwrap();
        assert!(close(point[1], 2.0 * point[0] + 1.0));
        assert!(close(point[2], point[1] - point[0]));
        assert!(point[2] >= 1.5 - 1e-9);
    }

    #[test]
    fn unknown_variables_are_rejected() {
        let mut lp = LinearProgram::new(1);
        lp.add_row(vec![(3, 1.0)], 0.0, 0.0);
        assert!(matches!(lp.solve(), Err(CegarError::Solver(_))));
    }
}
