use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::VarId;

/// Tolerance used when checking an assignment against a query.
pub const FEASIBILITY_EPS: f64 = 1e-6;

/// One `coefficient * var` term of an equation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Addend {
    /// Coefficient.
    pub coefficient: f64,
    /// Variable.
    pub var: VarId,
}

/// Linear equation `Σ coefficient·var = scalar`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Equation {
    addends: Vec<Addend>,
    scalar: f64,
}

impl Equation {
    /// Creates `0 = 0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a term.
    pub fn add_addend(&mut self, coefficient: f64, var: VarId) {
        self.addends.push(Addend { coefficient, var });
    }

    /// Sets the right-hand side.
    pub fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    /// Terms in insertion order.
    pub fn addends(&self) -> &[Addend] {
        &self.addends
    }

    /// Right-hand side.
    pub fn scalar(&self) -> f64 {
        self.scalar
    }

    /// Value of the left-hand side under `assignment`; unknown variables read as 0.
    pub fn evaluate(&self, assignment: &BTreeMap<VarId, f64>) -> f64 {
        self.addends
            .iter()
            .map(|a| a.coefficient * assignment.get(&a.var).copied().unwrap_or(0.0))
            .sum()
    }
}

/// `output = max(0, input)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Relu {
    /// Pre-activation variable.
    pub input: VarId,
    /// Post-activation variable.
    pub output: VarId,
}

/// Input to a [`super::Solver`]: variables, bounds, equations and ReLU
/// constraints.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Query {
    variables: u64,
    lower: BTreeMap<VarId, f64>,
    upper: BTreeMap<VarId, f64>,
    equations: Vec<Equation>,
    relus: Vec<Relu>,
}

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares variables `0..n`.
    pub fn set_number_of_variables(&mut self, n: u64) {
        self.variables = n;
    }

    /// Number of declared variables.
    pub fn number_of_variables(&self) -> u64 {
        self.variables
    }

    /// Sets a lower bound, replacing any previous one.
    pub fn set_lower_bound(&mut self, var: VarId, value: f64) {
        self.lower.insert(var, value);
    }

    /// Sets an upper bound, replacing any previous one.
    pub fn set_upper_bound(&mut self, var: VarId, value: f64) {
        self.upper.insert(var, value);
    }

    /// Drops both bounds of `var`.
    pub fn remove_bounds(&mut self, var: VarId) {
        self.lower.remove(&var);
        self.upper.remove(&var);
    }

    /// Lower bound of `var`, if any.
    pub fn lower_bound(&self, var: VarId) -> Option<f64> {
        self.lower.get(&var).copied()
    }

    /// Upper bound of `var`, if any.
    pub fn upper_bound(&self, var: VarId) -> Option<f64> {
        self.upper.get(&var).copied()
    }

    /// Adds an equation.
    pub fn add_equation(&mut self, equation: Equation) {
        self.equations.push(equation);
    }

    /// Removes one equation equal to `equation`. Returns whether one was found.
    pub fn remove_equation(&mut self, equation: &Equation) -> bool {
        match self.equations.iter().position(|e| e == equation) {
            Some(index) => {
                self.equations.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Equations in the query.
    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    /// Adds `output = relu(input)`.
    pub fn add_relu_constraint(&mut self, input: VarId, output: VarId) {
        self.relus.push(Relu { input, output });
    }

    /// Removes `output = relu(input)`. Returns whether it was present.
    pub fn remove_relu_constraint(&mut self, input: VarId, output: VarId) -> bool {
        let relu = Relu { input, output };
        match self.relus.iter().position(|r| *r == relu) {
            Some(index) => {
                self.relus.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// ReLU constraints in the query.
    pub fn relus(&self) -> &[Relu] {
        &self.relus
    }

    /// Whether `assignment` meets every bound, equation and ReLU within
    /// [`FEASIBILITY_EPS`].
    pub fn is_satisfied_by(&self, assignment: &BTreeMap<VarId, f64>) -> bool {
        let value = |var: &VarId| assignment.get(var).copied().unwrap_or(0.0);
        let bounds_ok = self.lower.iter().all(|(v, &l)| value(v) >= l - FEASIBILITY_EPS)
            && self.upper.iter().all(|(v, &u)| value(v) <= u + FEASIBILITY_EPS);
        let equations_ok = self
            .equations
            .iter()
            .all(|e| (e.evaluate(assignment) - e.scalar).abs() <= FEASIBILITY_EPS);
        let relus_ok = self
            .relus
            .iter()
            .all(|r| (value(&r.output) - value(&r.input).max(0.0)).abs() <= FEASIBILITY_EPS);
        bounds_ok && equations_ok && relus_ok
    }
}
