use serde::Serialize;
use tracing::debug;

use super::description::NetworkDescription;
use super::{Network, Property};
use crate::solver::{Equation, Query, SolveOptions, Solver};
use crate::types::{CegarError, Result, VarId};

/// Input that drives the concrete network into the property region.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Counterexample {
    /// Value of every network input, by input index.
    pub inputs: Vec<f64>,
    /// Value of every network output, by output index.
    pub outputs: Vec<f64>,
}

/// Result of checking the current abstraction.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// The concrete network reaches the region.
    Sat(Counterexample),
    /// Not even the abstraction reaches the region.
    Unsat,
    /// The abstraction reaches the region but the concrete network does not
    /// for the abstract witness input. The abstraction must be refined.
    Spurious,
}

/// Query over the unabstracted network, built once and never modified.
pub(crate) struct ConcreteQuery {
    query: Query,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
}

impl ConcreteQuery {
    /// Inputs and outputs get one variable each, hidden neurons a pre- and a
    /// post-activation variable joined by a ReLU constraint. Every non-input
    /// neuron contributes `-1·in + Σ w·src = -bias`.
    pub(crate) fn build(description: &dyn NetworkDescription, property: &Property) -> Result<Self> {
        let count = description.number_of_layers();
        let mut query = Query::new();
        let mut next = 0_u64;
        let mut fresh = || {
            let var = VarId(next);
            next += 1;
            var
        };

        let mut previous: Vec<VarId> = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for layer in 0..count {
            let width = description.nodes_in_layer(layer);
            let mut current = Vec::with_capacity(width);
            for neuron in 0..width {
                if layer == 0 {
                    let var = fresh();
                    let (lower, upper) = description.input_bounds(neuron);
                    query.set_lower_bound(var, lower);
                    query.set_upper_bound(var, upper);
                    inputs.push(var);
                    current.push(var);
                    continue;
                }
                let incoming = fresh();
                let mut equation = Equation::new();
                equation.add_addend(-1.0, incoming);
                for (src, &source) in previous.iter().enumerate() {
                    let weight = description.weight(layer, neuron, src);
                    if weight != 0.0 {
                        equation.add_addend(weight, source);
                    }
                }
                equation.set_scalar(-description.bias(layer, neuron));
                query.add_equation(equation);
                if layer == count - 1 {
                    outputs.push(incoming);
                    current.push(incoming);
                } else {
                    let outgoing = fresh();
                    query.add_relu_constraint(incoming, outgoing);
                    current.push(outgoing);
                }
            }
            previous = current;
        }

        let target = *outputs.get(property.output()).ok_or_else(|| {
            CegarError::InvalidArgument(format!("no output {}", property.output()))
        })?;
        property.apply_to_query(&mut query, target);
        query.set_number_of_variables(next);
        Ok(Self {
            query,
            inputs,
            outputs,
        })
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    /// Copy of the query with every input fixed to `values`.
    fn pinned(&self, values: &[f64]) -> Query {
        let mut query = self.query.clone();
        for (&var, &value) in self.inputs.iter().zip(values) {
            query.set_lower_bound(var, value);
            query.set_upper_bound(var, value);
        }
        query
    }
}

impl Network {
    /// Brings stale equations up to date and returns the abstract query.
    pub fn abstract_query(&mut self) -> Result<&Query> {
        self.ctx().refresh_equations()?;
        Ok(self.ids.prepared_query())
    }

    /// Query over the unabstracted network, property bound included.
    pub fn concrete_query(&self) -> &Query {
        self.concrete.query()
    }

    /// Checks the abstraction: SAT, UNSAT or spurious counterexample.
    ///
    /// UNSAT on the abstraction proves the property region unreachable. A
    /// SAT abstract assignment is replayed on the concrete query with the
    /// inputs pinned to the assignment's input values.
    pub fn verify(&mut self, solver: &mut dyn Solver, options: &SolveOptions) -> Result<Verdict> {
        if !self.frontier.is_complete() {
            return Err(CegarError::FrontierViolation(
                "verification needs every layer abstracted",
            ));
        }
        let refreshed = self.ctx().refresh_equations()?;
        let query = self.ids.prepared_query();
        self.metrics.solver_invoked("abstract");
        self.solver_calls += 1;
        let outcome = solver.solve(query, options)?;
        debug!(
            refreshed,
            variables = outcome.stats.variables,
            equations = outcome.stats.equations,
            sat = outcome.is_sat(),
            "network.verify.abstract"
        );
        if !outcome.is_sat() {
            return Ok(Verdict::Unsat);
        }

        let mut inputs = vec![0.0; self.concrete.inputs.len()];
        for id in self.layers[0].arnode_ids() {
            let arnode = self.store.arnode(id)?;
            for &member in arnode.constituents() {
                let neuron = self.store.node(member)?.origin().index;
                if let Some(slot) = inputs.get_mut(neuron) {
                    *slot = outcome
                        .assignment
                        .get(&arnode.vars().incoming)
                        .copied()
                        .unwrap_or(0.0);
                }
            }
        }

        let pinned = self.concrete.pinned(&inputs);
        self.metrics.solver_invoked("concrete");
        self.solver_calls += 1;
        let replay = solver.solve(&pinned, options)?;
        debug!(sat = replay.is_sat(), inputs = ?inputs, "network.verify.concrete");
        if !replay.is_sat() {
            return Ok(Verdict::Spurious);
        }
        let outputs = self
            .concrete
            .outputs
            .iter()
            .map(|var| replay.assignment.get(var).copied().unwrap_or(0.0))
            .collect();
        Ok(Verdict::Sat(Counterexample { inputs, outputs }))
    }

    /// Same as [`Network::verify`].
    pub fn check_sat_unsat_or_spurious(
        &mut self,
        solver: &mut dyn Solver,
        options: &SolveOptions,
    ) -> Result<Verdict> {
        self.verify(solver, options)
    }
}
