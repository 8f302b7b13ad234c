use serde::{Deserialize, Serialize};

use crate::solver::{Query, FEASIBILITY_EPS};
use crate::storage::Goal;
use crate::types::VarId;

/// Output condition whose reachability is checked. UNSAT proves that no
/// admissible input drives the network output into the region.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Property {
    /// `output >= threshold` for some admissible input.
    OutputAtLeast {
        /// Output neuron index.
        output: usize,
        /// Lower bound put on the output variable.
        threshold: f64,
    },
    /// `output <= threshold` for some admissible input.
    OutputAtMost {
        /// Output neuron index.
        output: usize,
        /// Upper bound put on the output variable.
        threshold: f64,
    },
}

impl Property {
    /// Output neuron the property constrains.
    pub fn output(&self) -> usize {
        match *self {
            Property::OutputAtLeast { output, .. } | Property::OutputAtMost { output, .. } => {
                output
            }
        }
    }

    /// Direction in which the abstraction must over-approximate the output.
    pub fn goal(&self) -> Goal {
        match self {
            Property::OutputAtLeast { .. } => Goal::Maximize,
            Property::OutputAtMost { .. } => Goal::Minimize,
        }
    }

    /// Puts the property bound on `var`.
    pub fn apply(&self, var: VarId, mut set: impl FnMut(VarId, Bound)) {
        match *self {
            Property::OutputAtLeast { threshold, .. } => set(var, Bound::Lower(threshold)),
            Property::OutputAtMost { threshold, .. } => set(var, Bound::Upper(threshold)),
        }
    }

    /// Puts the property bound on `var` inside `query`.
    pub fn apply_to_query(&self, query: &mut Query, var: VarId) {
        self.apply(var, |var, bound| match bound {
            Bound::Lower(value) => query.set_lower_bound(var, value),
            Bound::Upper(value) => query.set_upper_bound(var, value),
        });
    }

    /// Whether concrete `outputs` fall inside the region.
    pub fn is_reached_by(&self, outputs: &[f64]) -> bool {
        let Some(&value) = outputs.get(self.output()) else {
            return false;
        };
        match *self {
            Property::OutputAtLeast { threshold, .. } => value >= threshold - FEASIBILITY_EPS,
            Property::OutputAtMost { threshold, .. } => value <= threshold + FEASIBILITY_EPS,
        }
    }
}

/// One side of a variable bound.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Bound {
    /// `var >= value`.
    Lower(f64),
    /// `var <= value`.
    Upper(f64),
}
