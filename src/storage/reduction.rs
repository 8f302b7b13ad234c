use serde::{Deserialize, Serialize};

use super::category::{Category, ARNODE_TABLES};

/// Closed set of strategies used to fold several weights or biases into one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Largest value.
    Max,
    /// Smallest value.
    Min,
    /// Sum of all values.
    Sum,
}

impl Reduction {
    /// Folds `values`; `None` for an empty input.
    pub fn reduce<I>(self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, v| match self {
            Reduction::Max => acc.max(v),
            Reduction::Min => acc.min(v),
            Reduction::Sum => acc + v,
        }))
    }
}

/// Direction in which the abstraction must over-approximate the output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// The property asks whether the output can get large.
    Maximize,
    /// The property asks whether the output can get small.
    Minimize,
}

/// Reduction strategies per arnode table.
///
/// `incoming` folds the weights entering the members of a destination
/// arnode, `outgoing` folds across the members of a source arnode and `bias`
/// folds member biases.
#[derive(Clone, Debug, PartialEq)]
pub struct ReductionPolicy {
    incoming: [Reduction; ARNODE_TABLES],
    outgoing: [Reduction; ARNODE_TABLES],
    bias: [Reduction; ARNODE_TABLES],
}

impl ReductionPolicy {
    /// Policy for a verification goal: increasing tables take the larger
    /// incoming weight when maximizing and the smaller one when minimizing,
    /// decreasing tables the opposite. Outgoing weights and biases are summed;
    /// see [`ReductionPolicy::with_bias`] for networks with negative biases.
    pub fn for_goal(goal: Goal) -> Self {
        let (up, down) = match goal {
            Goal::Maximize => (Reduction::Max, Reduction::Min),
            Goal::Minimize => (Reduction::Min, Reduction::Max),
        };
        let incoming = Category::CEMENTED.map(|cat| match cat.is_increasing() {
            Some(false) => down,
            _ => up,
        });
        Self {
            incoming,
            outgoing: [Reduction::Sum; ARNODE_TABLES],
            bias: [Reduction::Sum; ARNODE_TABLES],
        }
    }

    /// Same reduction for every table, handy when merges must be undone
    /// exactly by splits.
    pub fn uniform(incoming: Reduction, outgoing: Reduction, bias: Reduction) -> Self {
        Self {
            incoming: [incoming; ARNODE_TABLES],
            outgoing: [outgoing; ARNODE_TABLES],
            bias: [bias; ARNODE_TABLES],
        }
    }

    /// Replaces the bias reduction of every table.
    ///
    /// Summing is only safe while biases are non-negative: two members with
    /// bias `-1` merge into one with bias `-2`, below what either neuron
    /// computes.
    pub fn with_bias(mut self, reduction: Reduction) -> Self {
        self.bias = [reduction; ARNODE_TABLES];
        self
    }

    /// Incoming reduction for arnodes of `category`.
    pub fn incoming(&self, category: Category) -> Reduction {
        self.incoming[table(category)]
    }

    /// Outgoing reduction for arnodes of `category`.
    pub fn outgoing(&self, category: Category) -> Reduction {
        self.outgoing[table(category)]
    }

    /// Bias reduction for arnodes of `category`.
    pub fn bias(&self, category: Category) -> Reduction {
        self.bias[table(category)]
    }
}

impl Default for ReductionPolicy {
    fn default() -> Self {
        Self::for_goal(Goal::Maximize)
    }
}

// Arnodes never live in the unprocessed table; fall back to the first table.
fn table(category: Category) -> usize {
    if category.is_cemented() {
        category.index()
    } else {
        0
    }
}
