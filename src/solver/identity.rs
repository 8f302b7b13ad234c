use std::collections::BTreeSet;

use tracing::trace;

use super::query::{Equation, Query};
use crate::primitives::IdAllocator;
use crate::types::{ArNodeId, CegarError, Result, VarId};

/// Solver variables of one arnode.
///
/// Boundary arnodes (input and output layers) have a single variable, so
/// `incoming == outgoing`. Interior arnodes straddle a ReLU and get two.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VarPair {
    /// Pre-activation variable, the one the equation defines.
    pub incoming: VarId,
    /// Post-activation variable, the one downstream equations read.
    pub outgoing: VarId,
}

impl VarPair {
    /// Whether this pair belongs to a boundary arnode.
    pub fn is_boundary(&self) -> bool {
        self.incoming == self.outgoing
    }
}

/// Hands out solver variables to arnodes and keeps the abstract query in
/// sync with them.
///
/// One manager lives per network. Arnodes whose equation no longer matches
/// their incoming edges are tracked as stale and rebuilt on demand before
/// the next solve.
#[derive(Debug)]
pub struct IdentityManager {
    ids: IdAllocator,
    query: Query,
    stale: BTreeSet<ArNodeId>,
}

impl IdentityManager {
    /// Creates a manager issuing ids from `ids`.
    pub fn new(ids: IdAllocator) -> Self {
        Self {
            ids,
            query: Query::new(),
            stale: BTreeSet::new(),
        }
    }

    /// Borrows the variables of a new arnode, adding the ReLU constraint for
    /// interior ones.
    pub fn borrow_vars(&mut self, boundary: bool) -> Result<VarPair> {
        let incoming = VarId(self.ids.allocate()?);
        if boundary {
            return Ok(VarPair {
                incoming,
                outgoing: incoming,
            });
        }
        let outgoing = match self.ids.allocate() {
            Ok(id) => VarId(id),
            Err(err) => {
                self.ids.release(incoming.0);
                return Err(err);
            }
        };
        self.query.add_relu_constraint(incoming, outgoing);
        Ok(VarPair { incoming, outgoing })
    }

    /// Fails with [`CegarError::Exhausted`] unless `count` more variables
    /// can be borrowed.
    pub fn reserve(&self, count: u64) -> Result<()> {
        if self.ids.available() < count {
            return Err(CegarError::Exhausted {
                limit: self.ids.limit().unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Returns an arnode's variables and clears every bound, constraint and
    /// equation tied to them.
    pub fn release_vars(&mut self, vars: VarPair, equation: Option<&Equation>) {
        if let Some(equation) = equation {
            self.query.remove_equation(equation);
        }
        if !vars.is_boundary() {
            self.query.remove_relu_constraint(vars.incoming, vars.outgoing);
            self.query.remove_bounds(vars.outgoing);
            self.ids.release(vars.outgoing.0);
        }
        self.query.remove_bounds(vars.incoming);
        self.ids.release(vars.incoming.0);
        trace!(incoming = %vars.incoming, outgoing = %vars.outgoing, "identity.release");
    }

    /// Sets a lower bound on `var`.
    pub fn set_lower_bound(&mut self, var: VarId, value: f64) {
        self.query.set_lower_bound(var, value);
    }

    /// Sets an upper bound on `var`.
    pub fn set_upper_bound(&mut self, var: VarId, value: f64) {
        self.query.set_upper_bound(var, value);
    }

    /// Drops both bounds on `var`.
    pub fn remove_bounds(&mut self, var: VarId) {
        self.query.remove_bounds(var);
    }

    /// Flags `arnode` for an equation rebuild.
    pub fn mark_stale(&mut self, arnode: ArNodeId) {
        self.stale.insert(arnode);
    }

    /// Stops tracking a destroyed arnode.
    pub fn forget(&mut self, arnode: ArNodeId) {
        self.stale.remove(&arnode);
    }

    /// Whether `arnode` awaits an equation rebuild.
    pub fn is_stale(&self, arnode: ArNodeId) -> bool {
        self.stale.contains(&arnode)
    }

    /// Number of arnodes awaiting a rebuild.
    pub fn stale_count(&self) -> usize {
        self.stale.len()
    }

    /// Drains the stale set.
    pub fn take_stale(&mut self) -> Vec<ArNodeId> {
        std::mem::take(&mut self.stale).into_iter().collect()
    }

    /// Swaps an arnode's cached equation in the query.
    pub fn replace_equation(&mut self, old: Option<&Equation>, new: Option<Equation>) {
        if let Some(old) = old {
            self.query.remove_equation(old);
        }
        if let Some(new) = new {
            self.query.add_equation(new);
        }
    }

    /// Highest variable id ever issued.
    pub fn max_used(&self) -> Option<u64> {
        self.ids.max_used()
    }

    /// Query as of the last refresh, with the variable count set to cover
    /// every issued id.
    pub fn prepared_query(&mut self) -> &Query {
        let n = self.ids.max_used().map_or(0, |max| max + 1);
        self.query.set_number_of_variables(n);
        &self.query
    }

    /// Current query without touching the variable count.
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new(IdAllocator::unbounded())
    }
}
