use serde::Serialize;
use smallvec::SmallVec;

use super::category::ARNODE_TABLES;
use super::edge_set::EdgeSet;
use super::entity::{Dir, Entity, Location};
use crate::solver::{Equation, VarPair};
use crate::types::{ArNodeId, CegarError, NodeId, Result, VarId};

/// Constituent list of an arnode. Most arnodes wrap a handful of nodes.
pub type Constituents = SmallVec<[NodeId; 4]>;

/// Activation state of an arnode. Only moves forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// No abstract edges yet.
    NotActivated,
    /// Outgoing edges are built; incoming edges are not trusted yet.
    ForwardActivated,
    /// Incoming edges are validated too; the arnode may be merged or split.
    FullyActivated,
}

impl ActivationState {
    /// Lowercase name used in errors and traces.
    pub fn name(self) -> &'static str {
        match self {
            ActivationState::NotActivated => "not_activated",
            ActivationState::ForwardActivated => "forward_activated",
            ActivationState::FullyActivated => "fully_activated",
        }
    }

    /// Moves to `to`. Staying put is allowed, going back is not.
    pub fn advance(&mut self, to: ActivationState) -> Result<()> {
        if to < *self {
            return Err(CegarError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            });
        }
        *self = to;
        Ok(())
    }
}

/// Abstract node: a group of cemented nodes of one category, seen by the
/// solver as a single neuron.
#[derive(Clone, Debug)]
pub struct ArNode {
    location: Location,
    edges: [EdgeSet<ArNodeId>; 2],
    constituents: Constituents,
    state: ActivationState,
    vars: VarPair,
    bias: f64,
    equation: Option<Equation>,
}

impl ArNode {
    pub(crate) fn new(location: Location, constituents: Constituents, vars: VarPair, bias: f64) -> Self {
        Self {
            location,
            edges: [EdgeSet::new(ARNODE_TABLES), EdgeSet::new(ARNODE_TABLES)],
            constituents,
            state: ActivationState::NotActivated,
            vars,
            bias,
            equation: None,
        }
    }

    /// Wrapped nodes.
    pub fn constituents(&self) -> &[NodeId] {
        &self.constituents
    }

    /// Whether `node` is wrapped by this arnode.
    pub fn contains(&self, node: NodeId) -> bool {
        self.constituents.contains(&node)
    }

    /// Activation state.
    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: ActivationState) -> Result<()> {
        self.state.advance(to)
    }

    /// Solver variables.
    pub fn vars(&self) -> VarPair {
        self.vars
    }

    /// Reduced bias of the constituents.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Equation currently installed in the query for this arnode.
    pub fn equation(&self) -> Option<&Equation> {
        self.equation.as_ref()
    }

    pub(crate) fn set_equation(&mut self, equation: Option<Equation>) -> Option<Equation> {
        std::mem::replace(&mut self.equation, equation)
    }

    /// Equation for the current incoming edges:
    /// `-1·in + Σ w·src.out = -bias`, with `source_var` resolving the
    /// outgoing variable of every incoming neighbor. `None` without incoming
    /// edges.
    pub fn build_equation<F>(&self, mut source_var: F) -> Result<Option<Equation>>
    where
        F: FnMut(ArNodeId) -> Result<VarId>,
    {
        let incoming = self.edges(Dir::In);
        if incoming.is_empty() {
            return Ok(None);
        }
        let mut equation = Equation::new();
        equation.add_addend(-1.0, self.vars.incoming);
        for edge in incoming.iter() {
            equation.add_addend(edge.weight, source_var(edge.neighbor)?);
        }
        equation.set_scalar(-self.bias);
        Ok(Some(equation))
    }
}

impl Entity for ArNode {
    type Key = ArNodeId;

    fn location(&self) -> Location {
        self.location
    }

    fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    fn location_mutable(&self) -> bool {
        false
    }

    fn edges(&self, dir: Dir) -> &EdgeSet<ArNodeId> {
        &self.edges[dir.index()]
    }

    fn edges_mut(&mut self, dir: Dir) -> &mut EdgeSet<ArNodeId> {
        &mut self.edges[dir.index()]
    }
}
