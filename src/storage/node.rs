use serde::{Deserialize, Serialize};

use super::category::NODE_TABLES;
use super::edge_set::EdgeSet;
use super::entity::{Dir, Entity, Location};
use crate::types::{ArNodeId, NodeId};

/// Neuron of the network description a node was created from.
///
/// Sign/monotonicity splitting turns one neuron into several nodes that all
/// share the same origin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NeuronRef {
    /// Layer of the neuron.
    pub layer: usize,
    /// Index of the neuron inside its layer.
    pub index: usize,
}

/// Concrete network node.
#[derive(Clone, Debug)]
pub struct Node {
    location: Location,
    edges: [EdgeSet<NodeId>; 2],
    owner: Option<ArNodeId>,
    location_mutable: bool,
    bias: f64,
    origin: NeuronRef,
}

impl Node {
    /// Creates a movable node with no edges.
    pub fn new(location: Location, bias: f64, origin: NeuronRef) -> Self {
        Self {
            location,
            edges: [EdgeSet::new(NODE_TABLES), EdgeSet::new(NODE_TABLES)],
            owner: None,
            location_mutable: true,
            bias,
            origin,
        }
    }

    /// Creates a node whose location is fixed from the start.
    pub fn cemented(location: Location, bias: f64, origin: NeuronRef) -> Self {
        let mut node = Self::new(location, bias, origin);
        node.cement();
        node
    }

    /// Fixes the node's location for good.
    pub fn cement(&mut self) {
        self.location_mutable = false;
    }

    /// Bias of the neuron.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Originating neuron.
    pub fn origin(&self) -> NeuronRef {
        self.origin
    }

    /// Arnode wrapping this node, if any.
    pub fn owner(&self) -> Option<ArNodeId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<ArNodeId>) {
        self.owner = owner;
    }
}

impl Entity for Node {
    type Key = NodeId;

    fn location(&self) -> Location {
        self.location
    }

    fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    fn location_mutable(&self) -> bool {
        self.location_mutable
    }

    fn edges(&self, dir: Dir) -> &EdgeSet<NodeId> {
        &self.edges[dir.index()]
    }

    fn edges_mut(&mut self, dir: Dir) -> &mut EdgeSet<NodeId> {
        &mut self.edges[dir.index()]
    }
}
