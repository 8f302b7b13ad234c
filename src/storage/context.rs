use tracing::trace;

use super::arena::Arena;
use super::arnode::{ArNode, Constituents};
use super::entity::{self, Dir, Entity, Location};
use super::metrics::EngineMetrics;
use super::node::Node;
use super::reduction::ReductionPolicy;
use crate::solver::IdentityManager;
use crate::types::{ArNodeId, CegarError, NodeId, Result};

/// Every concrete node and arnode of one network.
#[derive(Default)]
pub struct EntityStore {
    pub(crate) nodes: Arena<NodeId, Node>,
    pub(crate) arnodes: Arena<ArNodeId, ArNode>,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows a live node.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id)
    }

    /// Borrows a live arnode.
    pub fn arnode(&self, id: ArNodeId) -> Result<&ArNode> {
        self.arnodes.get(id)
    }

    /// All live nodes.
    pub fn nodes(&self) -> &Arena<NodeId, Node> {
        &self.nodes
    }

    /// All live arnodes.
    pub fn arnodes(&self) -> &Arena<ArNodeId, ArNode> {
        &self.arnodes
    }

    /// Arnode wrapping `node`, failing with
    /// [`CegarError::UnresolvedAbstraction`] when there is none.
    pub fn owner_of(&self, node: NodeId) -> Result<ArNodeId> {
        self.nodes
            .get(node)?
            .owner()
            .ok_or(CegarError::UnresolvedAbstraction { node })
    }
}

/// Everything an abstraction operation touches besides the layer tables:
/// the entities, the solver identities, the reduction strategies and the
/// metrics sink. Built by the network for the duration of one operation.
pub struct AbstractionCtx<'a> {
    /// Entity storage.
    pub store: &'a mut EntityStore,
    /// Solver variables and the abstract query.
    pub ids: &'a mut IdentityManager,
    /// Reduction strategies per table.
    pub policy: &'a ReductionPolicy,
    /// Metrics sink.
    pub metrics: &'a dyn EngineMetrics,
}

impl AbstractionCtx<'_> {
    /// Creates an arnode at `location` over `constituents` and claims them.
    ///
    /// Every constituent must be cemented, unowned and sit at the arnode's
    /// layer and category. Boundary arnodes get one solver variable,
    /// interior ones two joined by a ReLU.
    pub fn spawn_arnode(
        &mut self,
        location: Location,
        constituents: Constituents,
        boundary: bool,
    ) -> Result<ArNodeId> {
        let mut biases = Vec::with_capacity(constituents.len());
        for &id in &constituents {
            let node = self.store.nodes.get(id)?;
            if node.location_mutable() {
                return Err(CegarError::NotCemented { node: id });
            }
            if let Some(owner) = node.owner() {
                return Err(CegarError::AlreadyOwned { node: id, owner });
            }
            let at = node.location();
            if at.layer != location.layer || at.category != location.category {
                return Err(CegarError::CategoryMismatch(format!(
                    "{id} at {at} cannot join an arnode at {location}"
                )));
            }
            biases.push(node.bias());
        }
        let bias = self
            .policy
            .bias(location.category)
            .reduce(biases)
            .ok_or_else(|| CegarError::InvalidArgument("arnode needs a constituent".into()))?;

        let vars = self.ids.borrow_vars(boundary)?;
        let members = constituents.clone();
        let id = match self
            .store
            .arnodes
            .try_insert_with(|_| Ok(ArNode::new(location, members, vars, bias)))
        {
            Ok(id) => id,
            Err(err) => {
                self.ids.release_vars(vars, None);
                return Err(err);
            }
        };
        for &node in &constituents {
            self.store.nodes.get_mut(node)?.set_owner(Some(id));
        }
        self.ids.mark_stale(id);
        self.metrics.arnode_created();
        trace!(arnode = %id, at = %location, members = constituents.len(), "arnode.spawn");
        Ok(id)
    }

    /// Destroys an arnode: unlinks it from its abstract neighbors, frees its
    /// constituents and returns its solver variables. Returns the former
    /// constituents.
    ///
    /// Downstream neighbors lose an incoming edge, so their equations go stale.
    pub fn destroy_arnode(&mut self, id: ArNodeId) -> Result<Constituents> {
        let (arnode, neighbors) = entity::destroy(&mut self.store.arnodes, id)?;
        for &node in arnode.constituents() {
            self.store.nodes.get_mut(node)?.set_owner(None);
        }
        for (dir, neighbor) in neighbors {
            if dir == Dir::Out {
                self.ids.mark_stale(neighbor);
            }
        }
        self.ids.forget(id);
        self.ids.release_vars(arnode.vars(), arnode.equation());
        self.metrics.arnode_destroyed();
        trace!(arnode = %id, at = %arnode.location(), "arnode.destroy");
        Ok(arnode.constituents().iter().copied().collect())
    }

    /// Rebuilds the equation of every stale arnode and installs it in the
    /// abstract query. Returns how many were rebuilt.
    pub fn refresh_equations(&mut self) -> Result<usize> {
        let mut rebuilt = 0;
        for id in self.ids.take_stale() {
            if !self.store.arnodes.contains(id) {
                continue;
            }
            let arnodes = &self.store.arnodes;
            let equation = arnodes
                .get(id)?
                .build_equation(|source| Ok(arnodes.get(source)?.vars().outgoing))?;
            let old = self.store.arnodes.get_mut(id)?.set_equation(equation.clone());
            self.ids.replace_equation(old.as_ref(), equation);
            rebuilt += 1;
        }
        trace!(rebuilt, "identity.refresh");
        Ok(rebuilt)
    }
}
