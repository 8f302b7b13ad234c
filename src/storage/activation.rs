//! Arnode activation: building abstract edges out of concrete ones.
//!
//! The weight of the abstract edge `S -> D` folds the concrete weights in two
//! stages. For every member `s` of `S` the weights into the members of `D`
//! are reduced with `D`'s incoming strategy (a missing concrete edge counts
//! as zero), then those per-member values are reduced with `S`'s outgoing
//! strategy. Forward activation and incoming recalculation both go through
//! [`AbstractionCtx::abstract_weight`], so they always agree.

use std::collections::BTreeSet;

use tracing::trace;

use super::arnode::ActivationState;
use super::context::{AbstractionCtx, EntityStore};
use super::entity::{self, Dir, Entity};
use super::reduction::ReductionPolicy;
use crate::types::{ArNodeId, CegarError, Result};

impl AbstractionCtx<'_> {
    /// Weight of the abstract edge `source -> dest`, `None` when no member
    /// of `source` has a concrete edge into a member of `dest`.
    pub fn abstract_weight(&self, source: ArNodeId, dest: ArNodeId) -> Result<Option<f64>> {
        abstract_weight(self.store, self.policy, source, dest)
    }

    /// Builds the outgoing abstract edges of `id`. No-op once the arnode is
    /// at least forward activated.
    ///
    /// Every outgoing neighbor of every constituent must already be wrapped.
    pub fn forward_activate(&mut self, id: ArNodeId) -> Result<()> {
        if self.store.arnodes.get(id)?.state() >= ActivationState::ForwardActivated {
            return Ok(());
        }
        for dest in neighbor_owners(self.store, id, Dir::Out)? {
            if let Some(weight) = self.abstract_weight(id, dest)? {
                entity::add_or_edit_neighbor(&mut self.store.arnodes, id, Dir::Out, dest, weight, true)?;
                self.ids.mark_stale(dest);
            }
        }
        self.store
            .arnodes
            .get_mut(id)?
            .advance(ActivationState::ForwardActivated)?;
        trace!(arnode = %id, "arnode.forward_activate");
        Ok(())
    }

    /// Rebuilds the incoming abstract edges of a forward activated arnode
    /// from its constituents and moves it to fully activated. No-op when
    /// already fully activated.
    ///
    /// Every source arnode must be forward activated; incoming edges from
    /// arnodes that no longer feed any constituent are dropped.
    pub fn fully_activate_recalculating_incoming(&mut self, id: ArNodeId) -> Result<()> {
        let state = self.store.arnodes.get(id)?.state();
        if state == ActivationState::FullyActivated {
            return Ok(());
        }
        require_forward(state)?;

        let sources = neighbor_owners(self.store, id, Dir::In)?;
        for &source in &sources {
            if self.store.arnodes.get(source)?.state() < ActivationState::ForwardActivated {
                return Err(CegarError::SourceNotReady {
                    source_arnode: source,
                });
            }
        }
        let current: Vec<ArNodeId> = self
            .store
            .arnodes
            .get(id)?
            .edges(Dir::In)
            .iter()
            .map(|edge| edge.neighbor)
            .collect();
        for neighbor in current {
            if !sources.contains(&neighbor) {
                entity::remove_neighbor(&mut self.store.arnodes, id, Dir::In, neighbor, true)?;
            }
        }
        for source in sources {
            match self.abstract_weight(source, id)? {
                Some(weight) => entity::add_or_edit_neighbor(
                    &mut self.store.arnodes,
                    id,
                    Dir::In,
                    source,
                    weight,
                    true,
                )?,
                None => {
                    let key = self.store.arnodes.get(source)?.location().edge_key();
                    if self.store.arnodes.get(id)?.edges(Dir::In).get(key).is_some() {
                        entity::remove_neighbor(&mut self.store.arnodes, id, Dir::In, source, true)?;
                    }
                }
            }
        }
        self.ids.mark_stale(id);
        self.store
            .arnodes
            .get_mut(id)?
            .advance(ActivationState::FullyActivated)?;
        trace!(arnode = %id, "arnode.fully_activate.recalculated");
        Ok(())
    }

    /// Moves a forward activated arnode to fully activated, trusting the
    /// incoming edges the upstream layer installed. With `check_validity`
    /// every incoming edge must come from a live, forward activated arnode.
    pub fn fully_activate_without_changing_incoming(
        &mut self,
        id: ArNodeId,
        check_validity: bool,
    ) -> Result<()> {
        let arnode = self.store.arnodes.get(id)?;
        if arnode.state() == ActivationState::FullyActivated {
            return Ok(());
        }
        require_forward(arnode.state())?;
        if check_validity {
            for edge in arnode.edges(Dir::In).iter() {
                let source = self.store.arnodes.get(edge.neighbor)?;
                if source.state() < ActivationState::ForwardActivated {
                    return Err(CegarError::SourceNotReady {
                        source_arnode: edge.neighbor,
                    });
                }
            }
        }
        self.store
            .arnodes
            .get_mut(id)?
            .advance(ActivationState::FullyActivated)?;
        trace!(arnode = %id, check_validity, "arnode.fully_activate");
        Ok(())
    }
}

fn require_forward(state: ActivationState) -> Result<()> {
    if state < ActivationState::ForwardActivated {
        return Err(CegarError::InvalidTransition {
            from: state.name(),
            to: ActivationState::FullyActivated.name(),
        });
    }
    Ok(())
}

/// Owners of the concrete neighbors of `id`'s constituents in direction `dir`.
fn neighbor_owners(store: &EntityStore, id: ArNodeId, dir: Dir) -> Result<BTreeSet<ArNodeId>> {
    let mut owners = BTreeSet::new();
    for &member in store.arnodes.get(id)?.constituents() {
        for edge in store.nodes.get(member)?.edges(dir).iter() {
            owners.insert(store.owner_of(edge.neighbor)?);
        }
    }
    Ok(owners)
}

pub(crate) fn abstract_weight(
    store: &EntityStore,
    policy: &ReductionPolicy,
    source: ArNodeId,
    dest: ArNodeId,
) -> Result<Option<f64>> {
    let src = store.arnodes.get(source)?;
    let dst = store.arnodes.get(dest)?;
    let incoming = policy.incoming(dst.location().category);
    let outgoing = policy.outgoing(src.location().category);

    let mut dest_keys = Vec::with_capacity(dst.constituents().len());
    for &member in dst.constituents() {
        dest_keys.push(store.nodes.get(member)?.location().edge_key());
    }

    let mut connected = false;
    let mut per_source = Vec::with_capacity(src.constituents().len());
    for &member in src.constituents() {
        let edges = store.nodes.get(member)?.edges(Dir::Out);
        let weights = dest_keys.iter().map(|&key| match edges.get(key) {
            Some(edge) => {
                connected = true;
                edge.weight
            }
            None => 0.0,
        });
        if let Some(reduced) = incoming.reduce(weights.collect::<Vec<_>>()) {
            per_source.push(reduced);
        }
    }
    if !connected {
        return Ok(None);
    }
    Ok(outgoing.reduce(per_source))
}
