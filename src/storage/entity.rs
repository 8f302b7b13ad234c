use std::fmt;

use tracing::trace;

use super::arena::Arena;
use super::category::Category;
use super::edge_set::{EdgeKey, EdgeSet};
use crate::types::{ArenaKey, CegarError, Result, Slot};

/// Edge direction relative to an entity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Dir {
    /// Edges from the previous layer.
    In,
    /// Edges into the next layer.
    Out,
}

impl Dir {
    /// Direction of the mirrored back-edge.
    pub fn reverse(self) -> Dir {
        match self {
            Dir::In => Dir::Out,
            Dir::Out => Dir::In,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Dir::In => 0,
            Dir::Out => 1,
        }
    }
}

/// Where an entity sits: layer, table and slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location {
    /// Layer index, 0 being the input layer.
    pub layer: usize,
    /// Table inside the layer.
    pub category: Category,
    /// Slot inside the table.
    pub slot: Slot,
}

impl Location {
    /// Key under which neighbors store edges to this location.
    pub fn edge_key(self) -> EdgeKey {
        EdgeKey::new(self.category, self.slot)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}/{}", self.layer, self.category, self.slot)
    }
}

/// A graph vertex stored in an [`Arena`]: concrete nodes and arnodes alike.
pub trait Entity {
    /// Handle type of this entity kind.
    type Key: ArenaKey;

    /// Current location.
    fn location(&self) -> Location;

    /// Overwrites the location; only [`relocate`] calls this.
    fn set_location(&mut self, location: Location);

    /// Whether [`relocate`] may move this entity.
    fn location_mutable(&self) -> bool;

    /// Edges in one direction.
    fn edges(&self, dir: Dir) -> &EdgeSet<Self::Key>;

    /// Mutable edges in one direction.
    fn edges_mut(&mut self, dir: Dir) -> &mut EdgeSet<Self::Key>;
}

/// Adds or re-weights the edge `from -dir-> to`, optionally writing the
/// mirrored back-edge on `to`.
///
/// Skip mirroring only when neither endpoint will ever relocate or be
/// destroyed; a missing back-edge makes those operations miss the neighbor.
pub fn add_or_edit_neighbor<E: Entity>(
    arena: &mut Arena<E::Key, E>,
    from: E::Key,
    dir: Dir,
    to: E::Key,
    weight: f64,
    mirror: bool,
) -> Result<()> {
    let to_key = arena.get(to)?.location().edge_key();
    let from_key = arena.get(from)?.location().edge_key();
    arena.get_mut(from)?.edges_mut(dir).add(to_key, weight, to)?;
    if mirror {
        arena
            .get_mut(to)?
            .edges_mut(dir.reverse())
            .add(from_key, weight, from)?;
    }
    Ok(())
}

/// Removes the edge `from -dir-> to`, and its back-edge when `mirror` is set.
/// Returns the removed weight.
pub fn remove_neighbor<E: Entity>(
    arena: &mut Arena<E::Key, E>,
    from: E::Key,
    dir: Dir,
    to: E::Key,
    mirror: bool,
) -> Result<f64> {
    let to_key = arena.get(to)?.location().edge_key();
    let from_key = arena.get(from)?.location().edge_key();
    let edge = arena.get_mut(from)?.edges_mut(dir).remove(to_key)?;
    if mirror {
        arena
            .get_mut(to)?
            .edges_mut(dir.reverse())
            .remove(from_key)?;
    }
    Ok(edge.weight)
}

/// Moves an entity to `(category, slot)` of its layer and re-keys every
/// back-edge its neighbors hold. Returns the previous location.
///
/// The caller updates the tables themselves.
pub fn relocate<E: Entity>(
    arena: &mut Arena<E::Key, E>,
    id: E::Key,
    category: Category,
    slot: Slot,
) -> Result<Location> {
    let entity = arena.get_mut(id)?;
    if !entity.location_mutable() {
        return Err(CegarError::Immutable {
            entity: format!("{id:?} at {}", entity.location()),
        });
    }
    let old = entity.location();
    entity.set_location(Location {
        layer: old.layer,
        category,
        slot,
    });
    notify_neighbors_relocated(arena, id, old)?;
    trace!(?id, from = %old, to = %arena.get(id)?.location(), "entity.relocate");
    Ok(old)
}

fn notify_neighbors_relocated<E: Entity>(
    arena: &mut Arena<E::Key, E>,
    id: E::Key,
    old: Location,
) -> Result<()> {
    let entity = arena.get(id)?;
    let new_key = entity.location().edge_key();
    let neighbors: Vec<(Dir, E::Key)> = [Dir::In, Dir::Out]
        .into_iter()
        .flat_map(|dir| entity.edges(dir).iter().map(move |e| (dir, e.neighbor)))
        .collect();
    for (dir, neighbor) in neighbors {
        arena
            .get_mut(neighbor)?
            .edges_mut(dir.reverse())
            .move_edge(old.edge_key(), new_key, false)?;
    }
    Ok(())
}

/// Unlinks an entity from every neighbor and tombstones it.
///
/// Only the neighbors' edge sets are touched; the entity's own sets are
/// dropped with it. Returns the entity and the neighbors it was linked to,
/// tagged with the direction as seen from the destroyed entity.
pub fn destroy<E: Entity>(
    arena: &mut Arena<E::Key, E>,
    id: E::Key,
) -> Result<(E, Vec<(Dir, E::Key)>)> {
    let entity = arena.get(id)?;
    let key = entity.location().edge_key();
    let neighbors: Vec<(Dir, E::Key)> = [Dir::In, Dir::Out]
        .into_iter()
        .flat_map(|dir| entity.edges(dir).iter().map(move |e| (dir, e.neighbor)))
        .collect();
    for &(dir, neighbor) in &neighbors {
        arena
            .get_mut(neighbor)?
            .edges_mut(dir.reverse())
            .remove(key)?;
    }
    let entity = arena.remove(id)?;
    Ok((entity, neighbors))
}
