use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::{Layer, LayerRole};
use crate::storage::arnode::ActivationState;
use crate::storage::category::{Category, ARNODE_TABLES};
use crate::storage::context::AbstractionCtx;
use crate::storage::edge_set::EdgeRef;
use crate::storage::entity::{self, Dir, Entity, Location};
use crate::storage::node::Node;
use crate::types::{ArNodeId, CegarError, NodeId, Result};

impl Layer {
    /// Classifies one unprocessed node and wraps the result.
    ///
    /// Input nodes and nodes without outgoing edges move verbatim into the
    /// positive-increasing table. Any other node is split by the category
    /// each outgoing edge implies: every non-empty bucket becomes a cemented
    /// copy carrying that bucket's outgoing edges and all incoming edges,
    /// and the original is destroyed. Returns the new singleton arnodes.
    pub fn split_unprocessed_node(
        &mut self,
        ctx: &mut AbstractionCtx<'_>,
        id: NodeId,
    ) -> Result<Vec<ArNodeId>> {
        let node = ctx.store.node(id)?;
        let location = node.location();
        self.check_layer(location)?;
        if location.category != Category::Unprocessed {
            return Err(CegarError::InvalidArgument(format!(
                "{id} at {location} is already classified"
            )));
        }

        if self.role == LayerRole::Input || node.edges(Dir::Out).is_empty() {
            let target = Category::PositiveIncreasing;
            let (slot, _) = self.nodes.insert_with(target.index(), |_| Ok(id))?;
            let old = entity::relocate(&mut ctx.store.nodes, id, target, slot)?;
            self.nodes.remove(Category::Unprocessed.index(), old.slot)?;
            ctx.store.nodes.get_mut(id)?.cement();
            ctx.metrics.node_relocated();
            let arnode = self.wrap(ctx, &[id])?;
            return Ok(vec![arnode]);
        }

        let mut buckets: [Vec<EdgeRef<NodeId>>; ARNODE_TABLES] = Default::default();
        for edge in node.edges(Dir::Out).iter() {
            let category = Category::classify(edge.weight, edge.key.category).ok_or(
                CegarError::UpstreamNotPreprocessed {
                    node: id,
                    layer: self.index + 1,
                },
            )?;
            buckets[category.index()].push(edge);
        }
        let incoming: Vec<EdgeRef<NodeId>> = node.edges(Dir::In).iter().collect();
        let (bias, origin) = (node.bias(), node.origin());

        let layer = self.index;
        let mut pieces = Vec::new();
        for (category, bucket) in Category::CEMENTED.into_iter().zip(buckets) {
            if bucket.is_empty() {
                continue;
            }
            let nodes = &mut ctx.store.nodes;
            let (_, piece) = self.nodes.insert_with(category.index(), |slot| {
                let location = Location {
                    layer,
                    category,
                    slot,
                };
                nodes.try_insert_with(|_| Ok(Node::cemented(location, bias, origin)))
            })?;
            for edge in &bucket {
                entity::add_or_edit_neighbor(nodes, piece, Dir::Out, edge.neighbor, edge.weight, true)?;
            }
            for edge in &incoming {
                entity::add_or_edit_neighbor(nodes, piece, Dir::In, edge.neighbor, edge.weight, true)?;
            }
            pieces.push(piece);
        }

        entity::destroy(&mut ctx.store.nodes, id)?;
        self.nodes.remove(Category::Unprocessed.index(), location.slot)?;
        ctx.metrics.node_split(pieces.len());
        trace!(node = %id, pieces = pieces.len(), "layer.split_node");

        pieces
            .into_iter()
            .map(|piece| self.wrap(ctx, &[piece]))
            .collect()
    }

    /// Classifies every remaining unprocessed node. Returns the arnodes created.
    ///
    /// Except for the input layer, the next layer must be preprocessed first.
    pub fn preprocess(&mut self, ctx: &mut AbstractionCtx<'_>) -> Result<Vec<ArNodeId>> {
        let pending: Vec<NodeId> = self
            .nodes
            .iter(Category::Unprocessed.index())
            .map(|(_, id)| id)
            .collect();
        let mut created = Vec::with_capacity(pending.len());
        for id in pending {
            created.extend(self.split_unprocessed_node(ctx, id)?);
        }
        debug!(
            layer = self.index,
            nodes = self.nodes.total_len(),
            arnodes = created.len(),
            "layer.preprocess"
        );
        Ok(created)
    }

    /// Merges two fully activated arnodes of the same table into one fully
    /// activated arnode over the union of their constituents.
    pub fn merge_arnodes(
        &mut self,
        ctx: &mut AbstractionCtx<'_>,
        a: ArNodeId,
        b: ArNodeId,
    ) -> Result<ArNodeId> {
        if a == b {
            return Err(CegarError::InvalidArgument(format!("cannot merge {a} with itself")));
        }
        self.require_interior("merged")?;
        let first = self.require_fully_activated(ctx, a)?;
        let second = self.require_fully_activated(ctx, b)?;
        if first.category != second.category {
            return Err(CegarError::CategoryMismatch(format!(
                "{a} at {first} and {b} at {second}"
            )));
        }

        reserve_interior_vars(ctx, 1, 2)?;
        let mut members = self.destroy_arnode(ctx, a)?;
        members.extend(self.destroy_arnode(ctx, b)?);
        let merged = self.rebuild(ctx, &members)?;
        ctx.metrics.merge_applied();
        debug!(
            layer = self.index,
            left = %a,
            right = %b,
            merged = %merged,
            size = members.len(),
            "arnode.merge"
        );
        Ok(merged)
    }

    /// Splits a fully activated arnode along `partition`, one new fully
    /// activated arnode per cell.
    ///
    /// The partition needs at least two non-empty, disjoint cells that
    /// together cover the constituents exactly.
    pub fn split_arnode(
        &mut self,
        ctx: &mut AbstractionCtx<'_>,
        id: ArNodeId,
        partition: &[Vec<NodeId>],
    ) -> Result<Vec<ArNodeId>> {
        self.require_interior("split")?;
        self.require_fully_activated(ctx, id)?;
        validate_partition(ctx.store.arnode(id)?.constituents(), partition)?;
        reserve_interior_vars(ctx, partition.len(), 1)?;

        self.destroy_arnode(ctx, id)?;
        let mut parts = Vec::with_capacity(partition.len());
        for cell in partition {
            parts.push(self.rebuild(ctx, cell)?);
        }
        ctx.metrics.split_applied();
        debug!(layer = self.index, arnode = %id, parts = parts.len(), "arnode.split");
        Ok(parts)
    }

    fn rebuild(&mut self, ctx: &mut AbstractionCtx<'_>, members: &[NodeId]) -> Result<ArNodeId> {
        let id = self.wrap(ctx, members)?;
        ctx.forward_activate(id)?;
        ctx.fully_activate_recalculating_incoming(id)?;
        Ok(id)
    }

    fn require_interior(&self, action: &str) -> Result<()> {
        if self.role != LayerRole::Hidden {
            return Err(CegarError::InvalidArgument(format!(
                "arnodes of boundary layer {} are never {action}",
                self.index
            )));
        }
        Ok(())
    }

    fn require_fully_activated(&self, ctx: &AbstractionCtx<'_>, id: ArNodeId) -> Result<Location> {
        let arnode = ctx.store.arnode(id)?;
        let location = arnode.location();
        self.check_layer(location)?;
        if arnode.state() != ActivationState::FullyActivated {
            return Err(CegarError::NotFullyActivated { arnode: id });
        }
        Ok(location)
    }
}

/// Checks that `created` interior arnodes fit in the variable budget once
/// `destroyed` ones give theirs back, so a merge or split either completes
/// or leaves the layer untouched.
fn reserve_interior_vars(ctx: &AbstractionCtx<'_>, created: usize, destroyed: usize) -> Result<()> {
    let needed = 2 * created as u64;
    let freed = 2 * destroyed as u64;
    ctx.ids.reserve(needed.saturating_sub(freed))
}

fn validate_partition(constituents: &[NodeId], partition: &[Vec<NodeId>]) -> Result<()> {
    if partition.len() < 2 {
        return Err(CegarError::InvalidPartition(format!(
            "need at least two cells, got {}",
            partition.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for cell in partition {
        if cell.is_empty() {
            return Err(CegarError::InvalidPartition("empty cell".into()));
        }
        for &node in cell {
            if !constituents.contains(&node) {
                return Err(CegarError::InvalidPartition(format!("{node} is not a constituent")));
            }
            if !seen.insert(node) {
                return Err(CegarError::InvalidPartition(format!("{node} appears twice")));
            }
        }
    }
    if seen.len() != constituents.len() {
        return Err(CegarError::InvalidPartition(format!(
            "cells cover {} of {} constituents",
            seen.len(),
            constituents.len()
        )));
    }
    Ok(())
}
