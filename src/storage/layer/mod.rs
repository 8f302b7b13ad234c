//! One network layer: its node and arnode tables and the operations that
//! move entities between them.

use tracing::debug;

use super::arnode::Constituents;
use super::category::{Category, ARNODE_TABLES, NODE_TABLES};
use super::context::{AbstractionCtx, EntityStore};
use super::entity::{Entity, Location};
use super::node::{NeuronRef, Node};
use super::table::{TableChain, TableKind};
use crate::types::{ArNodeId, CegarError, NodeId, Result};

mod abstraction;
mod tests;

/// Position of a layer in the network.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LayerRole {
    /// Network inputs. Nodes are never split and arnodes are boundary arnodes.
    Input,
    /// ReLU layer.
    Hidden,
    /// Network outputs. Arnodes are boundary arnodes and stay 1:1 with nodes.
    Output,
}

/// Tables of one layer.
///
/// Nodes live in four append-only cemented tables plus a deletable
/// unprocessed table; arnodes live in four deletable tables, one per
/// cemented category.
#[derive(Clone, Debug)]
pub struct Layer {
    index: usize,
    role: LayerRole,
    nodes: TableChain<NodeId>,
    arnodes: TableChain<ArNodeId>,
}

impl Layer {
    /// Creates an empty layer.
    pub fn new(index: usize, role: LayerRole) -> Self {
        let mut node_tables = [TableKind::AppendOnly; NODE_TABLES];
        node_tables[Category::Unprocessed.index()] = TableKind::Deletable;
        Self {
            index,
            role,
            nodes: TableChain::new(&node_tables),
            arnodes: TableChain::new(&[TableKind::Deletable; ARNODE_TABLES]),
        }
    }

    /// Index of the layer, 0 being the input layer.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Role of the layer.
    pub fn role(&self) -> LayerRole {
        self.role
    }

    /// Whether arnodes of this layer get a single solver variable.
    pub fn is_boundary(&self) -> bool {
        self.role != LayerRole::Hidden
    }

    /// Node tables.
    pub fn nodes(&self) -> &TableChain<NodeId> {
        &self.nodes
    }

    /// Arnode tables.
    pub fn arnodes(&self) -> &TableChain<ArNodeId> {
        &self.arnodes
    }

    /// Every arnode, table by table.
    pub fn arnode_ids(&self) -> Vec<ArNodeId> {
        self.arnodes.handles()
    }

    /// Every node, table by table.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.handles()
    }

    /// Whether no node is left in the unprocessed table.
    pub fn is_preprocessed(&self) -> bool {
        self.nodes.len(Category::Unprocessed.index()) == 0
    }

    /// Creates an unprocessed node. Returns its handle and location.
    pub fn create_node(
        &mut self,
        store: &mut EntityStore,
        bias: f64,
        origin: NeuronRef,
    ) -> Result<(NodeId, Location)> {
        let layer = self.index;
        let category = Category::Unprocessed;
        let (slot, id) = self.nodes.insert_with(category.index(), |slot| {
            let location = Location {
                layer,
                category,
                slot,
            };
            store
                .nodes
                .try_insert_with(|_| Ok(Node::new(location, bias, origin)))
        })?;
        Ok((
            id,
            Location {
                layer,
                category,
                slot,
            },
        ))
    }

    /// Layer-wide index of an arnode, counting across its tables.
    pub fn arnode_global_index(&self, store: &EntityStore, id: ArNodeId) -> Result<u64> {
        let location = store.arnode(id)?.location();
        self.check_layer(location)?;
        self.arnodes
            .global_index(location.category.index(), location.slot)
    }

    /// Layer-wide index of a node, counting across its tables.
    pub fn node_global_index(&self, store: &EntityStore, id: NodeId) -> Result<u64> {
        let location = store.node(id)?.location();
        self.check_layer(location)?;
        self.nodes.global_index(location.category.index(), location.slot)
    }

    fn check_layer(&self, location: Location) -> Result<()> {
        if location.layer != self.index {
            return Err(CegarError::InvalidArgument(format!(
                "{location} is not in layer {}",
                self.index
            )));
        }
        Ok(())
    }

    /// Wraps cemented, unowned nodes of one category into a new arnode.
    pub fn wrap(&mut self, ctx: &mut AbstractionCtx<'_>, nodes: &[NodeId]) -> Result<ArNodeId> {
        let first = *nodes
            .first()
            .ok_or_else(|| CegarError::InvalidArgument("cannot wrap an empty node set".into()))?;
        let location = ctx.store.node(first)?.location();
        self.check_layer(location)?;
        if !location.category.is_cemented() {
            return Err(CegarError::NotCemented { node: first });
        }
        let layer = self.index;
        let category = location.category;
        let boundary = self.is_boundary();
        let constituents: Constituents = nodes.iter().copied().collect();
        let (_, id) = self.arnodes.insert_with(category.index(), |slot| {
            ctx.spawn_arnode(
                Location {
                    layer,
                    category,
                    slot,
                },
                constituents,
                boundary,
            )
        })?;
        Ok(id)
    }

    /// Destroys one of this layer's arnodes and frees its table slot.
    /// Returns the former constituents.
    pub fn destroy_arnode(
        &mut self,
        ctx: &mut AbstractionCtx<'_>,
        id: ArNodeId,
    ) -> Result<Constituents> {
        let location = ctx.store.arnode(id)?.location();
        self.check_layer(location)?;
        let constituents = ctx.destroy_arnode(id)?;
        self.arnodes.remove(location.category.index(), location.slot)?;
        Ok(constituents)
    }

    /// Forward activates every arnode of one table.
    pub fn forward_activate_table(
        &self,
        ctx: &mut AbstractionCtx<'_>,
        category: Category,
    ) -> Result<()> {
        let ids: Vec<ArNodeId> = self.arnodes.iter(category.index()).map(|(_, id)| id).collect();
        for id in ids {
            ctx.forward_activate(id)?;
        }
        Ok(())
    }

    /// Fully activates every arnode of one table, trusting incoming edges.
    pub fn fully_activate_table(
        &self,
        ctx: &mut AbstractionCtx<'_>,
        category: Category,
        check_validity: bool,
    ) -> Result<()> {
        let ids: Vec<ArNodeId> = self.arnodes.iter(category.index()).map(|(_, id)| id).collect();
        for id in ids {
            ctx.fully_activate_without_changing_incoming(id, check_validity)?;
        }
        Ok(())
    }

    /// Forward activates every arnode of the layer.
    pub fn forward_activate_all(&self, ctx: &mut AbstractionCtx<'_>) -> Result<()> {
        for category in Category::CEMENTED {
            self.forward_activate_table(ctx, category)?;
        }
        debug!(layer = self.index, "layer.forward_activate");
        Ok(())
    }

    /// Fully activates every arnode of the layer.
    pub fn fully_activate_all(
        &self,
        ctx: &mut AbstractionCtx<'_>,
        check_validity: bool,
    ) -> Result<()> {
        for category in Category::CEMENTED {
            self.fully_activate_table(ctx, category, check_validity)?;
        }
        debug!(layer = self.index, "layer.fully_activate");
        Ok(())
    }
}
