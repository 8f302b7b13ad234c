//! CEGAR driver over a layered abstraction of a ReLU network.
//!
//! A [`Network`] owns the layers, the entity store and the identity manager
//! of one verification run. The abstraction is built layer by layer from
//! the output towards the input (see [`Frontier`]); once complete it can be
//! coarsened with [`Network::decide_merge`], refined with
//! [`Network::decide_split`] and checked with [`Network::verify`].
//! [`run_cegar`] chains the three into the full loop.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::primitives::IdAllocator;
use crate::solver::IdentityManager;
use crate::storage::{
    self, default_metrics, AbstractionCtx, ActivationState, Category, Dir, EngineMetrics,
    Entity, EntityStore, Layer, LayerRole, NeuronRef, ReductionPolicy,
};
use crate::types::{ArNodeId, CegarError, NodeId, Result};

mod config;
mod decide;
mod description;
mod driver;
mod frontier;
mod property;
mod verify;


pub use config::{
    AbstractionSection, CegarConfig, NetworkOptions, RefinementSection, SolverSection,
};
pub use decide::{MergeCandidate, SplitCandidate};
pub use description::{DenseLayer, DenseNetwork, InputRange, NetworkDescription};
pub use driver::{run_cegar, CegarOutcome, CegarReport};
pub use frontier::Frontier;
pub use property::{Bound, Property};
pub use verify::{Counterexample, Verdict};

use verify::ConcreteQuery;

/// Abstraction of one network under one property.
pub struct Network {
    layers: Vec<Layer>,
    store: EntityStore,
    ids: IdentityManager,
    policy: ReductionPolicy,
    metrics: Arc<dyn EngineMetrics>,
    check_validity: bool,
    frontier: Frontier,
    property: Property,
    concrete: ConcreteQuery,
    input_bounds: Vec<(f64, f64)>,
    solver_calls: usize,
}

/// One arnode as listed by [`Network::abstraction_summary`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArNodeSummary {
    /// Layer-wide index across the arnode tables.
    pub global_index: u64,
    /// Table of the arnode.
    pub category: Category,
    /// Activation state.
    pub state: ActivationState,
    /// Neurons of the original network the constituents stem from.
    pub members: Vec<NeuronRef>,
}

/// Arnodes of one layer, in table order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerSummary {
    /// Layer index.
    pub index: usize,
    /// Arnodes of the layer.
    pub arnodes: Vec<ArNodeSummary>,
}

impl Network {
    /// Loads `description` into unprocessed nodes, one per neuron, with one
    /// mirrored edge per non-zero weight, and saves the concrete query.
    pub fn build(
        description: &dyn NetworkDescription,
        property: Property,
        options: NetworkOptions,
    ) -> Result<Self> {
        let count = description.number_of_layers();
        if count < 2 {
            return Err(CegarError::InvalidArgument(format!(
                "a network needs an input and an output layer, got {count} layers"
            )));
        }
        let outputs = description.nodes_in_layer(count - 1);
        if property.output() >= outputs {
            return Err(CegarError::InvalidArgument(format!(
                "property names output {} of {outputs}",
                property.output()
            )));
        }

        let mut store = EntityStore::new();
        let mut layers = Vec::with_capacity(count);
        let mut grid: Vec<Vec<NodeId>> = Vec::with_capacity(count);
        for index in 0..count {
            let role = match index {
                0 => LayerRole::Input,
                i if i == count - 1 => LayerRole::Output,
                _ => LayerRole::Hidden,
            };
            let width = description.nodes_in_layer(index);
            if width == 0 {
                return Err(CegarError::InvalidArgument(format!("layer {index} is empty")));
            }
            let mut layer = Layer::new(index, role);
            let mut nodes = Vec::with_capacity(width);
            for neuron in 0..width {
                let bias = if index == 0 {
                    0.0
                } else {
                    description.bias(index, neuron)
                };
                let origin = NeuronRef {
                    layer: index,
                    index: neuron,
                };
                nodes.push(layer.create_node(&mut store, bias, origin)?.0);
            }
            grid.push(nodes);
            layers.push(layer);
        }
        for index in 1..count {
            for (dst, &target) in grid[index].iter().enumerate() {
                for (src, &source) in grid[index - 1].iter().enumerate() {
                    let weight = description.weight(index, dst, src);
                    if weight != 0.0 {
                        storage::add_or_edit_neighbor(
                            &mut store.nodes,
                            source,
                            Dir::Out,
                            target,
                            weight,
                            true,
                        )?;
                    }
                }
            }
        }

        let input_bounds = (0..description.nodes_in_layer(0))
            .map(|i| description.input_bounds(i))
            .collect();
        let concrete = ConcreteQuery::build(description, &property)?;
        let ids = IdentityManager::new(
            options
                .variable_limit
                .map_or_else(IdAllocator::unbounded, IdAllocator::bounded),
        );
        debug!(
            layers = count,
            nodes = store.nodes().len(),
            concrete_vars = concrete.query().number_of_variables(),
            "network.build"
        );
        Ok(Self {
            layers,
            store,
            ids,
            policy: options.reduction_policy(property.goal()),
            metrics: options.metrics.unwrap_or_else(default_metrics),
            check_validity: options.check_activation_validity,
            frontier: Frontier::start(count),
            property,
            concrete,
            input_bounds,
            solver_calls: 0,
        })
    }

    /// Layers from input to output.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Entity storage.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Solver identities and the abstract query.
    pub fn identities(&self) -> &IdentityManager {
        &self.ids
    }

    /// Property under verification.
    pub fn property(&self) -> &Property {
        &self.property
    }

    /// Reduction strategies in use.
    pub fn policy(&self) -> &ReductionPolicy {
        &self.policy
    }

    /// Current frontier cursors.
    pub fn frontier(&self) -> Frontier {
        self.frontier
    }

    /// Solver calls issued by [`Network::verify`] so far.
    pub fn solver_calls(&self) -> usize {
        self.solver_calls
    }

    /// Arnodes of every layer with their global index, table, state and
    /// member neurons.
    pub fn abstraction_summary(&self) -> Result<Vec<LayerSummary>> {
        let mut summary = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut arnodes = Vec::new();
            for id in layer.arnode_ids() {
                let arnode = self.store.arnode(id)?;
                let mut members = arnode
                    .constituents()
                    .iter()
                    .map(|&n| self.store.node(n).map(|node| node.origin()))
                    .collect::<Result<Vec<_>>>()?;
                members.sort();
                arnodes.push(ArNodeSummary {
                    global_index: layer.arnode_global_index(&self.store, id)?,
                    category: arnode.location().category,
                    state: arnode.state(),
                    members,
                });
            }
            summary.push(LayerSummary {
                index: layer.index(),
                arnodes,
            });
        }
        Ok(summary)
    }

    /// Arnodes currently alive in `layer`.
    pub fn arnodes_in_layer(&self, layer: usize) -> Result<Vec<ArNodeId>> {
        Ok(self.layer(layer)?.arnode_ids())
    }

    fn layer(&self, index: usize) -> Result<&Layer> {
        self.layers
            .get(index)
            .ok_or_else(|| CegarError::InvalidArgument(format!("no layer {index}")))
    }

    /// Runs `op` on one layer with a context over the rest of the network.
    fn with_layer<T>(
        &mut self,
        index: usize,
        op: impl FnOnce(&mut Layer, &mut AbstractionCtx<'_>) -> Result<T>,
    ) -> Result<T> {
        let layer = self
            .layers
            .get_mut(index)
            .ok_or_else(|| CegarError::InvalidArgument(format!("no layer {index}")))?;
        let mut ctx = AbstractionCtx {
            store: &mut self.store,
            ids: &mut self.ids,
            policy: &self.policy,
            metrics: self.metrics.as_ref(),
        };
        op(layer, &mut ctx)
    }

    /// Context over the entities alone, for operations spanning layers.
    fn ctx(&mut self) -> AbstractionCtx<'_> {
        AbstractionCtx {
            store: &mut self.store,
            ids: &mut self.ids,
            policy: &self.policy,
            metrics: self.metrics.as_ref(),
        }
    }
}
