//! Abstraction graph engine and core data structures.
//!
//! Implements the layered table storage for concrete nodes and arnodes, the
//! bidirectional edge model, the arnode activation state machine and the
//! merge/split operations that coarsen and refine the abstraction.

/// Arnode activation: abstract edge construction.
mod activation;

/// Generational arena owning entities.
pub mod arena;

mod arnode;
mod category;
mod context;
mod edge_set;
mod entity;
mod layer;
mod metrics;
mod node;
mod reduction;
mod table;

/// Entity storage and the generational handles into it.
pub use arena::Arena;

/// Abstract nodes and their activation state.
pub use arnode::{ActivationState, ArNode, Constituents};

/// Node categories and table counts.
pub use category::{Category, ARNODE_TABLES, NODE_TABLES};

/// Entity storage and the per-operation context.
pub use context::{AbstractionCtx, EntityStore};

/// Sparse per-direction adjacency.
pub use edge_set::{Combinations, Edge, EdgeKey, EdgeRef, EdgeSet};

/// Entity trait and generic neighbor operations.
pub use entity::{add_or_edit_neighbor, destroy, relocate, remove_neighbor, Dir, Entity, Location};

/// Layers and their roles.
pub use layer::{Layer, LayerRole};

/// Metrics collection for engine operations.
pub use metrics::{default_metrics, CounterMetrics, EngineMetrics, NoopMetrics};

/// Concrete nodes.
pub use node::{NeuronRef, Node};

/// Reduction strategies.
pub use reduction::{Goal, Reduction, ReductionPolicy};

/// Chained tables.
pub use table::{Table, TableChain, TableKind};
