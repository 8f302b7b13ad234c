//! Shared identifiers and the engine-wide error type.

use std::fmt;
use std::io;

use thiserror::Error;

/// Keys usable as generational handles into a [`crate::storage::Arena`].
pub trait ArenaKey: Copy + Eq + Ord + fmt::Debug {
    /// Short entity kind used in error messages.
    const KIND: &'static str;

    /// Builds a handle from its raw parts.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// Position of the slot inside the arena.
    fn index(self) -> u32;

    /// Generation the slot had when this handle was issued.
    fn generation(self) -> u32;
}

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl ArenaKey for $name {
            const KIND: &'static str = $kind;

            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            fn index(self) -> u32 {
                self.index
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}.{}", $kind, self.index, self.generation)
            }
        }
    };
}

arena_handle!(
    /// Handle to a concrete network node.
    NodeId,
    "node"
);
arena_handle!(
    /// Handle to an abstract node (arnode).
    ArNodeId,
    "arnode"
);

/// Position of an entity inside one table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Slot(pub u64);

/// Solver variable identifier.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct VarId(pub u64);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Errors raised by the abstraction-refinement engine.
///
/// Invariant violations are programmer errors and are never recovered from
/// inside the engine. `NoMergeCandidate` and `NoSplitCandidate` are ordinary
/// end-of-search signals, see [`CegarError::is_search_exhausted`].
#[derive(Debug, Error)]
pub enum CegarError {
    /// The id allocator has no free id below its limit.
    #[error("id space exhausted (limit {limit})")]
    Exhausted {
        /// Declared exclusive upper bound.
        limit: u64,
    },
    /// Edge lookup or removal for a key that holds no edge.
    #[error("no edge at table {table} slot {slot}")]
    NoSuchEdge {
        /// Neighbor table index.
        table: usize,
        /// Neighbor slot.
        slot: Slot,
    },
    /// Moving an edge onto a key that is already occupied.
    #[error("edge already present at table {table} slot {slot}")]
    EdgeConflict {
        /// Neighbor table index.
        table: usize,
        /// Neighbor slot.
        slot: Slot,
    },
    /// Relocating an entity whose location is cemented.
    #[error("{entity} is cemented and cannot be relocated")]
    Immutable {
        /// Offending entity.
        entity: String,
    },
    /// Dereferencing a handle whose entity was destroyed.
    #[error("{kind} {index} used after destroy")]
    UseAfterDestroy {
        /// Entity kind.
        kind: &'static str,
        /// Arena index of the stale handle.
        index: u32,
    },
    /// Activation state may only move forward.
    #[error("invalid activation transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: &'static str,
        /// Requested state.
        to: &'static str,
    },
    /// An entity is already wrapped by another arnode.
    #[error("{node} already belongs to {owner}")]
    AlreadyOwned {
        /// The wrapped node.
        node: NodeId,
        /// Its current owner.
        owner: ArNodeId,
    },
    /// Only cemented nodes can be wrapped.
    #[error("{node} is not cemented")]
    NotCemented {
        /// The offending node.
        node: NodeId,
    },
    /// A neighbor of a constituent has no owning arnode yet.
    #[error("{node} has no owning arnode")]
    UnresolvedAbstraction {
        /// The unowned neighbor.
        node: NodeId,
    },
    /// An incoming source arnode is not forward activated yet.
    #[error("source {source_arnode} is not forward activated")]
    SourceNotReady {
        /// The lagging source.
        source_arnode: ArNodeId,
    },
    /// Merge and split need fully activated operands.
    #[error("{arnode} is not fully activated")]
    NotFullyActivated {
        /// The offending arnode.
        arnode: ArNodeId,
    },
    /// Classification saw an outgoing edge into an unclassified table.
    #[error("{node} points into an unprocessed table of layer {layer}")]
    UpstreamNotPreprocessed {
        /// Node being classified.
        node: NodeId,
        /// Layer holding the unprocessed neighbor.
        layer: usize,
    },
    /// Deletion attempted on an append-only table.
    #[error("table {table} is append-only")]
    AppendOnly {
        /// Table index.
        table: usize,
    },
    /// Lookup of an empty table slot.
    #[error("table {table} has no entry at slot {slot}")]
    EmptySlot {
        /// Table index.
        table: usize,
        /// Requested slot.
        slot: Slot,
    },
    /// Layer frontier ordering was violated.
    #[error("frontier violation: {0}")]
    FrontierViolation(&'static str),
    /// A split partition does not cover the arnode exactly.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    /// Operands live in different tables or layers.
    #[error("category mismatch: {0}")]
    CategoryMismatch(String),
    /// Malformed caller input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No pair of arnodes can be merged in the active layer range.
    #[error("no merge candidate")]
    NoMergeCandidate,
    /// Every arnode in the active layer range is a singleton.
    #[error("no split candidate")]
    NoSplitCandidate,
    /// The external solver failed.
    #[error("solver: {0}")]
    Solver(String),
    /// The solver gave up after its time budget.
    #[error("solver timed out")]
    SolverTimeout,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Configuration parse failure.
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
    /// JSON (de)serialization failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CegarError {
    /// Returns true for the merge/split search signals that end a CEGAR phase.
    pub fn is_search_exhausted(&self) -> bool {
        matches!(
            self,
            CegarError::NoMergeCandidate | CegarError::NoSplitCandidate
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CegarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_display_kind_and_generation() {
        let id = NodeId::from_parts(3, 1);
        assert_eq!(id.to_string(), "node#3.1");
        assert_eq!(ArNodeId::from_parts(0, 0).to_string(), "arnode#0.0");
    }

    #[test]
    fn search_signals_are_flagged() {
        assert!(CegarError::NoMergeCandidate.is_search_exhausted());
        assert!(CegarError::NoSplitCandidate.is_search_exhausted());
        assert!(!CegarError::SolverTimeout.is_search_exhausted());
    }
}
