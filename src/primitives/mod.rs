//! Low-level primitives shared by the graph engine and the solver boundary.

/// Dense integer id allocation with range compaction.
///
/// Hands out table slots and solver variable ids, reclaiming released ids.
pub mod id_alloc;

pub use id_alloc::IdAllocator;
