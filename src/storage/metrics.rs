use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking structural operations performed by the abstraction engine.
///
/// Implementations collect statistics about node classification, arnode
/// churn, merges, splits and solver invocations. The engine itself is
/// single-threaded; the `Send + Sync` bound lets a host share one sink
/// between several networks.
pub trait EngineMetrics: Send + Sync {
    /// Records a node moving out of the unprocessed table without being split.
    fn node_relocated(&self);

    /// Records an unprocessed node being split into `pieces` cemented nodes.
    fn node_split(&self, pieces: usize);

    /// Records the creation of an arnode.
    fn arnode_created(&self);

    /// Records the destruction of an arnode.
    fn arnode_destroyed(&self);

    /// Records a completed merge of two arnodes.
    fn merge_applied(&self);

    /// Records a completed split of one arnode.
    fn split_applied(&self);

    /// Records a solver call.
    ///
    /// # Parameters
    /// * `query` - Which query was solved: "abstract" or "concrete".
    fn solver_invoked(&self, query: &'static str);
}

/// A no-op implementation of [`EngineMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl EngineMetrics for NoopMetrics {
    fn node_relocated(&self) {}
    fn node_split(&self, _pieces: usize) {}
    fn arnode_created(&self) {}
    fn arnode_destroyed(&self) {}
    fn merge_applied(&self) {}
    fn split_applied(&self) {}
    fn solver_invoked(&self, _query: &'static str) {}
}

/// A thread-safe counter-based implementation of [`EngineMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Number of nodes relocated verbatim.
    pub nodes_relocated: AtomicU64,

    /// Number of unprocessed nodes split by classification.
    pub nodes_split: AtomicU64,

    /// Number of cemented nodes produced by those splits.
    pub split_pieces: AtomicU64,

    /// Number of arnodes created.
    pub arnodes_created: AtomicU64,

    /// Number of arnodes destroyed.
    pub arnodes_destroyed: AtomicU64,

    /// Number of merges.
    pub merges: AtomicU64,

    /// Number of arnode splits.
    pub splits: AtomicU64,

    /// Number of abstract queries solved.
    pub abstract_solves: AtomicU64,

    /// Number of concrete queries solved.
    pub concrete_solves: AtomicU64,
}

impl CounterMetrics {
    /// Arnodes currently alive according to the counters.
    pub fn live_arnodes(&self) -> u64 {
        self.arnodes_created
            .load(Ordering::Relaxed)
            .saturating_sub(self.arnodes_destroyed.load(Ordering::Relaxed))
    }
}

impl EngineMetrics for CounterMetrics {
    fn node_relocated(&self) {
        self.nodes_relocated.fetch_add(1, Ordering::Relaxed);
    }

    fn node_split(&self, pieces: usize) {
        self.nodes_split.fetch_add(1, Ordering::Relaxed);
        self.split_pieces.fetch_add(pieces as u64, Ordering::Relaxed);
    }

    fn arnode_created(&self) {
        self.arnodes_created.fetch_add(1, Ordering::Relaxed);
    }

    fn arnode_destroyed(&self) {
        self.arnodes_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    fn merge_applied(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    fn split_applied(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    fn solver_invoked(&self, query: &'static str) {
        match query {
            "abstract" => {
                self.abstract_solves.fetch_add(1, Ordering::Relaxed);
            }
            "concrete" => {
                self.concrete_solves.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`], which discards everything.
pub fn default_metrics() -> Arc<dyn EngineMetrics> {
    Arc::new(NoopMetrics)
}
