#![cfg(test)]

use super::*;
use crate::primitives::IdAllocator;
use crate::solver::IdentityManager;
use crate::storage::arnode::ActivationState;
use crate::storage::entity::{self, Dir};
use crate::storage::metrics::CounterMetrics;
use crate::storage::reduction::ReductionPolicy;
use std::sync::atomic::Ordering;

/// x -> {h1: 1, h2: 3}; h1 -> {y1: 1, y2: -1}; h2 -> {y1: 2}
struct Fixture {
    layers: Vec<Layer>,
    store: EntityStore,
    ids: IdentityManager,
    policy: ReductionPolicy,
    metrics: CounterMetrics,
}

impl Fixture {
    fn new() -> Self {
        Self::with_ids(IdentityManager::default())
    }

    fn with_ids(ids: IdentityManager) -> Self {
        let mut fx = Self {
            layers: vec![
                Layer::new(0, LayerRole::Input),
                Layer::new(1, LayerRole::Hidden),
                Layer::new(2, LayerRole::Output),
            ],
            store: EntityStore::new(),
            ids,
            policy: ReductionPolicy::default(),
            metrics: CounterMetrics::default(),
        };
        let x = fx.create(0, 0);
        let h1 = fx.create(1, 0);
        let h2 = fx.create(1, 1);
        let y1 = fx.create(2, 0);
        let y2 = fx.create(2, 1);
        for (src, dst, w) in [(x, h1, 1.0), (x, h2, 3.0), (h1, y1, 1.0), (h1, y2, -1.0), (h2, y1, 2.0)] {
            entity::add_or_edit_neighbor(&mut fx.store.nodes, src, Dir::Out, dst, w, true).unwrap();
        }
        fx
    }

    fn create(&mut self, layer: usize, index: usize) -> NodeId {
        self.layers[layer]
            .create_node(&mut self.store, 0.0, NeuronRef { layer, index })
            .unwrap()
            .0
    }

    fn with_ctx<T>(&mut self, layer: usize, op: impl FnOnce(&mut Layer, &mut AbstractionCtx<'_>) -> T) -> T {
        let mut ctx = AbstractionCtx {
            store: &mut self.store,
            ids: &mut self.ids,
            policy: &self.policy,
            metrics: &self.metrics,
        };
        op(&mut self.layers[layer], &mut ctx)
    }

    fn preprocess_all(&mut self) {
        for layer in (0..3).rev() {
            self.with_ctx(layer, |l, ctx| l.preprocess(ctx)).unwrap();
        }
    }

    fn activate_all(&mut self) {
        for layer in (0..3).rev() {
            self.with_ctx(layer, |l, ctx| l.forward_activate_all(ctx)).unwrap();
        }
        for layer in (1..3).rev() {
            self.with_ctx(layer, |l, ctx| l.fully_activate_all(ctx, true)).unwrap();
        }
    }

    /// Arnode of `layer` wrapping neuron `index` in `category`.
    fn arnode(&self, layer: usize, index: usize, category: Category) -> ArNodeId {
        self.layers[layer]
            .arnode_ids()
            .into_iter()
            .find(|&id| {
                let arnode = self.store.arnode(id).unwrap();
                arnode.location().category == category
                    && arnode
                        .constituents()
                        .iter()
                        .any(|&n| self.store.node(n).unwrap().origin().index == index)
            })
            .unwrap()
    }

    fn in_weight(&self, dst: ArNodeId, src: ArNodeId) -> Option<f64> {
        let key = self.store.arnode(src).unwrap().location().edge_key();
        self.store
            .arnode(dst)
            .unwrap()
            .edges(Dir::In)
            .get(key)
            .map(|e| e.weight)
    }
}

#[test]
fn created_nodes_start_unprocessed() {
    let fx = Fixture::new();
    assert!(!fx.layers[1].is_preprocessed());
    assert_eq!(fx.layers[1].nodes().len(Category::Unprocessed.index()), 2);
    assert_eq!(fx.layers[1].arnodes().total_len(), 0);
}

#[test]
fn preprocessing_needs_the_next_layer_classified() {
    let mut fx = Fixture::new();
    let err = fx.with_ctx(1, |l, ctx| l.preprocess(ctx)).unwrap_err();
    assert!(matches!(err, CegarError::UpstreamNotPreprocessed { layer: 2, .. }));
}

#[test]
fn preprocessing_splits_by_sign_and_monotonicity() {
    let mut fx = Fixture::new();
    fx.preprocess_all();

    let output = &fx.layers[2];
    assert_eq!(output.nodes().len(Category::PositiveIncreasing.index()), 2);

    let hidden = &fx.layers[1];
    assert!(hidden.is_preprocessed());
    assert_eq!(hidden.nodes().len(Category::PositiveIncreasing.index()), 2);
    assert_eq!(hidden.nodes().len(Category::NegativeDecreasing.index()), 1);
    assert_eq!(hidden.arnodes().total_len(), 3);

    // h1 became two nodes, both still fed by x
    let input = &fx.layers[0];
    let x = input.node_ids()[0];
    assert_eq!(fx.store.node(x).unwrap().edges(Dir::Out).len(), 3);
    assert!(!fx.store.node(x).unwrap().location_mutable());
    assert_eq!(fx.store.nodes().len(), 6);

    assert_eq!(fx.metrics.nodes_split.load(Ordering::Relaxed), 2);
    assert_eq!(fx.metrics.split_pieces.load(Ordering::Relaxed), 3);
    assert_eq!(fx.metrics.nodes_relocated.load(Ordering::Relaxed), 3);
    assert_eq!(fx.metrics.arnodes_created.load(Ordering::Relaxed), 6);
}

#[test]
fn wrapping_checks_ownership_and_cementing() {
    let mut fx = Fixture::new();
    let raw = fx.layers[1].node_ids()[0];
    let err = fx.with_ctx(1, |l, ctx| l.wrap(ctx, &[raw])).unwrap_err();
    assert!(matches!(err, CegarError::NotCemented { .. }));

    fx.preprocess_all();
    let y = fx.layers[2].node_ids()[0];
    let err = fx.with_ctx(2, |l, ctx| l.wrap(ctx, &[y])).unwrap_err();
    assert!(matches!(err, CegarError::AlreadyOwned { node, .. } if node == y));
}

#[test]
fn global_indexes_follow_table_order() {
    let mut fx = Fixture::new();
    fx.preprocess_all();
    let neg = fx.arnode(1, 0, Category::NegativeDecreasing);
    let hidden = &fx.layers[1];
    assert_eq!(hidden.arnodes().starting_index(Category::NegativeDecreasing.index()), Some(2));
    assert_eq!(hidden.arnode_global_index(&fx.store, neg).unwrap(), 2);
    assert_eq!(hidden.arnodes().starting_index(Category::PositiveDecreasing.index()), None);
}

#[test]
fn merge_needs_full_activation_and_one_table() {
    let mut fx = Fixture::new();
    fx.preprocess_all();
    let h1 = fx.arnode(1, 0, Category::PositiveIncreasing);
    let h1_neg = fx.arnode(1, 0, Category::NegativeDecreasing);
    let h2 = fx.arnode(1, 1, Category::PositiveIncreasing);

    let err = fx.with_ctx(1, |l, ctx| l.merge_arnodes(ctx, h1, h2)).unwrap_err();
    assert!(matches!(err, CegarError::NotFullyActivated { .. }));

    fx.activate_all();
    let err = fx.with_ctx(1, |l, ctx| l.merge_arnodes(ctx, h1, h1_neg)).unwrap_err();
    assert!(matches!(err, CegarError::CategoryMismatch(_)));

    let y1 = fx.arnode(2, 0, Category::PositiveIncreasing);
    let y2 = fx.arnode(2, 1, Category::PositiveIncreasing);
    let err = fx.with_ctx(2, |l, ctx| l.merge_arnodes(ctx, y1, y2)).unwrap_err();
    assert!(matches!(err, CegarError::InvalidArgument(_)));
}

#[test]
fn merge_then_split_restores_edges() {
    let mut fx = Fixture::new();
    fx.preprocess_all();
    fx.activate_all();

    let x = fx.arnode(0, 0, Category::PositiveIncreasing);
    let y1 = fx.arnode(2, 0, Category::PositiveIncreasing);
    let h1 = fx.arnode(1, 0, Category::PositiveIncreasing);
    let h2 = fx.arnode(1, 1, Category::PositiveIncreasing);
    assert_eq!(fx.in_weight(h2, x), Some(3.0));
    assert_eq!(fx.in_weight(y1, h1), Some(1.0));

    let merged = fx.with_ctx(1, |l, ctx| l.merge_arnodes(ctx, h1, h2)).unwrap();
    let arnode = fx.store.arnode(merged).unwrap();
    assert_eq!(arnode.state(), ActivationState::FullyActivated);
    assert_eq!(arnode.constituents().len(), 2);
    // incoming max(1, 3); outgoing 1 + 2
    assert_eq!(fx.in_weight(merged, x), Some(3.0));
    assert_eq!(fx.in_weight(y1, merged), Some(3.0));
    assert!(matches!(fx.store.arnode(h1), Err(CegarError::UseAfterDestroy { .. })));
    assert_eq!(fx.store.arnode(x).unwrap().edges(Dir::Out).len(), 2);
    assert_eq!(fx.store.arnode(y1).unwrap().edges(Dir::In).len(), 1);

    let members = fx.store.arnode(merged).unwrap().constituents().to_vec();
    let partition = vec![vec![members[0]], vec![members[1]]];
    let parts = fx
        .with_ctx(1, |l, ctx| l.split_arnode(ctx, merged, &partition))
        .unwrap();
    assert_eq!(parts.len(), 2);

    let h1 = fx.arnode(1, 0, Category::PositiveIncreasing);
    let h2 = fx.arnode(1, 1, Category::PositiveIncreasing);
    assert_eq!(fx.in_weight(h1, x), Some(1.0));
    assert_eq!(fx.in_weight(h2, x), Some(3.0));
    assert_eq!(fx.in_weight(y1, h1), Some(1.0));
    assert_eq!(fx.in_weight(y1, h2), Some(2.0));
    assert_eq!(fx.store.arnode(x).unwrap().edges(Dir::Out).len(), 3);
    assert_eq!(fx.layers[1].arnodes().total_len(), 3);
    assert_eq!(fx.metrics.merges.load(Ordering::Relaxed), 1);
    assert_eq!(fx.metrics.splits.load(Ordering::Relaxed), 1);
}

#[test]
fn split_rejects_bad_partitions() {
    let mut fx = Fixture::new();
    fx.preprocess_all();
    fx.activate_all();
    let h1 = fx.arnode(1, 0, Category::PositiveIncreasing);
    let h2 = fx.arnode(1, 1, Category::PositiveIncreasing);
    let merged = fx.with_ctx(1, |l, ctx| l.merge_arnodes(ctx, h1, h2)).unwrap();
    let members = fx.store.arnode(merged).unwrap().constituents().to_vec();

    let cases = [
        vec![members.clone()],
        vec![vec![members[0]], vec![]],
        vec![vec![members[0]], vec![members[0]]],
        vec![vec![members[0]], vec![members[0], members[1]]],
    ];
    for partition in cases {
        let err = fx
            .with_ctx(1, |l, ctx| l.split_arnode(ctx, merged, &partition))
            .unwrap_err();
        assert!(matches!(err, CegarError::InvalidPartition(_)), "{partition:?}");
    }
    // the arnode survives every rejected split
    assert!(fx.store.arnode(merged).is_ok());
}

#[test]
fn destroyed_arnode_frees_its_slot_and_vars() {
    let mut fx = Fixture::new();
    fx.preprocess_all();
    let neg = fx.arnode(1, 0, Category::NegativeDecreasing);
    let before = fx.ids.query().relus().len();
    let members = fx.with_ctx(1, |l, ctx| l.destroy_arnode(ctx, neg)).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(fx.ids.query().relus().len(), before - 1);
    assert_eq!(fx.store.node(members[0]).unwrap().owner(), None);
    assert_eq!(fx.layers[1].arnodes().len(Category::NegativeDecreasing.index()), 0);
    assert_eq!(fx.metrics.live_arnodes(), 5);
}

#[test]
fn split_past_the_variable_budget_leaves_the_arnode_intact() {
    // x, y1 and y2 take one id each, the three hidden arnodes two
    let mut fx = Fixture::with_ids(IdentityManager::new(IdAllocator::bounded(9)));
    fx.preprocess_all();
    fx.activate_all();
    let h1 = fx.arnode(1, 0, Category::PositiveIncreasing);
    let h2 = fx.arnode(1, 1, Category::PositiveIncreasing);
    let merged = fx.with_ctx(1, |l, ctx| l.merge_arnodes(ctx, h1, h2)).unwrap();
    // take the two ids the merge gave back
    fx.ids.borrow_vars(false).unwrap();

    let members = fx.store.arnode(merged).unwrap().constituents().to_vec();
    let partition = vec![vec![members[0]], vec![members[1]]];
    let err = fx
        .with_ctx(1, |l, ctx| l.split_arnode(ctx, merged, &partition))
        .unwrap_err();
    assert!(matches!(err, CegarError::Exhausted { limit: 9 }));

    let arnode = fx.store.arnode(merged).unwrap();
    assert_eq!(arnode.state(), ActivationState::FullyActivated);
    for &node in &members {
        assert_eq!(fx.store.node(node).unwrap().owner(), Some(merged));
    }
    assert_eq!(fx.layers[1].arnodes().total_len(), 2);
    assert_eq!(fx.metrics.splits.load(Ordering::Relaxed), 0);
}
