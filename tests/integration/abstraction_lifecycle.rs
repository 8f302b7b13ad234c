use std::collections::BTreeMap;

use relu_cegar::network::{DenseLayer, InputRange};
use relu_cegar::primitives::IdAllocator;
use relu_cegar::storage::{Dir, Entity, NeuronRef, TableChain, TableKind};
use relu_cegar::types::{CegarError, Slot};
use relu_cegar::{DenseNetwork, Network, NetworkOptions, Property};

type Members = Vec<NeuronRef>;

/// Every abstract edge as `(source members, destination members) -> weight`.
fn snapshot(network: &Network) -> BTreeMap<(Members, Members), f64> {
    let store = network.store();
    let members = |id| {
        let mut refs: Vec<NeuronRef> = store
            .arnode(id)
            .unwrap()
            .constituents()
            .iter()
            .map(|&n| store.node(n).unwrap().origin())
            .collect();
        refs.sort();
        refs
    };
    let mut edges = BTreeMap::new();
    for layer in network.layers() {
        for id in layer.arnode_ids() {
            for edge in store.arnode(id).unwrap().edges(Dir::Out).iter() {
                edges.insert((members(id), members(edge.neighbor)), edge.weight);
            }
        }
    }
    edges
}

/// Every outgoing abstract edge has a mirrored incoming edge.
fn assert_symmetric(network: &Network) {
    let store = network.store();
    for layer in network.layers() {
        for id in layer.arnode_ids() {
            let arnode = store.arnode(id).unwrap();
            for edge in arnode.edges(Dir::Out).iter() {
                let back = store
                    .arnode(edge.neighbor)
                    .unwrap()
                    .edges(Dir::In)
                    .get(arnode.location().edge_key())
                    .copied()
                    .unwrap();
                assert_eq!(back.neighbor, id);
                assert_eq!(back.weight, edge.weight);
            }
        }
    }
}

/// 3 inputs, 3 hidden neurons, 1 output, mixed signs.
fn mixed() -> DenseNetwork {
    DenseNetwork::new(
        vec![InputRange { min: 0.0, max: 1.0 }; 3],
        vec![
            DenseLayer {
                weights: vec![
                    vec![1.0, 2.0, 0.5],
                    vec![3.0, 1.0, 1.0],
                    vec![2.0, -1.0, 4.0],
                ],
                biases: vec![0.0, 0.5, -0.5],
            },
            DenseLayer {
                weights: vec![vec![1.0, 2.0, 1.5]],
                biases: vec![0.0],
            },
        ],
    )
    .unwrap()
}

fn abstracted() -> Network {
    let property = Property::OutputAtLeast {
        output: 0,
        threshold: 4.0,
    };
    let mut network = Network::build(&mixed(), property, NetworkOptions::new()).unwrap();
    network.abstract_network().unwrap();
    network
}

#[test]
fn id_allocator_release_sequence() {
    let mut ids = IdAllocator::bounded(501);
    for expected in 0..=10 {
        assert_eq!(ids.allocate().unwrap(), expected);
    }
    let mut release = |batch: &[u64], expected: &[(u64, u64)]| {
        for &id in batch {
            ids.release(id);
        }
        assert_eq!(ids.free_ranges(), expected);
    };
    release(&[5, 7, 6], &[(5, 8), (11, 501)]);
    release(&[1, 3, 2], &[(1, 4), (5, 8), (11, 501)]);
    release(&[4], &[(1, 8), (11, 501)]);
    release(&[0], &[(0, 8), (11, 501)]);
    release(&[8, 9], &[(0, 10), (11, 501)]);
    release(&[10], &[(0, 501)]);
}

#[test]
fn append_only_chain_offsets() {
    let mut chain: TableChain<u32> = TableChain::new(&[TableKind::AppendOnly; 5]);
    assert!((0..5).all(|t| chain.starting_index(t).is_none()));

    chain.insert_with(0, |_| Ok(10)).unwrap();
    assert_eq!(chain.starting_index(0), Some(0));
    assert!((1..5).all(|t| chain.starting_index(t).is_none()));

    chain.insert_with(0, |_| Ok(11)).unwrap();
    chain.insert_with(3, |_| Ok(12)).unwrap();
    chain.insert_with(2, |_| Ok(13)).unwrap();
    assert_eq!(chain.starting_index(2), Some(2));
    assert_eq!(chain.starting_index(3), Some(3));
    assert_eq!(chain.global_index(3, Slot(0)).unwrap(), 3);
    assert!(matches!(chain.remove(0, Slot(0)), Err(CegarError::AppendOnly { table: 0 })));
}

#[test]
fn merge_then_split_back_restores_abstract_edges() {
    let mut network = abstracted();
    assert_symmetric(&network);
    let before = snapshot(&network);

    let candidate = network.decide_merge().unwrap();
    let originals = [candidate.first, candidate.second].map(|id| {
        network.store().arnode(id).unwrap().constituents().to_vec()
    });
    let merged = network.apply_merge(&candidate).unwrap();
    assert_symmetric(&network);
    assert_ne!(snapshot(&network), before);
    assert!(matches!(
        network.store().arnode(candidate.first),
        Err(CegarError::UseAfterDestroy { .. })
    ));

    network
        .split_arnode(candidate.layer, merged, &originals)
        .unwrap();
    assert_symmetric(&network);
    assert_eq!(snapshot(&network), before);
}

#[test]
fn repeated_merges_keep_edges_symmetric() {
    let mut network = abstracted();
    let mut merges = 0;
    while let Ok(candidate) = network.decide_merge() {
        network.apply_merge(&candidate).unwrap();
        assert_symmetric(&network);
        merges += 1;
    }
    assert!(merges >= 1);
    let summary = network.abstraction_summary().unwrap();
    let hidden = &summary[1];
    // one arnode left per populated hidden table
    let mut categories: Vec<_> = hidden.arnodes.iter().map(|a| a.category).collect();
    categories.dedup();
    assert_eq!(categories.len(), hidden.arnodes.len());
    // every hidden neuron is still represented
    let mut neurons: Vec<_> = hidden
        .arnodes
        .iter()
        .flat_map(|a| a.members.iter().map(|m| m.index))
        .collect();
    neurons.sort();
    neurons.dedup();
    assert_eq!(neurons, vec![0, 1, 2]);
}

#[test]
fn abstraction_is_built_once() {
    let mut network = abstracted();
    let before = snapshot(&network);
    network.abstract_network().unwrap();
    assert!(!network.advance_frontier().unwrap());
    assert_eq!(network.fully_activate_next_layer().unwrap(), None);
    assert_eq!(snapshot(&network), before);
}
