use std::ops::RangeInclusive;

use tracing::debug;

use super::Network;
use crate::storage::{Dir, Entity};
use crate::types::{ArNodeId, CegarError, NodeId, Result};

/// Pair of arnodes chosen for merging.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeCandidate {
    /// Layer holding both arnodes.
    pub layer: usize,
    /// First arnode, the smaller handle.
    pub first: ArNodeId,
    /// Second arnode.
    pub second: ArNodeId,
    /// Difference of the abstract weights the pair receives from one source.
    pub score: f64,
}

/// Arnode chosen for splitting, with the partition to apply.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitCandidate {
    /// Layer holding the arnode.
    pub layer: usize,
    /// The arnode to split.
    pub arnode: ArNodeId,
    /// Two cells: the isolated constituent and everything else.
    pub partition: Vec<Vec<NodeId>>,
    /// Largest gap between a concrete incoming weight of the isolated
    /// constituent and the abstract weight standing in for it.
    pub score: f64,
}

impl Network {
    /// Interior layers whose arnodes may be merged or split: fully activated
    /// and neither the input nor the output layer. Empty while the frontier
    /// has not reached any interior layer.
    ///
    /// Folding incoming weights with `Max`/`Min` only bounds the output when
    /// the source values are non-negative. Deeper layers read ReLU outputs,
    /// but layer 1 reads the raw inputs, so it is left out as soon as one
    /// input range reaches below zero.
    pub fn refinable_layers(&self) -> RangeInclusive<usize> {
        let last_interior = self.layers.len().saturating_sub(2);
        let floor = if self.has_signed_inputs() { 2 } else { 1 };
        let first = self.frontier.full.map_or(1, |next| next + 1);
        first.max(floor)..=last_interior
    }

    fn has_signed_inputs(&self) -> bool {
        self.input_bounds.iter().any(|&(min, _)| min < 0.0)
    }

    /// Picks the two arnodes whose merge loses the least precision.
    ///
    /// For every arnode feeding an interior layer, every pair of its
    /// outgoing edges into one destination table is scored by the weight
    /// difference. Each layer keeps its smallest score and the smallest of
    /// those wins. Pairs are only compared through a shared source arnode.
    pub fn decide_merge(&self) -> Result<MergeCandidate> {
        let mut best: Option<MergeCandidate> = None;
        for layer in self.refinable_layers().rev() {
            let mut layer_best: Option<MergeCandidate> = None;
            for source in self.layers[layer - 1].arnode_ids() {
                let edges = self.store.arnode(source)?.edges(Dir::Out);
                for pair in edges.combinations(2) {
                    let (a, b) = (pair[0], pair[1]);
                    let score = (a.weight - b.weight).abs();
                    if layer_best.as_ref().map_or(true, |c| score < c.score) {
                        layer_best = Some(MergeCandidate {
                            layer,
                            first: a.neighbor.min(b.neighbor),
                            second: a.neighbor.max(b.neighbor),
                            score,
                        });
                    }
                }
            }
            if let Some(candidate) = layer_best {
                if best.as_ref().map_or(true, |c| candidate.score < c.score) {
                    best = Some(candidate);
                }
            }
        }
        let candidate = best.ok_or(CegarError::NoMergeCandidate)?;
        debug!(
            layer = candidate.layer,
            first = %candidate.first,
            second = %candidate.second,
            score = candidate.score,
            "network.decide_merge"
        );
        Ok(candidate)
    }

    /// Picks the constituent whose abstraction is least faithful and the
    /// partition isolating it from the rest of its arnode.
    ///
    /// Every incoming concrete edge of every constituent of a
    /// multi-constituent arnode is compared with the abstract edge between
    /// the owners of its endpoints; the largest difference wins.
    pub fn decide_split(&self) -> Result<SplitCandidate> {
        let mut best: Option<(usize, ArNodeId, NodeId, f64)> = None;
        for layer in self.refinable_layers().rev() {
            for id in self.layers[layer].arnode_ids() {
                let arnode = self.store.arnode(id)?;
                if arnode.constituents().len() < 2 {
                    continue;
                }
                for &member in arnode.constituents() {
                    let mut score = 0.0_f64;
                    for edge in self.store.node(member)?.edges(Dir::In).iter() {
                        let owner = self.store.owner_of(edge.neighbor)?;
                        let key = self.store.arnode(owner)?.location().edge_key();
                        let abstracted = arnode.edges(Dir::In).get(key).map_or(0.0, |e| e.weight);
                        score = score.max((edge.weight - abstracted).abs());
                    }
                    if best.map_or(true, |(_, _, _, top)| score > top) {
                        best = Some((layer, id, member, score));
                    }
                }
            }
        }
        let (layer, id, member, score) = best.ok_or(CegarError::NoSplitCandidate)?;
        let rest = self
            .store
            .arnode(id)?
            .constituents()
            .iter()
            .copied()
            .filter(|&n| n != member)
            .collect();
        debug!(layer, arnode = %id, node = %member, score, "network.decide_split");
        Ok(SplitCandidate {
            layer,
            arnode: id,
            partition: vec![vec![member], rest],
            score,
        })
    }

    /// Merges two fully activated arnodes of an interior layer.
    pub fn merge_arnodes(&mut self, layer: usize, a: ArNodeId, b: ArNodeId) -> Result<ArNodeId> {
        self.require_refinable(layer)?;
        self.with_layer(layer, |l, ctx| l.merge_arnodes(ctx, a, b))
    }

    /// Splits a fully activated arnode of an interior layer along `partition`.
    pub fn split_arnode(
        &mut self,
        layer: usize,
        id: ArNodeId,
        partition: &[Vec<NodeId>],
    ) -> Result<Vec<ArNodeId>> {
        self.require_refinable(layer)?;
        self.with_layer(layer, |l, ctx| l.split_arnode(ctx, id, partition))
    }

    /// Applies a merge decision.
    pub fn apply_merge(&mut self, candidate: &MergeCandidate) -> Result<ArNodeId> {
        self.merge_arnodes(candidate.layer, candidate.first, candidate.second)
    }

    /// Applies a split decision.
    pub fn apply_split(&mut self, candidate: &SplitCandidate) -> Result<Vec<ArNodeId>> {
        self.split_arnode(candidate.layer, candidate.arnode, &candidate.partition)
    }

    fn require_refinable(&self, layer: usize) -> Result<()> {
        if !self.refinable_layers().contains(&layer) {
            return Err(CegarError::FrontierViolation(
                "merge and split need a fully activated interior layer fed by non-negative values",
            ));
        }
        Ok(())
    }
}
