use rustc_hash::FxHashMap;

use super::category::Category;
use crate::types::{CegarError, Result, Slot};

/// Identity of an edge endpoint inside the neighboring layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeKey {
    /// Table of the neighbor.
    pub category: Category,
    /// Slot of the neighbor within that table.
    pub slot: Slot,
}

impl EdgeKey {
    /// Builds a key.
    pub const fn new(category: Category, slot: Slot) -> Self {
        Self { category, slot }
    }
}

/// Stored edge payload.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Edge<H> {
    /// Edge weight.
    pub weight: f64,
    /// Handle of the neighbor.
    pub neighbor: H,
}

/// Edge yielded by iteration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EdgeRef<H> {
    /// Location of the neighbor.
    pub key: EdgeKey,
    /// Edge weight.
    pub weight: f64,
    /// Handle of the neighbor.
    pub neighbor: H,
}

/// Per-direction sparse adjacency of one entity, bucketed by neighbor table.
#[derive(Clone, Debug)]
pub struct EdgeSet<H> {
    tables: Vec<FxHashMap<Slot, Edge<H>>>,
}

impl<H: Copy> EdgeSet<H> {
    /// Creates an edge set sized for a neighbor layer with `tables` tables.
    pub fn new(tables: usize) -> Self {
        Self {
            tables: (0..tables).map(|_| FxHashMap::default()).collect(),
        }
    }

    fn bucket(&self, key: EdgeKey) -> Result<&FxHashMap<Slot, Edge<H>>> {
        self.tables
            .get(key.category.index())
            .ok_or_else(|| out_of_range(key))
    }

    fn bucket_mut(&mut self, key: EdgeKey) -> Result<&mut FxHashMap<Slot, Edge<H>>> {
        self.tables
            .get_mut(key.category.index())
            .ok_or_else(|| out_of_range(key))
    }

    /// Inserts or overwrites the edge at `key`.
    pub fn add(&mut self, key: EdgeKey, weight: f64, neighbor: H) -> Result<()> {
        self.bucket_mut(key)?
            .insert(key.slot, Edge { weight, neighbor });
        Ok(())
    }

    /// Edge at `key`, if present.
    pub fn get(&self, key: EdgeKey) -> Option<&Edge<H>> {
        self.tables.get(key.category.index())?.get(&key.slot)
    }

    /// Removes the edge at `key`.
    pub fn remove(&mut self, key: EdgeKey) -> Result<Edge<H>> {
        self.bucket_mut(key)?
            .remove(&key.slot)
            .ok_or(CegarError::NoSuchEdge {
                table: key.category.index(),
                slot: key.slot,
            })
    }

    /// Re-keys an edge after its neighbor relocated.
    ///
    /// Fails with [`CegarError::EdgeConflict`] when `to` is occupied unless
    /// `overwrite` is set.
    pub fn move_edge(&mut self, from: EdgeKey, to: EdgeKey, overwrite: bool) -> Result<()> {
        if from == to {
            self.bucket(from)?
                .get(&from.slot)
                .ok_or(CegarError::NoSuchEdge {
                    table: from.category.index(),
                    slot: from.slot,
                })?;
            return Ok(());
        }
        if !overwrite && self.get(to).is_some() {
            return Err(CegarError::EdgeConflict {
                table: to.category.index(),
                slot: to.slot,
            });
        }
        self.bucket(to)?;
        let edge = self.remove(from)?;
        self.bucket_mut(to)?.insert(to.slot, edge);
        Ok(())
    }

    /// Total number of edges.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    /// Whether no edge is stored.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.is_empty())
    }

    /// Iterates edges by ascending table index; order within a table is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = EdgeRef<H>> + '_ {
        self.tables.iter().enumerate().flat_map(|(index, table)| {
            // Buckets only exist for valid table indexes.
            let category = Category::from_index(index).unwrap_or(Category::Unprocessed);
            table.iter().map(move |(&slot, edge)| EdgeRef {
                key: EdgeKey::new(category, slot),
                weight: edge.weight,
                neighbor: edge.neighbor,
            })
        })
    }

    /// Every unique `r`-sized subset of edges that share one neighbor table.
    pub fn combinations(&self, r: usize) -> Combinations<H> {
        let buckets = self
            .tables
            .iter()
            .enumerate()
            .filter(|(_, table)| r > 0 && table.len() >= r)
            .map(|(index, table)| {
                let category = Category::from_index(index).unwrap_or(Category::Unprocessed);
                table
                    .iter()
                    .map(|(&slot, edge)| EdgeRef {
                        key: EdgeKey::new(category, slot),
                        weight: edge.weight,
                        neighbor: edge.neighbor,
                    })
                    .collect()
            })
            .collect();
        Combinations {
            buckets,
            bucket: 0,
            picks: (0..r).collect(),
            r,
        }
    }
}

fn out_of_range(key: EdgeKey) -> CegarError {
    CegarError::InvalidArgument(format!(
        "edge table {} out of range for this edge set",
        key.category
    ))
}

/// Iterator over same-table edge subsets, see [`EdgeSet::combinations`].
pub struct Combinations<H> {
    buckets: Vec<Vec<EdgeRef<H>>>,
    bucket: usize,
    picks: Vec<usize>,
    r: usize,
}

impl<H: Copy> Iterator for Combinations<H> {
    type Item = Vec<EdgeRef<H>>;

    fn next(&mut self) -> Option<Self::Item> {
        let edges = self.buckets.get(self.bucket)?;
        let item = self.picks.iter().map(|&i| edges[i]).collect();

        // Advance to the next lexicographic pick, or to the next bucket.
        let n = edges.len();
        let r = self.r;
        let mut i = r;
        while i > 0 && self.picks[i - 1] == n - r + (i - 1) {
            i -= 1;
        }
        if i == 0 {
            self.bucket += 1;
            self.picks = (0..r).collect();
        } else {
            self.picks[i - 1] += 1;
            for j in i..r {
                self.picks[j] = self.picks[j - 1] + 1;
            }
        }
        Some(item)
    }
}
