use crate::types::{CegarError, Result};

/// Issues the smallest free id from a dense range and reclaims released ids.
///
/// Free space is kept as a sorted flat list of range boundaries
/// `[a0, b0, a1, b1, ...]` where each `[ai, bi)` is free and every gap
/// `[bi, a(i+1))` is in use. Releasing merges neighbouring ranges, so after
/// every issued id comes back the list collapses to the initial `[0, limit)`.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    bounds: Vec<u64>,
    limit: Option<u64>,
    high_water: Option<u64>,
}

impl IdAllocator {
    /// Creates an allocator over `[0, limit)`.
    pub fn bounded(limit: u64) -> Self {
        let bounds = if limit == 0 { Vec::new() } else { vec![0, limit] };
        Self {
            bounds,
            limit: Some(limit),
            high_water: None,
        }
    }

    /// Creates an allocator that never runs out in practice.
    pub fn unbounded() -> Self {
        Self {
            bounds: vec![0, u64::MAX],
            limit: None,
            high_water: None,
        }
    }

    /// Declared exclusive upper bound, if any.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the smallest free id.
    pub fn allocate(&mut self) -> Result<u64> {
        if self.bounds.is_empty() {
            return Err(CegarError::Exhausted {
                limit: self.limit.unwrap_or(u64::MAX),
            });
        }
        let id = self.bounds[0];
        self.bounds[0] += 1;
        if self.bounds[0] == self.bounds[1] {
            self.bounds.drain(0..2);
        }
        self.high_water = Some(self.high_water.map_or(id, |hw| hw.max(id)));
        Ok(id)
    }

    /// Returns `id` to the free space.
    ///
    /// The caller owns the id; releasing an id that is already free leaves the
    /// allocator in an unspecified state.
    pub fn release(&mut self, id: u64) {
        let idx = self.bounds.partition_point(|&b| b <= id);
        debug_assert!(idx % 2 == 0, "id {id} released twice");
        let k = idx / 2;
        let ranges = self.bounds.len() / 2;
        let joins_left = k > 0 && self.bounds[2 * k - 1] == id;
        let joins_right = k < ranges && self.bounds[2 * k] == id + 1;
        match (joins_left, joins_right) {
            (true, true) => {
                self.bounds.drain(2 * k - 1..2 * k + 1);
            }
            (true, false) => self.bounds[2 * k - 1] = id + 1,
            (false, true) => self.bounds[2 * k] = id,
            (false, false) => {
                self.bounds.splice(2 * k..2 * k, [id, id + 1]);
            }
        }
    }

    /// Highest id ever issued, `None` if nothing was allocated yet.
    pub fn max_used(&self) -> Option<u64> {
        self.high_water
    }

    /// Number of free ids, saturating at `u64::MAX` when unbounded.
    pub fn available(&self) -> u64 {
        self.bounds
            .chunks_exact(2)
            .fold(0u64, |total, pair| total.saturating_add(pair[1] - pair[0]))
    }

    /// Whether `id` is currently free.
    pub fn is_free(&self, id: u64) -> bool {
        self.bounds.partition_point(|&b| b <= id) % 2 == 1
    }

    /// Free ranges as half-open `(start, end)` pairs. `u64::MAX` stands for
    /// an unbounded end.
    pub fn free_ranges(&self) -> Vec<(u64, u64)> {
        self.bounds
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate_n(alloc: &mut IdAllocator, n: u64) {
        for expected in 0..n {
            assert_eq!(alloc.allocate().unwrap(), expected);
        }
    }

    #[test]
    fn release_sequence_compacts_ranges() {
        let mut alloc = IdAllocator::bounded(501);
        allocate_n(&mut alloc, 11);
        assert_eq!(alloc.free_ranges(), vec![(11, 501)]);

        for id in [5, 7, 6] {
            alloc.release(id);
        }
        assert_eq!(alloc.free_ranges(), vec![(5, 8), (11, 501)]);

        for id in [1, 3, 2] {
            alloc.release(id);
        }
        assert_eq!(alloc.free_ranges(), vec![(1, 4), (5, 8), (11, 501)]);

        alloc.release(4);
        assert_eq!(alloc.free_ranges(), vec![(1, 8), (11, 501)]);

        alloc.release(0);
        assert_eq!(alloc.free_ranges(), vec![(0, 8), (11, 501)]);

        alloc.release(8);
        alloc.release(9);
        assert_eq!(alloc.free_ranges(), vec![(0, 10), (11, 501)]);

        alloc.release(10);
        assert_eq!(alloc.free_ranges(), vec![(0, 501)]);
    }

    #[test]
    fn allocate_reuses_smallest_released_id() {
        let mut alloc = IdAllocator::unbounded();
        allocate_n(&mut alloc, 4);
        alloc.release(2);
        alloc.release(0);
        assert_eq!(alloc.allocate().unwrap(), 0);
        assert_eq!(alloc.allocate().unwrap(), 2);
        assert_eq!(alloc.allocate().unwrap(), 4);
        assert_eq!(alloc.max_used(), Some(4));
    }

    #[test]
    fn bounded_allocator_exhausts() {
        let mut alloc = IdAllocator::bounded(2);
        assert_eq!(alloc.available(), 2);
        allocate_n(&mut alloc, 2);
        assert_eq!(alloc.available(), 0);
        assert!(matches!(
            alloc.allocate(),
            Err(CegarError::Exhausted { limit: 2 })
        ));
        alloc.release(1);
        assert_eq!(alloc.available(), 1);
        assert_eq!(alloc.allocate().unwrap(), 1);
        assert_eq!(IdAllocator::unbounded().available(), u64::MAX);
    }

    #[test]
    fn zero_limit_is_empty_from_the_start() {
        let mut alloc = IdAllocator::bounded(0);
        assert!(alloc.free_ranges().is_empty());
        assert!(alloc.allocate().is_err());
        assert_eq!(alloc.max_used(), None);
    }

    #[test]
    fn unbounded_collapses_back_to_single_range() {
        let mut alloc = IdAllocator::unbounded();
        allocate_n(&mut alloc, 6);
        for id in [3, 0, 5, 1, 4, 2] {
            alloc.release(id);
        }
        assert_eq!(alloc.free_ranges(), vec![(0, u64::MAX)]);
        assert_eq!(alloc.max_used(), Some(5));
        assert!(alloc.is_free(3));
    }
}
