use std::collections::BTreeMap;

use crate::primitives::IdAllocator;
use crate::types::{CegarError, Result, Slot};

/// Behavior of one table in a chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableKind {
    /// Entries are only ever appended; a slot is a permanent position.
    AppendOnly,
    /// Entries come and go; slots are recycled through an [`IdAllocator`].
    Deletable,
}

#[derive(Clone, Debug)]
enum Storage<H> {
    AppendOnly(Vec<H>),
    Deletable {
        entries: BTreeMap<Slot, H>,
        slots: IdAllocator,
    },
}

/// Ordered container for the entities of one category within a layer.
#[derive(Clone, Debug)]
pub struct Table<H> {
    storage: Storage<H>,
    /// Number of entries held by every table above this one.
    offset: u64,
}

impl<H: Copy> Table<H> {
    fn new(kind: TableKind) -> Self {
        let storage = match kind {
            TableKind::AppendOnly => Storage::AppendOnly(Vec::new()),
            TableKind::Deletable => Storage::Deletable {
                entries: BTreeMap::new(),
                slots: IdAllocator::unbounded(),
            },
        };
        Self { storage, offset: 0 }
    }

    /// Kind of this table.
    pub fn kind(&self) -> TableKind {
        match self.storage {
            Storage::AppendOnly(_) => TableKind::AppendOnly,
            Storage::Deletable { .. } => TableKind::Deletable,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::AppendOnly(entries) => entries.len(),
            Storage::Deletable { entries, .. } => entries.len(),
        }
    }

    /// Whether the table holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_slot(&mut self) -> Result<Slot> {
        match &mut self.storage {
            Storage::AppendOnly(entries) => Ok(Slot(entries.len() as u64)),
            Storage::Deletable { slots, .. } => slots.allocate().map(Slot),
        }
    }

    fn abandon_slot(&mut self, slot: Slot) {
        if let Storage::Deletable { slots, .. } = &mut self.storage {
            slots.release(slot.0);
        }
    }

    fn place(&mut self, slot: Slot, handle: H) {
        match &mut self.storage {
            Storage::AppendOnly(entries) => entries.push(handle),
            Storage::Deletable { entries, .. } => {
                entries.insert(slot, handle);
            }
        }
    }

    /// Handle stored at `slot`.
    pub fn get(&self, slot: Slot) -> Option<H> {
        match &self.storage {
            Storage::AppendOnly(entries) => usize::try_from(slot.0)
                .ok()
                .and_then(|i| entries.get(i))
                .copied(),
            Storage::Deletable { entries, .. } => entries.get(&slot).copied(),
        }
    }

    /// Position of `slot` among the live entries of this table.
    pub fn position(&self, slot: Slot) -> Option<u64> {
        match &self.storage {
            Storage::AppendOnly(entries) => (slot.0 < entries.len() as u64).then_some(slot.0),
            Storage::Deletable { entries, .. } => entries
                .contains_key(&slot)
                .then(|| entries.range(..slot).count() as u64),
        }
    }

    /// Entries in slot order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (Slot, H)> + '_> {
        match &self.storage {
            Storage::AppendOnly(entries) => Box::new(
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, &h)| (Slot(i as u64), h)),
            ),
            Storage::Deletable { entries, .. } => {
                Box::new(entries.iter().map(|(&slot, &h)| (slot, h)))
            }
        }
    }
}

/// Tables of one layer, chained so every table knows how many entries sit
/// above it. That count is the table's starting index in the layer-wide
/// numbering.
#[derive(Clone, Debug)]
pub struct TableChain<H> {
    tables: Vec<Table<H>>,
}

impl<H: Copy> TableChain<H> {
    /// Creates a chain with one table per entry of `kinds`, top to bottom.
    pub fn new(kinds: &[TableKind]) -> Self {
        Self {
            tables: kinds.iter().map(|&kind| Table::new(kind)).collect(),
        }
    }

    fn table(&self, table: usize) -> Result<&Table<H>> {
        self.tables
            .get(table)
            .ok_or_else(|| CegarError::InvalidArgument(format!("no table {table}")))
    }

    fn table_mut(&mut self, table: usize) -> Result<&mut Table<H>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| CegarError::InvalidArgument(format!("no table {table}")))
    }

    /// Number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Borrows one table.
    pub fn get_table(&self, table: usize) -> Option<&Table<H>> {
        self.tables.get(table)
    }

    /// Reserves a slot in `table`, builds the entity for it and stores the
    /// returned handle. The slot is given back when `build` fails.
    pub fn insert_with<F>(&mut self, table: usize, build: F) -> Result<(Slot, H)>
    where
        F: FnOnce(Slot) -> Result<H>,
    {
        let target = self.table_mut(table)?;
        let slot = target.next_slot()?;
        let handle = match build(slot) {
            Ok(handle) => handle,
            Err(err) => {
                target.abandon_slot(slot);
                return Err(err);
            }
        };
        target.place(slot, handle);
        self.shift_below(table, 1);
        Ok((slot, handle))
    }

    /// Removes the entry at `slot`. Fails with [`CegarError::AppendOnly`] on
    /// an append-only table.
    pub fn remove(&mut self, table: usize, slot: Slot) -> Result<H> {
        let target = self.table_mut(table)?;
        let handle = match &mut target.storage {
            Storage::AppendOnly(_) => return Err(CegarError::AppendOnly { table }),
            Storage::Deletable { entries, slots } => {
                let handle = entries
                    .remove(&slot)
                    .ok_or(CegarError::EmptySlot { table, slot })?;
                slots.release(slot.0);
                handle
            }
        };
        self.shift_below(table, -1);
        Ok(handle)
    }

    fn shift_below(&mut self, table: usize, delta: i64) {
        for below in self.tables.iter_mut().skip(table + 1) {
            below.offset = below.offset.saturating_add_signed(delta);
        }
    }

    /// Handle at `(table, slot)`.
    pub fn get(&self, table: usize, slot: Slot) -> Result<H> {
        self.table(table)?
            .get(slot)
            .ok_or(CegarError::EmptySlot { table, slot })
    }

    /// Layer-wide index of the first entry of `table`; `None` while the
    /// table is empty.
    pub fn starting_index(&self, table: usize) -> Option<u64> {
        let target = self.tables.get(table)?;
        (!target.is_empty()).then_some(target.offset)
    }

    /// Layer-wide index of the entry at `(table, slot)`.
    pub fn global_index(&self, table: usize, slot: Slot) -> Result<u64> {
        let target = self.table(table)?;
        let position = target
            .position(slot)
            .ok_or(CegarError::EmptySlot { table, slot })?;
        Ok(target.offset + position)
    }

    /// Number of entries in `table`.
    pub fn len(&self, table: usize) -> usize {
        self.tables.get(table).map_or(0, Table::len)
    }

    /// Number of entries across the chain.
    pub fn total_len(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    /// Entries of one table in slot order.
    pub fn iter(&self, table: usize) -> impl Iterator<Item = (Slot, H)> + '_ {
        self.tables.get(table).into_iter().flat_map(Table::iter)
    }

    /// Every handle, table by table.
    pub fn handles(&self) -> Vec<H> {
        self.tables
            .iter()
            .flat_map(|t| t.iter().map(|(_, h)| h))
            .collect()
    }
}
