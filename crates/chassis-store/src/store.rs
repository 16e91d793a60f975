//! [`ComponentStore`] – growable, block-chained table of component records.
//!
//! The store is an owned arena of fixed-capacity [`Block`]s.  Each family is
//! declared once with a per-instance record size (in bytes) and an instance
//! count; the store reserves space for it at the tail of the block chain:
//!
//! - A family whose records fit in one block is never split: when it does not
//!   fit the space remaining in the tail block, a fresh block is appended and
//!   the whole family goes there.
//! - A family larger than one block starts on an empty block and continues
//!   over exactly `ceil(count / records_per_block)` blocks, split only at
//!   record boundaries.
//!
//! No record ever straddles a block boundary.  Records are addressed by
//! `(family, index)`; the [`Extent`] list of each family maps indices to the
//! block that holds them.
//!
//! # Example
//!
//! ```
//! use chassis_store::ComponentStore;
//! use chassis_types::{Attribute, AttrValue, ComponentFamily};
//!
//! let mut store = ComponentStore::new(1024).unwrap();
//! store.declare_family(ComponentFamily::Fan, 96, 4).unwrap();
//!
//! assert!(store.set(ComponentFamily::Fan, 2, Attribute::FanSpeedRpm, 4200u64).unwrap());
//! // Writing the same value again is not a change.
//! assert!(!store.set(ComponentFamily::Fan, 2, Attribute::FanSpeedRpm, 4200u64).unwrap());
//!
//! let mut seen = Vec::new();
//! store.for_each_changed(ComponentFamily::Fan, |rec| seen.push(rec.index())).unwrap();
//! assert_eq!(seen, vec![2]);
//! ```

use std::collections::HashMap;

use chassis_types::{
    AttrValue, Attribute, ChassisError, ComponentFamily, InterfaceStatus, Location, Timestamp,
};
use tracing::{debug, error, info};

use crate::record::ComponentRecord;

/// Default capacity of one store block in bytes.
pub const DEFAULT_BLOCK_CAPACITY: usize = 4096;

/// Default upper bound on the length of the block chain.
pub const DEFAULT_MAX_BLOCKS: usize = 64;

// ────────────────────────────────────────────────────────────────────────────
// Layout types
// ────────────────────────────────────────────────────────────────────────────

/// Index-based handle of a block in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// A contiguous run of one family's records inside a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub block: BlockId,
    /// Byte offset of the first record within the block.
    pub offset: usize,
    /// Family index of the first record in this run.
    pub first_index: usize,
    /// Number of records in this run.
    pub len: usize,
    slot: usize,
}

impl Extent {
    fn contains(&self, index: usize) -> bool {
        index >= self.first_index && index < self.first_index + self.len
    }
}

#[derive(Debug)]
struct Block {
    capacity: usize,
    used: usize,
    records: Vec<ComponentRecord>,
}

impl Block {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            records: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

#[derive(Debug)]
struct FamilyEntry {
    record_size: usize,
    count: usize,
    extents: Vec<Extent>,
    revision: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// ComponentStore
// ────────────────────────────────────────────────────────────────────────────

/// Block-chained arena of [`ComponentRecord`]s with change tracking.
#[derive(Debug)]
pub struct ComponentStore {
    block_capacity: usize,
    max_blocks: usize,
    blocks: Vec<Block>,
    directory: HashMap<ComponentFamily, FamilyEntry>,
    order: Vec<ComponentFamily>,
    revision: u64,
}

impl ComponentStore {
    /// Create a store whose first block holds `block_capacity` bytes.
    pub fn new(block_capacity: usize) -> Result<Self, ChassisError> {
        Self::with_limits(block_capacity, DEFAULT_MAX_BLOCKS)
    }

    /// Create a store that refuses to grow beyond `max_blocks` blocks.
    pub fn with_limits(block_capacity: usize, max_blocks: usize) -> Result<Self, ChassisError> {
        if block_capacity == 0 {
            return Err(ChassisError::Config(
                "block capacity must be non-zero".to_string(),
            ));
        }
        if max_blocks == 0 {
            return Err(ChassisError::Config(
                "block limit must be at least one".to_string(),
            ));
        }
        let mut store = Self {
            block_capacity,
            max_blocks,
            blocks: Vec::new(),
            directory: HashMap::new(),
            order: Vec::new(),
            revision: 0,
        };
        store.push_block()?;
        Ok(store)
    }

    /// Reserve space for `instance_count` records of `record_size` bytes.
    ///
    /// # Errors
    ///
    /// - [`ChassisError::RecordTooLarge`] when one record cannot fit an empty
    ///   block (a configuration invariant violation).
    /// - [`ChassisError::StoreExhausted`] when the chain would exceed its
    ///   block limit or allocation fails.  The store is left unchanged.
    /// - [`ChassisError::DuplicateFamily`] when `family` was already declared.
    pub fn declare_family(
        &mut self,
        family: ComponentFamily,
        record_size: usize,
        instance_count: usize,
    ) -> Result<(), ChassisError> {
        if self.directory.contains_key(&family) {
            return Err(ChassisError::DuplicateFamily(family));
        }
        if record_size == 0 {
            return Err(ChassisError::Config(format!(
                "{family}: record size must be non-zero"
            )));
        }
        if record_size > self.block_capacity {
            error!(
                %family,
                record_size,
                block_capacity = self.block_capacity,
                "record cannot fit an empty store block"
            );
            return Err(ChassisError::RecordTooLarge {
                family,
                record_size,
                block_capacity: self.block_capacity,
            });
        }
        let total = record_size.checked_mul(instance_count).ok_or_else(|| {
            ChassisError::StoreExhausted(format!("{family}: size overflow"))
        })?;

        let (tail_used, tail_remaining) = self
            .blocks
            .last()
            .map_or((self.block_capacity, 0), |b| (b.used, b.remaining()));

        // Plan the chunks first so a failure leaves the chain untouched.
        let chunks: Vec<usize> = if instance_count == 0 {
            Vec::new()
        } else if total <= self.block_capacity {
            vec![instance_count]
        } else {
            let per_block = self.block_capacity / record_size;
            (0..instance_count)
                .step_by(per_block)
                .map(|start| per_block.min(instance_count - start))
                .collect()
        };
        let first_in_tail = match chunks.len() {
            0 => true,
            1 if total <= self.block_capacity => total <= tail_remaining,
            _ => tail_used == 0,
        };
        let new_blocks = chunks.len().saturating_sub(usize::from(first_in_tail));
        if self.blocks.len() + new_blocks > self.max_blocks {
            error!(
                %family,
                needed = new_blocks,
                limit = self.max_blocks,
                "component store block limit reached"
            );
            return Err(ChassisError::StoreExhausted(format!(
                "{family} needs {new_blocks} more block(s); limit is {}",
                self.max_blocks
            )));
        }

        let mut extents = Vec::with_capacity(chunks.len());
        let mut first_index = 0;
        for (i, len) in chunks.into_iter().enumerate() {
            if i > 0 || !first_in_tail {
                self.push_block()?;
            }
            extents.push(self.place(family, record_size, first_index, len)?);
            first_index += len;
        }

        debug!(
            %family,
            record_size,
            instance_count,
            blocks = self.blocks.len(),
            "declared component family"
        );
        self.directory.insert(
            family,
            FamilyEntry {
                record_size,
                count: instance_count,
                extents,
                revision: 0,
            },
        );
        self.order.push(family);
        Ok(())
    }

    // ── record access ────────────────────────────────────────────────────────

    /// Number of declared instances of `family` (zero when undeclared).
    pub fn count(&self, family: ComponentFamily) -> usize {
        self.directory.get(&family).map_or(0, |e| e.count)
    }

    pub fn is_declared(&self, family: ComponentFamily) -> bool {
        self.directory.contains_key(&family)
    }

    /// Declared families in declaration order.
    pub fn families(&self) -> impl Iterator<Item = ComponentFamily> + '_ {
        self.order.iter().copied()
    }

    pub fn record(
        &self,
        family: ComponentFamily,
        index: usize,
    ) -> Result<&ComponentRecord, ChassisError> {
        let (block, slot) = self.locate(family, index)?;
        Ok(&self.blocks[block].records[slot])
    }

    /// Iterate over every record of `family` in index order.
    pub fn records(
        &self,
        family: ComponentFamily,
    ) -> Result<impl Iterator<Item = &ComponentRecord> + '_, ChassisError> {
        let entry = self
            .directory
            .get(&family)
            .ok_or(ChassisError::UnknownFamily(family))?;
        let blocks = &self.blocks;
        Ok(entry
            .extents
            .iter()
            .flat_map(move |e| blocks[e.block.0].records[e.slot..e.slot + e.len].iter()))
    }

    /// Read one attribute.  `Ok(None)` means the attribute belongs to the
    /// family but has never been written.
    pub fn get(
        &self,
        family: ComponentFamily,
        index: usize,
        attribute: Attribute,
    ) -> Result<Option<&AttrValue>, ChassisError> {
        Self::check_attribute(family, attribute)?;
        Ok(self.record(family, index)?.get(attribute))
    }

    /// Write one attribute.  Returns `true` when the value changed, in which
    /// case the record is marked dirty.
    pub fn set(
        &mut self,
        family: ComponentFamily,
        index: usize,
        attribute: Attribute,
        value: impl Into<AttrValue>,
    ) -> Result<bool, ChassisError> {
        Self::check_attribute(family, attribute)?;
        Ok(self.record_mut(family, index)?.write(attribute, value.into()))
    }

    pub fn set_location(
        &mut self,
        family: ComponentFamily,
        index: usize,
        location: Location,
    ) -> Result<bool, ChassisError> {
        Ok(self.record_mut(family, index)?.write_location(location))
    }

    /// Store a classification result.  Only a status change dirties the
    /// record.
    pub fn set_status(
        &mut self,
        family: ComponentFamily,
        index: usize,
        status: InterfaceStatus,
        first_bad_ts: Option<Timestamp>,
    ) -> Result<bool, ChassisError> {
        Ok(self
            .record_mut(family, index)?
            .write_status(status, first_bad_ts))
    }

    pub fn status(
        &self,
        family: ComponentFamily,
        index: usize,
    ) -> Result<InterfaceStatus, ChassisError> {
        Ok(self.record(family, index)?.status())
    }

    // ── change tracking ──────────────────────────────────────────────────────

    /// Visit every dirty record of `family` in index order, clearing each
    /// dirty flag as it is visited.
    ///
    /// Bumps the family revision when at least one record was visited and
    /// returns the number of records visited.
    pub fn for_each_changed(
        &mut self,
        family: ComponentFamily,
        mut visit: impl FnMut(&ComponentRecord),
    ) -> Result<usize, ChassisError> {
        let Self {
            blocks, directory, ..
        } = self;
        let entry = directory
            .get_mut(&family)
            .ok_or(ChassisError::UnknownFamily(family))?;
        let mut visited = 0;
        for ext in &entry.extents {
            for rec in blocks[ext.block.0].records[ext.slot..ext.slot + ext.len].iter_mut() {
                if rec.take_dirty() {
                    visited += 1;
                    visit(rec);
                }
            }
        }
        if visited > 0 {
            entry.revision += 1;
        }
        Ok(visited)
    }

    /// Number of records of `family` currently marked dirty.
    pub fn dirty_count(&self, family: ComponentFamily) -> usize {
        self.records(family)
            .map(|recs| recs.filter(|r| r.is_dirty()).count())
            .unwrap_or(0)
    }

    /// Increment the global revision, returning the new value.
    pub fn bump_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn family_revision(&self, family: ComponentFamily) -> u64 {
        self.directory.get(&family).map_or(0, |e| e.revision)
    }

    // ── layout introspection ─────────────────────────────────────────────────

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Bytes reserved in `block`.
    pub fn block_used(&self, block: BlockId) -> Option<usize> {
        self.blocks.get(block.0).map(|b| b.used)
    }

    pub fn record_size(&self, family: ComponentFamily) -> Option<usize> {
        self.directory.get(&family).map(|e| e.record_size)
    }

    /// The runs that hold `family`'s records, in index order.
    pub fn extents(&self, family: ComponentFamily) -> &[Extent] {
        self.directory
            .get(&family)
            .map(|e| e.extents.as_slice())
            .unwrap_or(&[])
    }

    /// Tear the store down, releasing the whole block chain.  Returns the
    /// number of blocks released.
    pub fn release(self) -> usize {
        let blocks = self.blocks.len();
        info!(blocks, families = self.order.len(), "releasing component store");
        blocks
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn check_attribute(family: ComponentFamily, attribute: Attribute) -> Result<(), ChassisError> {
        if family.has_attribute(attribute) {
            Ok(())
        } else {
            Err(ChassisError::AttributeNotInFamily { family, attribute })
        }
    }

    fn locate(&self, family: ComponentFamily, index: usize) -> Result<(usize, usize), ChassisError> {
        let entry = self
            .directory
            .get(&family)
            .ok_or(ChassisError::UnknownFamily(family))?;
        let out_of_range = || ChassisError::IndexOutOfRange {
            family,
            index,
            count: entry.count,
        };
        if index >= entry.count {
            return Err(out_of_range());
        }
        let ext = entry
            .extents
            .iter()
            .find(|e| e.contains(index))
            .ok_or_else(out_of_range)?;
        Ok((ext.block.0, ext.slot + (index - ext.first_index)))
    }

    fn record_mut(
        &mut self,
        family: ComponentFamily,
        index: usize,
    ) -> Result<&mut ComponentRecord, ChassisError> {
        let (block, slot) = self.locate(family, index)?;
        Ok(&mut self.blocks[block].records[slot])
    }

    fn push_block(&mut self) -> Result<BlockId, ChassisError> {
        if self.blocks.len() >= self.max_blocks {
            return Err(ChassisError::StoreExhausted(format!(
                "block limit of {} reached",
                self.max_blocks
            )));
        }
        self.blocks
            .try_reserve(1)
            .map_err(|e| ChassisError::StoreExhausted(e.to_string()))?;
        self.blocks.push(Block::new(self.block_capacity));
        debug!(blocks = self.blocks.len(), "appended store block");
        Ok(BlockId(self.blocks.len() - 1))
    }

    /// Append `len` records at the tail block.  The caller guarantees they fit.
    fn place(
        &mut self,
        family: ComponentFamily,
        record_size: usize,
        first_index: usize,
        len: usize,
    ) -> Result<Extent, ChassisError> {
        let block_id = BlockId(self.blocks.len().saturating_sub(1));
        let block = self
            .blocks
            .last_mut()
            .ok_or_else(|| ChassisError::StoreExhausted("empty block chain".to_string()))?;
        block
            .records
            .try_reserve(len)
            .map_err(|e| ChassisError::StoreExhausted(e.to_string()))?;
        let extent = Extent {
            block: block_id,
            offset: block.used,
            first_index,
            len,
            slot: block.records.len(),
        };
        block
            .records
            .extend((first_index..first_index + len).map(|i| ComponentRecord::new(family, i)));
        block.used += len * record_size;
        Ok(extent)
    }
}
