//! A single archetype instance: signature, columns, and the partitions holding rows.

use super::partition::Partition;
use super::row::RowId;
use crate::attribute::{AttributeId, AttributeRegistry};
use crate::signature::Signature;

/// Reserved columns present on every table, in fixed column-index order. Hot-loaded
/// by index, never by id lookup.
pub const RESERVED_COLUMN_NAMES: [&str; 4] = ["Entity", "Position", "Orientation", "Scale"];
pub const ENTITY_COLUMN: usize = 0;
pub const POSITION_COLUMN: usize = 1;
pub const ORIENTATION_COLUMN: usize = 2;
pub const SCALE_COLUMN: usize = 3;
pub const RESERVED_COLUMN_COUNT: usize = 4;

#[derive(Clone)]
pub struct Table {
    signature: Signature,
    columns: Vec<AttributeId>,
    column_sizes: Vec<usize>,
    partitions: Vec<Partition>,
    partition_capacity: u16,
    total_rows: usize,
}

impl Table {
    /// `columns` must already include the reserved columns at indices 0..4, in
    /// order, per the `RESERVED_COLUMN_COUNT` invariant. `Database::create_table`
    /// is responsible for prepending them if the caller omitted them.
    pub fn new(
        signature: Signature,
        columns: Vec<AttributeId>,
        registry: &AttributeRegistry,
        partition_capacity: u16,
    ) -> Self {
        let column_sizes = columns.iter().map(|&id| registry.size_of(id)).collect();
        Self {
            signature,
            columns,
            column_sizes,
            partitions: Vec::new(),
            partition_capacity,
            total_rows: 0,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn columns(&self) -> &[AttributeId] {
        &self.columns
    }

    pub fn has_attribute(&self, id: AttributeId) -> bool {
        self.columns.contains(&id)
    }

    pub fn attribute_index(&self, id: AttributeId) -> Option<usize> {
        self.columns.iter().position(|&c| c == id)
    }

    pub fn column_size(&self, column: usize) -> usize {
        self.column_sizes[column]
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, index: u16) -> &Partition {
        &self.partitions[index as usize]
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn push_partition(&mut self) -> u16 {
        self.partitions
            .push(Partition::new(self.partition_capacity, &self.column_sizes));
        (self.partitions.len() - 1) as u16
    }

    /// Allocates a row, filling every column from its default bytes, except tag
    /// (zero-size) columns, which carry no storage.
    pub fn add_row(&mut self, registry: &AttributeRegistry) -> RowId {
        let partition_index = self
            .partitions
            .iter()
            .position(|p| !p.is_full())
            .map(|i| i as u16)
            .unwrap_or_else(|| self.push_partition());
        let partition = &mut self.partitions[partition_index as usize];
        let row_index = partition
            .allocate_row()
            .expect("just-selected partition must have room");
        for (col, &attr) in self.columns.iter().enumerate() {
            let default = registry.default_of(attr);
            if !default.is_empty() {
                partition.write_value(col, row_index, &default);
            }
        }
        self.total_rows += 1;
        RowId::new(partition_index, row_index)
    }

    /// Removes a row. Returns `(attribute, bytes)` for every decay-flagged
    /// component still present, copied out *before* the row is marked invalid.
    pub fn remove_row(
        &mut self,
        row: RowId,
        registry: &AttributeRegistry,
    ) -> Vec<(AttributeId, Vec<u8>)> {
        self.remove_row_exempt(row, registry, &Signature::new())
    }

    /// As [`Table::remove_row`], but components set in `exempt` skip decay even if
    /// decay-flagged. Used by migration: a component that survives into the
    /// destination table was not destroyed, so it must not decay.
    pub fn remove_row_exempt(
        &mut self,
        row: RowId,
        registry: &AttributeRegistry,
        exempt: &Signature,
    ) -> Vec<(AttributeId, Vec<u8>)> {
        let partition = &mut self.partitions[row.partition as usize];
        debug_assert!(partition.is_valid_row(row.index), "double free of a row");
        let mut decayed = Vec::new();
        for (col, &attr) in self.columns.iter().enumerate() {
            if registry.is_decaying(attr) && !exempt.is_set(attr) {
                decayed.push((attr, partition.read_value(col, row.index)));
            }
        }
        partition.free_row(row.index);
        self.total_rows = self.total_rows.saturating_sub(1);
        decayed
    }

    pub fn get_buffer(&self, partition: u16, column: usize) -> *mut u8 {
        self.partitions[partition as usize].column_ptr(column)
    }

    pub fn value_pointer(&self, column: usize, row: RowId) -> *mut u8 {
        self.partitions[row.partition as usize].value_ptr(column, row.index)
    }

    pub fn read_value(&self, column: usize, row: RowId) -> Vec<u8> {
        self.partitions[row.partition as usize].read_value(column, row.index)
    }

    pub fn write_value(&mut self, column: usize, row: RowId, bytes: &[u8]) {
        self.partitions[row.partition as usize].write_value(column, row.index, bytes);
    }

    pub fn mark_modified(&mut self, row: RowId) {
        self.partitions[row.partition as usize].mark_modified(row.index);
    }

    pub fn entity_at(&self, row: RowId) -> crate::id_pool::Entity {
        let bytes = self.read_value(ENTITY_COLUMN, row);
        crate::id_pool::Entity::from_bits(u32::from_ne_bytes(bytes.try_into().unwrap()))
    }

    fn set_entity_at(&mut self, row: RowId, entity: crate::id_pool::Entity) {
        self.write_value(ENTITY_COLUMN, row, &entity.to_bits().to_ne_bytes());
    }

    /// Compacts every partition: while a partition has holes, swaps its last valid
    /// row into the earliest invalid slot. `on_move(from, to)` fires *before* the
    /// swap so the caller (the World) can retarget its entity map first. Never moves
    /// rows across partition boundaries; an emptied partition is retained, not freed.
    /// Returns the number of rows erased (i.e. holes closed).
    pub fn defragment(&mut self, mut on_move: impl FnMut(RowId, RowId)) -> usize {
        let mut erased = 0;
        for (p_idx, partition) in self.partitions.iter_mut().enumerate() {
            let p_idx = p_idx as u16;
            loop {
                let last_valid = (0..partition.slot_count())
                    .rev()
                    .find(|&i| partition.is_valid_row(i));
                let Some(last_valid) = last_valid else {
                    break;
                };
                let first_invalid = (0..last_valid).find(|&i| !partition.is_valid_row(i));
                let Some(first_invalid) = first_invalid else {
                    break;
                };
                let from = RowId::new(p_idx, last_valid);
                let to = RowId::new(p_idx, first_invalid);
                on_move(from, to);
                for col in 0..partition.column_count() {
                    partition.copy_row_within(col, last_valid, first_invalid);
                }
                partition.complete_compaction_swap(last_valid, first_invalid);
                erased += 1;
            }
        }
        erased
    }

    /// Drops all rows but keeps the table shell (signature, columns, and even the
    /// partitions themselves) so `TableId`s stay stable across a level reload.
    pub fn reset(&mut self) {
        for partition in &mut self.partitions {
            *partition = Partition::new(partition.capacity(), &self.column_sizes);
        }
        self.total_rows = 0;
    }

    /// Deep clone used by world snapshotting (`Database::copy`). `Table` derives
    /// `Clone` directly (every field, down to partition column buffers, is plain
    /// owned data), so this is just a named entry point for that call site.
    pub fn deep_clone(&self) -> Table {
        self.clone()
    }
}
