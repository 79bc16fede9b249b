//! Materialized query results: one `View` per matching partition.

use std::marker::PhantomData;

use crate::attribute::AttributeId;
use crate::bitset::Bitset;
use crate::database::{Database, TableId};
use crate::filter::Filter;

/// One partition's worth of a query result: per-projected-column raw pointers and a
/// copy of the partition's valid-rows bitset.
///
/// The raw pointer is the physical representation (per the design note on exposing
/// raw columns to user code); `View` wraps it with a lifetime bound to the
/// `Dataset` it came from and typed, bounds-checked accessors, so callers never see
/// an unbound pointer.
pub struct View<'a> {
    pub table: TableId,
    pub partition: u16,
    /// Number of addressable slots in this partition (its `slot_count`, not
    /// necessarily its full capacity); callers must also check `is_valid`.
    pub len: u16,
    columns: Vec<(*mut u8, usize)>,
    valid_rows: Bitset,
    _marker: PhantomData<&'a Database>,
}

impl<'a> View<'a> {
    pub fn is_valid(&self, row: u16) -> bool {
        self.valid_rows.is_set(row as usize)
    }

    /// Raw pointer to the projected column at `projected_index` (the index into
    /// `Filter::projected`). Null if the component is a zero-size tag.
    pub fn column_ptr(&self, projected_index: usize) -> *mut u8 {
        self.columns[projected_index].0
    }

    pub fn column_size(&self, projected_index: usize) -> usize {
        self.columns[projected_index].1
    }

    /// Typed view of a column as `&[T]` across every slot (including freed ones —
    /// check `is_valid` before trusting an entry). Returns `None` for a tag column
    /// or a size mismatch.
    pub fn column_slice<T: Copy + 'static>(&self, projected_index: usize) -> Option<&[T]> {
        let (ptr, size) = self.columns[projected_index];
        if ptr.is_null() || size != std::mem::size_of::<T>() {
            return None;
        }
        // Safety: `ptr` was derived from a partition column buffer of exactly
        // `len` elements of `size` bytes each, alive for at least `'a` because it
        // borrows from the `Database` the dataset was queried against.
        Some(unsafe { std::slice::from_raw_parts(ptr as *const T, self.len as usize) })
    }

    /// Mutable typed view; callers are responsible for holding only `Write`-access
    /// views concurrently per the batch-acceptance scheduling rule (no per-row
    /// locking is performed here).
    pub fn column_slice_mut<T: Copy + 'static>(&mut self, projected_index: usize) -> Option<&mut [T]> {
        let (ptr, size) = self.columns[projected_index];
        if ptr.is_null() || size != std::mem::size_of::<T>() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut T, self.len as usize) })
    }
}

pub struct Dataset<'a> {
    pub views: Vec<View<'a>>,
}

impl<'a> Dataset<'a> {
    pub fn total_instances(&self) -> usize {
        self.views.iter().map(|v| v.len as usize).sum()
    }
}

/// Materializes `filter` against `database`: one `View` per active partition of
/// every matching table.
pub fn query<'a>(database: &'a Database, filter: &Filter) -> Dataset<'a> {
    query_tables(database, filter, database.query(filter.inclusive(), filter.exclusive()))
}

/// As [`query`], but against an explicit, presumably cached, table-id list (used by
/// the frame pipeline's per-processor prefilter cache).
pub fn query_tables<'a>(database: &'a Database, filter: &Filter, tables: Vec<TableId>) -> Dataset<'a> {
    let mut views = Vec::new();
    for table_id in tables {
        let table = database.get_table(table_id);
        let projected_columns: Vec<Option<usize>> = filter
            .projected()
            .iter()
            .map(|&(id, _)| table.attribute_index(id))
            .collect();
        for (p_idx, partition) in table.partitions().iter().enumerate() {
            let columns = projected_columns
                .iter()
                .zip(filter.projected())
                .map(|(col, &(_id, _mode)): (&Option<usize>, &(AttributeId, _))| match col {
                    Some(c) => (partition.column_ptr(*c), partition.column_size(*c)),
                    None => (std::ptr::null_mut(), 0),
                })
                .collect();
            views.push(View {
                table: table_id,
                partition: p_idx as u16,
                len: partition.slot_count(),
                columns,
                valid_rows: partition.valid_rows.clone(),
                _marker: PhantomData,
            });
        }
    }
    Dataset { views }
}
