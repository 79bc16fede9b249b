//! A collection of archetype tables, indexed by signature: C5 in the storage stack.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::{AttributeId, AttributeRegistry};
use crate::signature::Signature;
use crate::table::{RowId, Table, RESERVED_COLUMN_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

/// Result of migrating one row from a source table into a (possibly new)
/// destination table.
pub struct MigrationOutcome {
    pub row: RowId,
    /// Components present in the destination but not the source, whose default
    /// bytes are now resident and which the caller should run init hooks for (if
    /// `run_inits` was requested).
    pub newly_present: Vec<AttributeId>,
    /// Components present in the source but not the destination, decay-copied out
    /// before the source row was freed.
    pub decayed: Vec<(AttributeId, Vec<u8>)>,
}

/// Holds every table (archetype) in a world, indexed by signature for O(1)
/// archetype dedup on `create_table`.
pub struct Database {
    registry: Arc<AttributeRegistry>,
    reserved_columns: Vec<AttributeId>,
    tables: Vec<Table>,
    by_signature: HashMap<Signature, TableId>,
    default_partition_capacity: u16,
}

impl Database {
    pub fn new(registry: Arc<AttributeRegistry>, reserved_columns: Vec<AttributeId>) -> Self {
        debug_assert_eq!(reserved_columns.len(), RESERVED_COLUMN_COUNT);
        Self {
            registry,
            reserved_columns,
            tables: Vec::new(),
            by_signature: HashMap::new(),
            default_partition_capacity: 256,
        }
    }

    pub fn with_partition_capacity(mut self, capacity: u16) -> Self {
        self.default_partition_capacity = capacity;
        self
    }

    pub fn registry(&self) -> &Arc<AttributeRegistry> {
        &self.registry
    }

    pub fn reserved_columns(&self) -> &[AttributeId] {
        &self.reserved_columns
    }

    fn full_column_list(&self, components: &[AttributeId]) -> Vec<AttributeId> {
        let mut columns = self.reserved_columns.clone();
        for &c in components {
            if !columns.contains(&c) {
                columns.push(c);
            }
        }
        columns
    }

    /// Finds or creates the archetype table for `components` (reserved columns are
    /// implicit; the caller need not pass them). Archetype dedup: a table with a
    /// matching signature is reused.
    pub fn create_table(&mut self, components: &[AttributeId]) -> TableId {
        self.create_table_with_capacity(components, self.default_partition_capacity)
    }

    pub fn create_table_with_capacity(
        &mut self,
        components: &[AttributeId],
        partition_capacity: u16,
    ) -> TableId {
        let columns = self.full_column_list(components);
        let signature = Signature::of(columns.iter().copied());
        if let Some(&id) = self.by_signature.get(&signature) {
            return id;
        }
        let table = Table::new(signature.clone(), columns, &self.registry, partition_capacity);
        let id = TableId(self.tables.len() as u32);
        self.tables.push(table);
        self.by_signature.insert(signature, id);
        tracing::debug!(table = id.0, "created archetype table");
        id
    }

    pub fn find_table(&self, signature: &Signature) -> Option<TableId> {
        self.by_signature.get(signature).copied()
    }

    pub fn get_table(&self, id: TableId) -> &Table {
        &self.tables[id.0 as usize]
    }

    pub fn get_table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0 as usize]
    }

    pub fn is_valid(&self, id: TableId) -> bool {
        (id.0 as usize) < self.tables.len()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Linear scan over every table, keeping those that are a superset of
    /// `inclusive` and share no bit with `exclusive`. Acceptable because table
    /// count is small; the Frame Pipeline's per-processor cache amortizes this to
    /// O(1) per frame (see `ecdb-runtime::pipeline`).
    pub fn query(&self, inclusive: &Signature, exclusive: &Signature) -> Vec<TableId> {
        self.tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.signature().is_superset(inclusive) && !t.signature().has_any(exclusive))
            .map(|(i, _)| TableId(i as u32))
            .collect()
    }

    pub fn for_each_table(&self, mut f: impl FnMut(TableId, &Table)) {
        for (i, t) in self.tables.iter().enumerate() {
            f(TableId(i as u32), t);
        }
    }

    /// Deep-clones every table into `dst`, for world snapshotting (`override_world`).
    pub fn copy(&self, dst: &mut Database) {
        dst.tables = self.tables.iter().map(Table::deep_clone).collect();
        dst.by_signature = self.by_signature.clone();
        dst.reserved_columns = self.reserved_columns.clone();
        dst.default_partition_capacity = self.default_partition_capacity;
    }

    /// Drops every row in every table, keeping the table shells so `TableId`s stay
    /// stable across a level reload.
    pub fn reset(&mut self) {
        for table in &mut self.tables {
            table.reset();
        }
    }

    /// Migrates one row from `src` into the archetype table for `dst_components`
    /// (created on demand). Columns shared by both signatures carry their values
    /// over; columns only in the destination are left at their defaults and
    /// reported in `newly_present`; columns only in the source decay (if flagged)
    /// and are reported in `decayed`. The source row is freed as part of this call.
    pub fn migrate_row(
        &mut self,
        src: TableId,
        src_row: RowId,
        dst_components: &[AttributeId],
    ) -> (TableId, MigrationOutcome) {
        let dst = self.create_table(dst_components);
        (dst, self.migrate_instance(src, src_row, dst))
    }

    /// As [`Database::migrate_row`] but the destination table is already known.
    /// `src == dst` (the computed destination archetype turned out to equal the
    /// source, e.g. removing a component the entity didn't have) is a no-op: the
    /// row stays exactly where it is.
    pub fn migrate_instance(
        &mut self,
        src: TableId,
        src_row: RowId,
        dst: TableId,
    ) -> MigrationOutcome {
        if src == dst {
            return MigrationOutcome {
                row: src_row,
                newly_present: Vec::new(),
                decayed: Vec::new(),
            };
        }
        let (lo, hi) = if src.0 < dst.0 { (src.0, dst.0) } else { (dst.0, src.0) };
        let (left, right) = self.tables.split_at_mut(hi as usize);
        let lo_table = &mut left[lo as usize];
        let hi_table = &mut right[0];
        let (src_table, dst_table): (&mut Table, &mut Table) = if src.0 < dst.0 {
            (lo_table, hi_table)
        } else {
            (hi_table, lo_table)
        };

        let dst_row = dst_table.add_row(&self.registry);
        let mut newly_present = Vec::new();
        for (col, &attr) in dst_table.columns().to_vec().iter().enumerate() {
            match src_table.attribute_index(attr) {
                Some(src_col) => {
                    let bytes = src_table.read_value(src_col, src_row);
                    dst_table.write_value(col, dst_row, &bytes);
                }
                None => newly_present.push(attr),
            }
        }
        let decayed = src_table.remove_row_exempt(src_row, &self.registry, dst_table.signature());
        MigrationOutcome {
            row: dst_row,
            newly_present,
            decayed,
        }
    }

    /// Batched variant of [`Database::migrate_instance`]. Contract: every row in
    /// `src_rows` lives in `src`.
    pub fn migrate_instances(
        &mut self,
        src: TableId,
        src_rows: &[RowId],
        dst: TableId,
    ) -> Vec<MigrationOutcome> {
        src_rows
            .iter()
            .map(|&row| self.migrate_instance(src, row, dst))
            .collect()
    }
}
