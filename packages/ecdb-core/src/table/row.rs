//! Row addressing within a table.

/// Identifies a row inside a table: a partition index and a row slot inside it.
/// Stable until defragmentation or migration moves the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub partition: u16,
    pub index: u16,
}

impl RowId {
    pub fn new(partition: u16, index: u16) -> Self {
        Self { partition, index }
    }
}
