//! Column-oriented archetype storage: C4 in the storage stack.

mod partition;
mod row;
#[allow(clippy::module_inception)]
mod table;

pub use partition::Partition;
pub use row::RowId;
pub use table::{
    Table, ENTITY_COLUMN, ORIENTATION_COLUMN, POSITION_COLUMN, RESERVED_COLUMN_COUNT,
    RESERVED_COLUMN_NAMES, SCALE_COLUMN,
};
