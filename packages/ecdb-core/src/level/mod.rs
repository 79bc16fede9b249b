//! Level-file binary container: C1-C6's persistence-adjacent supplement. Pure
//! byte-level codec only; allocating entities and running init hooks against a live
//! world is `ecdb-runtime::world`'s job.

pub mod codec;
pub mod schema;

pub use codec::{decode, encode, read_level_file, write_level_file, EntityGroup, LevelContainer};
pub use schema::{ComponentDescription, FieldFeature, FieldSchema, LevelSchema};
