//! Level-file schema: the first of the three top-level sections of the binary
//! container, serde-backed metadata mirroring the legacy persistence layer's
//! `SchemaFile`/`TableSchema`/`FieldSchema` triad.

use serde::{Deserialize, Serialize};

/// How a field's bytes must be patched after a verbatim column-blob copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFeature {
    Undefined,
    /// Serialized as a string-table offset; restored to an atom pointer on load.
    StringAtom,
    /// Serialized as a 32-bit entity wire form; re-targeted after id allocation.
    EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub feature: FieldFeature,
}

/// Describes one component kind as it appears in the container: its name (resolved
/// against the live `AttributeRegistry` by name, not id, since ids are not stable
/// across process runs), its byte size, and any fields needing post-load patching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub name: String,
    pub type_size: usize,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Top-level schema section of a level file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSchema {
    pub version: u32,
    pub components: Vec<ComponentDescription>,
}

impl LevelSchema {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }
}
