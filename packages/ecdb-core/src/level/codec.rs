//! Binary body of a level file: entity groups' column blobs plus a deduplicated
//! string table, packed behind a JSON header and checksummed with `crc32fast`,
//! written with the teacher's atomic temp-file-then-`rename` pattern.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{classify_io_error, EcdbError};

use super::schema::LevelSchema;

/// One archetype's worth of rows: which components it carries (by index into
/// `LevelSchema::components`), how many rows, and one tightly packed column blob
/// per component, each `num_rows * type_size` bytes, in `component_indices` order.
#[derive(Debug, Clone)]
pub struct EntityGroup {
    pub component_indices: Vec<u32>,
    pub num_rows: u32,
    pub column_blobs: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupHeader {
    component_indices: Vec<u32>,
    num_rows: u32,
    blob_lengths: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContainerHeader {
    schema: LevelSchema,
    groups: Vec<GroupHeader>,
    strings: Vec<String>,
}

const MAGIC: &[u8; 8] = b"ECDBLVL1";

/// The fully decoded container: schema, per-archetype row groups, and the
/// deduplicated string table referenced by `string_atom` fields.
pub struct LevelContainer {
    pub schema: LevelSchema,
    pub groups: Vec<EntityGroup>,
    pub strings: Vec<String>,
}

/// Packs `container` into the container's binary wire form: magic, a 4-byte header
/// length, the JSON header, the concatenated column-blob body, and a trailing
/// 4-byte little-endian `crc32fast` checksum of the body.
pub fn encode(container: &LevelContainer) -> Vec<u8> {
    let header = ContainerHeader {
        schema: container.schema.clone(),
        groups: container
            .groups
            .iter()
            .map(|g| GroupHeader {
                component_indices: g.component_indices.clone(),
                num_rows: g.num_rows,
                blob_lengths: g.column_blobs.iter().map(|b| b.len() as u32).collect(),
            })
            .collect(),
        strings: container.strings.clone(),
    };
    let header_json = serde_json::to_vec(&header).expect("level header serializes");

    let mut body = Vec::new();
    for group in &container.groups {
        for blob in &group.column_blobs {
            body.extend_from_slice(blob);
        }
    }
    let mut hasher = Hasher::new();
    hasher.update(&body);
    let checksum = hasher.finalize();

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_json.len() + body.len() + 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&body);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

/// Unpacks bytes produced by [`encode`]. Returns `EcdbError::SchemaDrift` on a bad
/// magic, truncated header, or checksum mismatch — the recoverable decoding path
/// per the error model; callers that want load-time assertions wrap this in their
/// own `debug_assert!`/`.expect(..)`.
pub fn decode(bytes: &[u8]) -> Result<LevelContainer, EcdbError> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(EcdbError::SchemaDrift("bad level file magic".into()));
    }
    let mut offset = MAGIC.len();
    let header_len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
    offset += 4;
    if bytes.len() < offset + header_len + 4 {
        return Err(EcdbError::SchemaDrift("level file truncated".into()));
    }
    let header: ContainerHeader = serde_json::from_slice(&bytes[offset..offset + header_len])?;
    offset += header_len;

    let body_len = bytes.len() - offset - 4;
    let body = &bytes[offset..offset + body_len];
    let stored_checksum = u32::from_le_bytes(bytes[offset + body_len..].try_into().unwrap());
    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_checksum {
        return Err(EcdbError::SchemaDrift("level file checksum mismatch".into()));
    }

    if header.schema.version != LevelSchema::CURRENT_VERSION {
        return Err(EcdbError::SchemaDrift(format!(
            "unsupported level schema version: {}",
            header.schema.version
        )));
    }

    let mut groups = Vec::with_capacity(header.groups.len());
    let mut body_offset = 0;
    for group_header in &header.groups {
        let mut column_blobs = Vec::with_capacity(group_header.blob_lengths.len());
        for &len in &group_header.blob_lengths {
            let len = len as usize;
            column_blobs.push(body[body_offset..body_offset + len].to_vec());
            body_offset += len;
        }
        groups.push(EntityGroup {
            component_indices: group_header.component_indices.clone(),
            num_rows: group_header.num_rows,
            column_blobs,
        });
    }

    Ok(LevelContainer {
        schema: header.schema,
        groups,
        strings: header.strings,
    })
}

/// Writes `container` to `path` via a temp-file-then-`rename`, mirroring the
/// teacher's `PersistenceManager` write path.
pub fn write_level_file(path: &Path, container: &LevelContainer) -> Result<(), EcdbError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| classify_io_error(e, "create level directory"))?;
    }
    let temp_path = path.with_extension("tmp");
    let bytes = encode(container);
    let mut file =
        File::create(&temp_path).map_err(|e| classify_io_error(e, "create level temp file"))?;
    file.write_all(&bytes)
        .map_err(|e| classify_io_error(e, "write level file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "sync level file"))?;
    fs::rename(&temp_path, path).map_err(|e| classify_io_error(e, "rename level file"))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "exported level file");
    Ok(())
}

/// Reads and decodes a level file. A missing file is `Ok(None)` per the "recoverable
/// I/O failure reported as a null result" contract; any other failure is `Err`.
pub fn read_level_file(path: &Path) -> Result<Option<LevelContainer>, EcdbError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path).map_err(|e| classify_io_error(e, "open level file"))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| classify_io_error(e, "read level file"))?;
    let container = decode(&bytes)?;
    tracing::info!(
        path = %path.display(),
        groups = container.groups.len(),
        "loaded level file"
    );
    Ok(Some(container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::schema::{ComponentDescription, FieldFeature, FieldSchema};
    use tempfile::tempdir;

    fn sample_container() -> LevelContainer {
        LevelContainer {
            schema: LevelSchema {
                version: LevelSchema::CURRENT_VERSION,
                components: vec![ComponentDescription {
                    name: "Position".into(),
                    type_size: 4,
                    fields: vec![FieldSchema {
                        name: "x".into(),
                        feature: FieldFeature::Undefined,
                    }],
                }],
            },
            groups: vec![EntityGroup {
                component_indices: vec![0],
                num_rows: 2,
                column_blobs: vec![vec![1, 2, 3, 4, 5, 6, 7, 8]],
            }],
            strings: vec!["hello".into()],
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let container = sample_container();
        let bytes = encode(&container);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.schema.components.len(), 1);
        assert_eq!(decoded.groups[0].column_blobs[0], vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decoded.strings, vec!["hello".to_string()]);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = encode(&sample_container());
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(EcdbError::SchemaDrift(_))));
    }

    #[test]
    fn missing_file_is_ok_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.lvl");
        assert!(read_level_file(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_read_file_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("level.lvl");
        let container = sample_container();
        write_level_file(&path, &container).unwrap();
        let loaded = read_level_file(&path).unwrap().unwrap();
        assert_eq!(loaded.groups[0].num_rows, 2);
    }
}
