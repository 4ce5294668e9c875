//! File-backed section store.
//!
//! Layout inside a save directory:
//! ```text
//! <name>.world/
//!   world.meta.json             - schema version
//!   sections/
//!     <key>.cbor.zst            - CBOR section record, zstd compressed
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Current on-disk schema version.
const SAVE_SCHEMA_VERSION: u32 = 1;

/// Extension appended to a save name to form its directory.
pub const SAVE_EXTENSION: &str = ".world";

const SECTION_SUFFIX: &str = ".cbor.zst";

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("save path is {len} bytes, longer than the {max} byte limit")]
    PathTooLong { len: usize, max: usize },
    #[error("invalid section key: {0:?}")]
    InvalidKey(String),
    #[error("malformed section: {0}")]
    Malformed(String),
}

/// Store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd compression level for section files.
    pub compression_level: i32,
    /// Upper bound on the full path of a save directory, in bytes.
    pub max_path_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            max_path_len: 1024,
        }
    }
}

/// Byte-string keyed backing store for named sections.
pub trait SectionStore: Send {
    /// Read a section. `Ok(None)` if it was never written.
    fn read_section(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Create or replace a section.
    fn write_section(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Keys of every stored section, sorted.
    fn section_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Make every completed write durable.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Metadata stored in world.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMeta {
    pub schema_version: u32,
}

/// On-disk form of one section.
#[derive(Debug, Serialize, Deserialize)]
struct SectionRecord {
    key: String,
    sha256: String,
    payload: Vec<u8>,
}

/// Directory-backed section store with schema versioning and per-section
/// integrity checking.
pub struct SaveStore {
    root: PathBuf,
    meta: SaveMeta,
    config: StoreConfig,
}

impl SaveStore {
    /// Open or create the save called `name` under `dir`, rejecting paths
    /// longer than `config.max_path_len`.
    pub fn open_named(
        dir: impl AsRef<Path>,
        name: &str,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let root = dir.as_ref().join(format!("{name}{SAVE_EXTENSION}"));
        let len = root.as_os_str().len();
        if len > config.max_path_len {
            tracing::error!(len, max = config.max_path_len, "save open aborted, path too long");
            return Err(StoreError::PathTooLong {
                len,
                max: config.max_path_len,
            });
        }
        Self::open(root, config)
    }

    /// Open or create a save store rooted at `path`.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("sections"))?;

        let meta_path = root.join("world.meta.json");
        let meta = if meta_path.exists() {
            let meta: SaveMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != SAVE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: SAVE_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = SaveMeta {
                schema_version: SAVE_SCHEMA_VERSION,
            };
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            meta
        };

        tracing::info!(root = %root.display(), "opened save store");
        Ok(Self { root, meta, config })
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &SaveMeta {
        &self.meta
    }

    fn section_path(&self, key: &str) -> PathBuf {
        self.root.join("sections").join(format!("{key}{SECTION_SUFFIX}"))
    }
}

impl SectionStore for SaveStore {
    fn read_section(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        let path = self.section_path(key);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let cbor_bytes = zstd_decompress(&compressed)?;
        let record: SectionRecord = cbor_deserialize(&cbor_bytes)?;
        if record.key != key {
            return Err(StoreError::Malformed(format!(
                "section file for {key:?} holds {:?}",
                record.key
            )));
        }
        let actual = sha256_hex(&record.payload);
        if actual != record.sha256 {
            return Err(StoreError::IntegrityMismatch {
                expected: record.sha256,
                actual,
            });
        }
        Ok(Some(record.payload))
    }

    fn write_section(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let record = SectionRecord {
            key: key.to_owned(),
            sha256: sha256_hex(data),
            payload: data.to_vec(),
        };
        let cbor_bytes = cbor_serialize(&record)?;
        let compressed = zstd_compress(&cbor_bytes, self.config.compression_level)?;

        let path = self.section_path(key);
        let tmp = path.with_extension("zst.tmp");
        std::fs::write(&tmp, &compressed)?;
        std::fs::rename(&tmp, &path)?;
        tracing::trace!(key, bytes = compressed.len(), "wrote section");
        Ok(())
    }

    fn section_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(self.root.join("sections"))? {
            let name = entry?.file_name();
            if let Some(key) = name.to_str().and_then(|n| n.strip_suffix(SECTION_SUFFIX)) {
                keys.push(key.to_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Section keys become file names, so only a conservative character set is
/// accepted.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_owned()))
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

pub(crate) fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    cbor_serialize(value)
}

pub(crate) fn decode_cbor<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    cbor_deserialize(data)
}

fn zstd_compress(data: &[u8], level: i32) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
