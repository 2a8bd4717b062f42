//! On-disk layout for persisted per-(user, method, model) retrieval
//! indexes: a versioned binary `.idx` file plus a `.json` sidecar, written
//! atomically (temp file + rename).
//!
//! Grounded in spec's explicit "no pickle" redesign and the donor's general
//! atomic-write discipline around index files (index files are never read
//! mid-write). Two files per record rather than one, so a reader can
//! validate shape (method/model/chunk count/format version) from the small
//! JSON sidecar before deserializing the larger binary payload.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Chunk;
use crate::error::StorageError;

const MAGIC: &[u8; 4] = b"RIDX";
const FORMAT_VERSION: u16 = 1;

/// Sidecar metadata stored alongside the `.idx` binary, letting a caller
/// validate a persisted index without deserializing the full payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSidecar {
    /// Retrieval method this index was built for (lowercase).
    pub method: String,
    /// Model string this index's pipeline variant is keyed by.
    pub model: String,
    /// Document ids covered by this index.
    pub document_ids: Vec<i64>,
    /// Number of chunks in the payload.
    pub chunk_count: usize,
    /// Binary format version of the accompanying `.idx` file.
    pub format_version: u16,
    /// `true` if the `.idx` payload carries dense vectors alongside chunks.
    pub has_vectors: bool,
}

/// The full persisted state of one retrieval index: chunks, and
/// (for dense-capable engines) their embedding vectors in the same order.
#[derive(Debug, Clone)]
pub struct IndexRecordState {
    /// Chunks in index order.
    pub chunks: Vec<Chunk>,
    /// Per-chunk embedding vectors, parallel to `chunks`. Empty for engines
    /// that don't need persisted vectors (Sparse rebuilds its postings from
    /// `chunks` alone).
    pub vectors: Vec<Vec<f32>>,
}

/// Reads and writes the two-file `.idx` + `.json` index format under a
/// root directory, one subdirectory per username.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    /// Creates a store rooted at `root` (created lazily on first write).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory this store writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the base path (without extension) for a new index file,
    /// following `<root>/<username>/<username>_<docId>_<method_lower>_<6hex>`.
    /// `disambiguator` is the caller-supplied 6-hex suffix (see
    /// [`crate::storage::gen_disambiguator`]).
    #[must_use]
    pub fn base_path(&self, username: &str, document_id: i64, method: &str, disambiguator: &str) -> PathBuf {
        self.root.join(username).join(format!(
            "{username}_{document_id}_{}_{disambiguator}",
            method.to_lowercase()
        ))
    }

    /// Writes `state` to `base_path.idx` / `base_path.json`, atomically.
    /// Returns the path to the `.idx` file (the canonical "location" stored
    /// in the DB record).
    pub fn write(
        &self,
        base_path: &Path,
        method: &str,
        model: &str,
        document_ids: &[i64],
        state: &IndexRecordState,
    ) -> Result<PathBuf, StorageError> {
        if let Some(parent) = base_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let idx_path = base_path.with_extension("idx");
        let json_path = base_path.with_extension("json");
        let has_vectors = !state.vectors.is_empty();

        let idx_bytes = encode_idx(state)?;
        atomic_write(&idx_path, &idx_bytes)?;

        let sidecar = IndexSidecar {
            method: method.to_lowercase(),
            model: model.to_string(),
            document_ids: document_ids.to_vec(),
            chunk_count: state.chunks.len(),
            format_version: FORMAT_VERSION,
            has_vectors,
        };
        let json_bytes = serde_json::to_vec_pretty(&sidecar)?;
        atomic_write(&json_path, &json_bytes)?;

        Ok(idx_path)
    }

    /// Reads a persisted index back from `idx_path` (its sidecar is
    /// expected alongside it with a `.json` extension), validating the
    /// sidecar against the binary payload before returning.
    pub fn read(&self, idx_path: &Path) -> Result<(IndexSidecar, IndexRecordState), StorageError> {
        let json_path = idx_path.with_extension("json");

        let sidecar_bytes = std::fs::read(&json_path)?;
        let sidecar: IndexSidecar = serde_json::from_slice(&sidecar_bytes)?;

        if sidecar.format_version != FORMAT_VERSION {
            return Err(StorageError::StateCorrupt {
                path: idx_path.to_path_buf(),
                reason: format!("unsupported format version {}", sidecar.format_version),
            });
        }

        let idx_bytes = std::fs::read(idx_path)?;
        let state = decode_idx(idx_path, &idx_bytes)?;

        if state.chunks.len() != sidecar.chunk_count {
            return Err(StorageError::StateCorrupt {
                path: idx_path.to_path_buf(),
                reason: format!(
                    "sidecar reports {} chunks but payload has {}",
                    sidecar.chunk_count,
                    state.chunks.len()
                ),
            });
        }
        if sidecar.has_vectors && state.vectors.len() != state.chunks.len() {
            return Err(StorageError::StateCorrupt {
                path: idx_path.to_path_buf(),
                reason: "sidecar declares vectors but payload is missing them".to_string(),
            });
        }

        Ok((sidecar, state))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn encode_idx(state: &IndexRecordState) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(u32::try_from(state.chunks.len()).unwrap_or(u32::MAX)).to_le_bytes());

    for chunk in &state.chunks {
        let encoded = serde_json::to_vec(chunk)?;
        buf.extend_from_slice(&(u32::try_from(encoded.len()).unwrap_or(u32::MAX)).to_le_bytes());
        buf.extend_from_slice(&encoded);
    }

    let has_vectors = !state.vectors.is_empty();
    buf.push(u8::from(has_vectors));
    if has_vectors {
        let dim = state.vectors.first().map_or(0, Vec::len);
        buf.extend_from_slice(&(u32::try_from(dim).unwrap_or(u32::MAX)).to_le_bytes());
        for vector in &state.vectors {
            for component in vector {
                buf.extend_from_slice(&component.to_le_bytes());
            }
        }
    }

    Ok(buf)
}

fn decode_idx(path: &Path, bytes: &[u8]) -> Result<IndexRecordState, StorageError> {
    let corrupt = |reason: String| StorageError::StateCorrupt { path: path.to_path_buf(), reason };

    let mut cursor = bytes;
    let mut magic = [0u8; 4];
    read_exact(&mut cursor, &mut magic).map_err(|_| corrupt("truncated header".to_string()))?;
    if &magic != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }

    let version = read_u16(&mut cursor).map_err(|_| corrupt("truncated version".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported binary version {version}")));
    }

    let chunk_count = read_u32(&mut cursor).map_err(|_| corrupt("truncated chunk count".to_string()))? as usize;

    let mut chunks = Vec::with_capacity(chunk_count);
    for _ in 0..chunk_count {
        let len = read_u32(&mut cursor).map_err(|_| corrupt("truncated chunk length".to_string()))? as usize;
        if cursor.len() < len {
            return Err(corrupt("truncated chunk payload".to_string()));
        }
        let (chunk_bytes, rest) = cursor.split_at(len);
        cursor = rest;
        let chunk: Chunk = serde_json::from_slice(chunk_bytes)?;
        chunks.push(chunk);
    }

    let mut has_vectors_byte = [0u8; 1];
    read_exact(&mut cursor, &mut has_vectors_byte).map_err(|_| corrupt("truncated vector flag".to_string()))?;
    let mut vectors = Vec::new();
    if has_vectors_byte[0] != 0 {
        let dim = read_u32(&mut cursor).map_err(|_| corrupt("truncated vector dim".to_string()))? as usize;
        for _ in 0..chunk_count {
            let mut vector = Vec::with_capacity(dim);
            for _ in 0..dim {
                let f = read_f32(&mut cursor).map_err(|_| corrupt("truncated vector component".to_string()))?;
                vector.push(f);
            }
            vectors.push(vector);
        }
    }

    Ok(IndexRecordState { chunks, vectors })
}

fn read_exact(cursor: &mut &[u8], buf: &mut [u8]) -> std::io::Result<()> {
    if cursor.len() < buf.len() {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
    }
    let (head, rest) = cursor.split_at(buf.len());
    buf.copy_from_slice(head);
    *cursor = rest;
    Ok(())
}

fn read_u16(cursor: &mut &[u8]) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(cursor, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(cursor: &mut &[u8]) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32(cursor: &mut &[u8]) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Generates a 6-hex-digit disambiguator without pulling in a `rand`
/// dependency: hashes the wall-clock time, process id, and a caller-supplied
/// counter together. Collisions simply cause the caller to retry with a
/// bumped counter (astronomically unlikely at this system's per-user file
/// naming scale).
#[must_use]
pub fn gen_disambiguator(counter: u32) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    counter.hash(&mut hasher);
    let digest = hasher.finish();
    format!("{:06x}", digest & 0xFF_FFFF)
}
