//! On-disk persistence for [`VectorIndex`].
//!
//! A saved index is a pair of files sharing a base path:
//!
//! - `<base>.vecs`: binary vector blob. Little-endian layout:
//!   magic `SLVX`, `u16` format version, `u32` dimension, `u32` record count,
//!   then `count * dimension` `f32` values row-major.
//! - `<base>.json`: sidecar with document texts, metadata, the dimension and
//!   the SHA-256 of the blob.
//!
//! Both files are written atomically (temp file + rename), blob first. A load
//! only succeeds when both files exist and agree with each other.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use searchlight_shared::{DocumentMetadata, Result, SearchlightError};

use crate::VectorIndex;

const BLOB_MAGIC: &[u8; 4] = b"SLVX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// JSON sidecar stored next to the vector blob.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    dimension: usize,
    blob_sha256: String,
    documents: Vec<String>,
    metadata: Vec<DocumentMetadata>,
}

/// Path of the vector blob for `base`.
pub fn blob_path(base: &Path) -> PathBuf {
    with_suffix(base, ".vecs")
}

/// Path of the JSON sidecar for `base`.
pub fn sidecar_path(base: &Path) -> PathBuf {
    with_suffix(base, ".json")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl VectorIndex {
    /// Write the index to `<base>.vecs` and `<base>.json`.
    #[instrument(skip_all, fields(base = %base.display(), documents = self.len()))]
    pub fn save(&self, base: &Path) -> Result<()> {
        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SearchlightError::io(parent, e))?;
        }

        let blob = encode_blob(self.dimension, self.len(), &self.vectors)?;
        let sidecar = Sidecar {
            dimension: self.dimension,
            blob_sha256: sha256_hex(&blob),
            documents: self.documents.clone(),
            metadata: self.metadata.clone(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| SearchlightError::Persistence(format!("sidecar serialization failed: {e}")))?;

        write_atomic(&blob_path(base), &blob)?;
        write_atomic(&sidecar_path(base), &json)?;

        info!(bytes = blob.len(), "saved vector index");
        Ok(())
    }

    /// Replace this index's contents with the artifacts at `base`.
    ///
    /// The saved dimension must equal this index's dimension. On any failure
    /// the index is reset to an empty index of its current dimension and a
    /// [`SearchlightError::Persistence`] is returned.
    #[instrument(skip_all, fields(base = %base.display(), dimension = self.dimension))]
    pub fn load(&mut self, base: &Path) -> Result<()> {
        let expected = self.dimension;
        let loaded = read_artifacts(base).and_then(|restored| {
            if restored.dimension == expected {
                Ok(restored)
            } else {
                Err(SearchlightError::Persistence(format!(
                    "saved index has dimension {}, expected {expected}",
                    restored.dimension
                )))
            }
        });

        match loaded {
            Ok(restored) => {
                info!(
                    documents = restored.len(),
                    dimension = restored.dimension,
                    "loaded vector index"
                );
                *self = restored;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to load vector index, starting empty");
                *self = VectorIndex::new(self.dimension);
                Err(e)
            }
        }
    }

    /// Load a saved index without needing its dimension up front; the index
    /// takes the saved dimension.
    pub fn open(base: &Path) -> Result<Self> {
        read_artifacts(base)
    }
}

fn read_artifacts(base: &Path) -> Result<VectorIndex> {
    let blob_file = blob_path(base);
    let sidecar_file = sidecar_path(base);

    let blob = read_file(&blob_file)?;
    let json = read_file(&sidecar_file)?;

    let sidecar: Sidecar = serde_json::from_slice(&json)
        .map_err(|e| SearchlightError::Persistence(format!("malformed sidecar: {e}")))?;

    let digest = sha256_hex(&blob);
    if digest != sidecar.blob_sha256 {
        return Err(SearchlightError::Persistence(format!(
            "blob checksum mismatch: sidecar has {}, blob hashes to {digest}",
            sidecar.blob_sha256
        )));
    }

    let (dimension, count, vectors) = decode_blob(&blob)?;

    if dimension != sidecar.dimension {
        return Err(SearchlightError::Persistence(format!(
            "dimension mismatch: blob {dimension}, sidecar {}",
            sidecar.dimension
        )));
    }
    if count != sidecar.documents.len() || count != sidecar.metadata.len() {
        return Err(SearchlightError::Persistence(format!(
            "record count mismatch: blob {count}, {} documents, {} metadata entries",
            sidecar.documents.len(),
            sidecar.metadata.len()
        )));
    }

    debug!(dimension, count, "decoded vector blob");
    Ok(VectorIndex {
        dimension,
        vectors,
        documents: sidecar.documents,
        metadata: sidecar.metadata,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        SearchlightError::Persistence(format!("cannot read {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Blob codec
// ---------------------------------------------------------------------------

fn encode_blob(dimension: usize, count: usize, vectors: &[f32]) -> Result<Vec<u8>> {
    let header_field = |name: &str, value: usize| {
        u32::try_from(value).map_err(|_| {
            SearchlightError::Persistence(format!("{name} {value} does not fit the blob header"))
        })
    };
    let dimension = header_field("dimension", dimension)?;
    let count = header_field("record count", count)?;

    let mut out = Vec::with_capacity(HEADER_LEN + vectors.len() * 4);
    out.extend_from_slice(BLOB_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dimension.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    for value in vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Decode a blob into `(dimension, count, row-major values)`.
fn decode_blob(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    let corrupt = |what: &str| SearchlightError::Persistence(format!("corrupt vector blob: {what}"));

    if bytes.len() < HEADER_LEN {
        return Err(corrupt("truncated header"));
    }
    if &bytes[0..4] != BLOB_MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(SearchlightError::Persistence(format!(
            "unsupported vector blob version {version}"
        )));
    }

    let dimension = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let count = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;

    let expected = dimension
        .checked_mul(count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("size overflow"))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected {
        return Err(corrupt(&format!(
            "expected {expected} data bytes, found {}",
            body.len()
        )));
    }

    let vectors = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dimension, count, vectors))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| SearchlightError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| SearchlightError::io(target, e))?;
    debug!(path = %target.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
