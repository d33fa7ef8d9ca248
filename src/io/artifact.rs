//! Binary codecs for vector index and docstore files, plus the JSON metadata mirror.
//!
//! Both binary artifacts are bincode (fixed-int, little-endian) with a leading magic and
//! format version. The vector index additionally carries a BLAKE3 digest of its payload
//! so a truncated or bit-flipped file is rejected instead of silently loaded.

use std::path::Path;

use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use crate::artifact_config;
use crate::constants::{
    DOCSTORE_MAGIC, DOCSTORE_VERSION, MAX_ARTIFACT_BYTES, VEC_INDEX_MAGIC, VEC_INDEX_VERSION,
};
use crate::error::{DocvecError, Result};
use crate::store::vec_index::checksum_of;
use crate::store::{Docstore, VecIndex};
use crate::types::MetadataRecord;

#[derive(Serialize, Deserialize)]
struct VecIndexArtifact {
    magic: [u8; 4],
    version: u16,
    dimension: u32,
    count: u64,
    checksum: [u8; 32],
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct DocstoreArtifact {
    magic: [u8; 4],
    version: u16,
    store: Docstore,
}

#[derive(Serialize)]
struct DocstoreArtifactRef<'a> {
    magic: [u8; 4],
    version: u16,
    store: &'a Docstore,
}

pub fn encode_vec_index(index: &VecIndex) -> Result<Vec<u8>> {
    let artifact = VecIndexArtifact {
        magic: VEC_INDEX_MAGIC,
        version: VEC_INDEX_VERSION,
        dimension: index.dimension() as u32,
        count: index.len() as u64,
        checksum: index.checksum(),
        data: index.raw().to_vec(),
    };
    Ok(encode_to_vec(&artifact, artifact_config())?)
}

pub fn decode_vec_index(bytes: &[u8], path: &Path) -> Result<VecIndex> {
    let invalid = |reason: String| DocvecError::InvalidArtifact {
        path: path.to_path_buf(),
        reason,
    };
    let (artifact, _): (VecIndexArtifact, usize) = decode_from_slice(bytes, artifact_config())?;
    if artifact.magic != VEC_INDEX_MAGIC {
        return Err(invalid("not a vector index (bad magic)".into()));
    }
    if artifact.version != VEC_INDEX_VERSION {
        return Err(invalid(format!(
            "unsupported vector index version {}",
            artifact.version
        )));
    }
    let dimension = artifact.dimension as usize;
    let expected_floats = (artifact.count as usize)
        .checked_mul(dimension)
        .ok_or_else(|| invalid("vector count overflows".into()))?;
    if artifact.data.len() != expected_floats {
        return Err(invalid(format!(
            "header declares {} vectors of dimension {} but payload holds {} floats",
            artifact.count,
            dimension,
            artifact.data.len()
        )));
    }
    if checksum_of(&artifact.data) != artifact.checksum {
        return Err(invalid("payload checksum mismatch".into()));
    }
    VecIndex::from_raw(dimension, artifact.data)
}

pub fn encode_docstore(store: &Docstore) -> Result<Vec<u8>> {
    let artifact = DocstoreArtifactRef {
        magic: DOCSTORE_MAGIC,
        version: DOCSTORE_VERSION,
        store,
    };
    Ok(encode_to_vec(&artifact, artifact_config())?)
}

pub fn decode_docstore(bytes: &[u8], path: &Path) -> Result<Docstore> {
    let (artifact, _): (DocstoreArtifact, usize) = decode_from_slice(bytes, artifact_config())?;
    if artifact.magic != DOCSTORE_MAGIC || artifact.version != DOCSTORE_VERSION {
        return Err(DocvecError::InvalidArtifact {
            path: path.to_path_buf(),
            reason: "not a docstore or unsupported version".into(),
        });
    }
    Ok(artifact.store)
}

pub fn encode_metadata<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn read_vec_index(path: &Path) -> Result<VecIndex> {
    let bytes = read_bounded(path)?;
    decode_vec_index(&bytes, path)
}

pub fn read_docstore(path: &Path) -> Result<Docstore> {
    let bytes = read_bounded(path)?;
    decode_docstore(&bytes, path)
}

pub fn read_metadata(path: &Path) -> Result<Vec<MetadataRecord>> {
    let bytes = read_bounded(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn read_bounded(path: &Path) -> Result<Vec<u8>> {
    let len = fs_err::metadata(path)?.len();
    if len > MAX_ARTIFACT_BYTES {
        return Err(DocvecError::InvalidArtifact {
            path: path.to_path_buf(),
            reason: format!("file of {len} bytes exceeds the {MAX_ARTIFACT_BYTES} byte limit"),
        });
    }
    Ok(fs_err::read(path)?)
}
