//! On-disk layout of a persisted index.
//!
//! ```text
//! <dir>/index.bin        bincode-encoded AnyIndex
//! <dir>/positions.json   position -> chunk id, null for deleted
//! <dir>/index_info.json  dimension, count, timestamp, variant, parameters
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AnyIndex, IndexKind, VectorIndex};
use crate::error::{ConfigError, IndexError};
use crate::utils::file::write_atomic;

pub const INDEX_FILE: &str = "index.bin";
pub const POSITIONS_FILE: &str = "positions.json";
pub const INFO_FILE: &str = "index_info.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub vector_dim: usize,
    pub count: usize,
    pub build_timestamp: DateTime<Utc>,
    pub variant: IndexKind,
    pub variant_params: serde_json::Value,
}

impl IndexInfo {
    pub fn read(dir: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(dir.join(INFO_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Write the index, its position map, and its info file into `dir`.
pub fn save_index(
    dir: &Path,
    index: &AnyIndex,
    positions: &[Option<String>],
    built_at: DateTime<Utc>,
) -> Result<IndexInfo, IndexError> {
    if positions.len() != index.len() {
        return Err(IndexError::Corrupt(format!(
            "position map has {} entries for {} indexed vectors",
            positions.len(),
            index.len()
        )));
    }
    std::fs::create_dir_all(dir)?;

    let info = IndexInfo {
        vector_dim: index.dimension(),
        count: index.len(),
        build_timestamp: built_at,
        variant: index.kind(),
        variant_params: index.params(),
    };

    write_atomic(&dir.join(INDEX_FILE), &index.to_bytes()?)?;
    write_atomic(&dir.join(POSITIONS_FILE), &serde_json::to_vec(positions)?)?;
    // Info goes last so a readable info file implies the other two are complete
    write_atomic(&dir.join(INFO_FILE), &serde_json::to_vec_pretty(&info)?)?;

    info!(dir = %dir.display(), variant = %info.variant, count = info.count, "saved index");
    Ok(info)
}

/// Load an index saved by [`save_index`], checking it against the expected dimension.
pub fn load_index(
    dir: &Path,
    expected_dim: usize,
) -> Result<(AnyIndex, Vec<Option<String>>, IndexInfo), IndexError> {
    let info = IndexInfo::read(dir)?;
    if info.vector_dim != expected_dim {
        return Err(ConfigError::DimensionMismatch {
            expected: info.vector_dim,
            actual: expected_dim,
        }
        .into());
    }

    let index = AnyIndex::from_bytes(&std::fs::read(dir.join(INDEX_FILE))?)?;
    let positions: Vec<Option<String>> =
        serde_json::from_slice(&std::fs::read(dir.join(POSITIONS_FILE))?)?;

    if index.dimension() != info.vector_dim
        || index.len() != info.count
        || positions.len() != info.count
        || index.kind() != info.variant
    {
        return Err(IndexError::Corrupt(format!(
            "index files in {} disagree with {}",
            dir.display(),
            INFO_FILE
        )));
    }

    info!(dir = %dir.display(), variant = %info.variant, count = info.count, "loaded index");
    Ok((index, positions, info))
}
