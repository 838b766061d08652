//! On-disk persistence for the similarity index.
//!
//! The file is the JSON form of [`SimilarityIndex`]. Writes go to a sibling
//! temp file that is renamed over the target, so a reader never sees a
//! half-written index.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
    models::{index::IntegrityError, SimilarityIndex},
    services::similarity::PublishedIndex,
};

#[derive(Debug, Error)]
pub enum IndexStoreError {
    #[error("I/O error on index file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed index file {path}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Index failed integrity check: {0}")]
    Integrity(#[from] IntegrityError),
}

/// Loads and validates the index at `path`.
///
/// Returns `Ok(None)` when no index has been written yet. Any index that
/// fails validation is rejected rather than published.
pub async fn load(path: &Path) -> Result<Option<PublishedIndex>, IndexStoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IndexStoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let index: SimilarityIndex =
        serde_json::from_slice(&bytes).map_err(|source| IndexStoreError::Format {
            path: path.to_path_buf(),
            source,
        })?;

    let published = PublishedIndex::new(index)?;

    tracing::info!(
        path = %path.display(),
        version = published.version(),
        documents = published.index().len(),
        "Loaded similarity index"
    );

    Ok(Some(published))
}

/// Version for the next index written to `path`.
///
/// One past the stored version, or 1 when no index exists yet. An
/// unreadable file is an error: overwriting it would restart numbering and
/// let responses cached for an older index with the same version resurface.
pub async fn next_version(path: &Path) -> Result<u64, IndexStoreError> {
    Ok(load(path).await?.map_or(0, |existing| existing.version()) + 1)
}

/// Writes `index` to `path`, replacing any previous file atomically
pub async fn save(path: &Path, index: &SimilarityIndex) -> Result<(), IndexStoreError> {
    let io_error = |source| IndexStoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let json = serde_json::to_vec(index).map_err(|source| IndexStoreError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json).await.map_err(io_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error)?;

    tracing::info!(
        path = %path.display(),
        version = index.version,
        bytes = json.len(),
        "Persisted similarity index"
    );

    Ok(())
}
