//! JSON document persistence with whole-file replacement.
//!
//! Writers serialize into a sibling `*.tmp` file and rename it over the
//! target, so readers only ever observe the previous or the new document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ScanError;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ScanError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // Some platforms refuse to rename over an existing file.
        let _ = tokio::fs::remove_file(path).await;
        tokio::fs::rename(&tmp, path).await.map_err(|_| ScanError::from(e))?;
    }
    Ok(())
}

/// Raw file contents, or `None` if the file does not exist.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ScanError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read and deserialize a JSON document, or `None` if it does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ScanError> {
    match read_optional(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Remove a document; a missing file is not an error.
pub async fn remove_optional(path: &Path) -> Result<(), ScanError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
