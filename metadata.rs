use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{PqVaultError, Result};

pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar written next to each stored container.
/// Holds nothing secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub filename: String,
    pub plaintext_size: u64,
    pub container_size: u64,
    pub version: String,
}

impl FileMetadata {
    /// `notes.txt` maps to `notes.txt.meta.json`.
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    pub fn is_sidecar(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(SIDECAR_SUFFIX))
    }

    pub async fn record(path: &Path, plaintext_size: u64, container_size: u64) -> Result<Self> {
        let filename = path
            .file_name()
            .ok_or_else(|| PqVaultError::storage(format!("path has no filename: {}", path.display())))?
            .to_string_lossy()
            .into_owned();

        let meta = Self {
            filename,
            plaintext_size,
            container_size,
            version: crate::FORMAT_VERSION.to_string(),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(Self::sidecar_path(path), json).await?;
        Ok(meta)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let meta_path = Self::sidecar_path(path);
        let content = fs::read_to_string(&meta_path).await.map_err(|e| {
            PqVaultError::storage(format!("reading metadata from {:?}: {}", meta_path, e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| PqVaultError::format(format!("parsing metadata from {:?}: {}", meta_path, e)))
    }
}
