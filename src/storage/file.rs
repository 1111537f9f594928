use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{VaultSink, VaultUpdate};
use crate::core::errors::VaultError;
use crate::crypto::VaultEnvelope;

/// Writes the vault envelope as JSON to a single file.
///
/// Only the envelope reaches disk; the exported key stays in memory. Writes
/// go to a sibling temp file which is fsynced and renamed over the target, so
/// the previous vault stays readable until the new one is complete.
#[derive(Debug, Clone)]
pub struct FileVaultSink {
    path: PathBuf,
}

impl FileVaultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[async_trait]
impl VaultSink for FileVaultSink {
    async fn load(&self) -> Result<Option<VaultEnvelope>, VaultError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                debug!(path = %self.path.display(), "Loaded vault file");
                VaultEnvelope::from_json(&raw).map(Some)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Persistence(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn store(&self, update: &VaultUpdate) -> Result<(), VaultError> {
        let serialized = update.encrypted_vault.to_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| VaultError::Persistence(e.to_string()))?;
            }
        }

        // Write to temporary file first
        let temp_path = self.temp_path();
        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(serialized.as_bytes()).await?;
            file.sync_all().await?;
            // Atomic rename
            tokio::fs::rename(&temp_path, &self.path).await?;
            sync_parent_dir(&self.path).await
        };

        if let Err(e) = write.await {
            match tokio::fs::remove_file(&temp_path).await {
                Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                    warn!(path = %temp_path.display(), "Failed to remove temp vault file: {}", cleanup);
                }
                _ => {}
            }
            return Err(VaultError::Persistence(format!(
                "cannot write {}: {}",
                self.path.display(),
                e
            )));
        }

        info!(path = %self.path.display(), "Vault written");
        Ok(())
    }
}

/// Flush the directory entry so the rename itself survives a power loss.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tokio::fs::File::open(parent).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
