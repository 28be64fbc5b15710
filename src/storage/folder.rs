use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::{DirEntry, WalkDir};

use super::BlobStore;
use crate::atomic::TmpFile;
use crate::id::BlobKey;
use crate::{Result, SyncError};

const TMP_FOLDER: &str = ".tmp";

/// Blob store keeping every object as a file under `root`,
/// with the `/`-separated key mapped onto nested folders.
///
/// Writes land in a scratch file first and are moved into place,
/// so readers never observe a partially written object.
#[derive(Clone, Debug)]
pub struct FolderBlobStore {
    root: PathBuf,
}

impl FolderBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(TMP_FOLDER))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &BlobKey) -> Result<PathBuf> {
        let raw = key.as_str();
        if raw.is_empty() || raw.starts_with('/') {
            return Err(SyncError::BlobStore(format!("Invalid key: {:?}", raw)));
        }
        let mut path = self.root.clone();
        for part in raw.split('/') {
            if part.is_empty() || part.starts_with('.') || part.contains('\\') {
                return Err(SyncError::BlobStore(format!("Invalid key: {:?}", raw)));
            }
            path.push(part);
        }
        Ok(path)
    }

    async fn write(&self, key: &BlobKey, bytes: &[u8], overwrite: bool) -> Result<()> {
        let destination = self.resolve(key)?;
        let tmp_dir = self.root.join(TMP_FOLDER);
        let size = bytes.len();
        let bytes = bytes.to_vec();
        let label = key.to_string();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut tmp = TmpFile::create_in(&tmp_dir)?;
            tmp.write_all(&bytes)?;
            if overwrite {
                tmp.persist(&destination)
            } else {
                // Linking fails when the destination exists,
                // the scratch file goes away with `tmp`.
                std::fs::hard_link(tmp.path(), &destination)
            }
        })
        .await?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                SyncError::BlobStore(format!("The resource already exists: {}", label))
            }
            _ => SyncError::BlobStore(format!("Failed to write {}: {}", label, e)),
        })?;

        log::trace!("wrote {} bytes to {}", size, key);
        Ok(())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[async_trait]
impl BlobStore for FolderBlobStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        self.write(key, bytes, false).await
    }

    async fn upsert(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        self.write(key, bytes, true).await
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SyncError::BlobStore(format!("Object not found: {}", key))
            }
            _ => SyncError::BlobStore(format!("Failed to read {}: {}", key, e)),
        })
    }

    async fn remove(&self, key: &BlobKey) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} was already absent", key);
                Ok(())
            }
            Err(e) => Err(SyncError::BlobStore(format!(
                "Failed to remove {}: {}",
                key, e
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobKey>> {
        let root = self.root.clone();
        let prefix = prefix.to_owned();

        let keys = tokio::task::spawn_blocking(move || -> Result<Vec<BlobKey>> {
            let mut keys = Vec::new();
            let entries = WalkDir::new(&root)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| !is_hidden(e));
            for entry in entries {
                let entry = entry.map_err(|e| SyncError::BlobStore(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .map_err(|e| SyncError::BlobStore(e.to_string()))?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(BlobKey::new(key));
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await??;

        Ok(keys)
    }
}
