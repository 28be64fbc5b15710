use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{newest_first, MetadataStore};
use crate::atomic::TmpFile;
use crate::id::{FileId, OwnerId};
use crate::record::{FileRecord, NewFileRecord};
use crate::{Result, SyncError};

const STORAGE_VERSION: i32 = 1;

/// On-disk layout. Records are kept in the order they were inserted.
#[derive(Serialize, Deserialize)]
struct JsonMetadataData {
    version: i32,
    records: Vec<FileRecord>,
}

/// Metadata store persisted as a single versioned JSON document.
///
/// The whole document is held in memory and rewritten on every
/// mutation through a scratch file, so a crash leaves either the
/// previous or the next state on disk.
pub struct JsonMetadataStore {
    label: String,
    path: PathBuf,
    records: Mutex<Vec<FileRecord>>,
}

impl JsonMetadataStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(label: impl Into<String>, path: &Path) -> Result<Self> {
        let label = label.into();
        let records = if path.exists() {
            Self::read_fs(&label, path)?
        } else {
            Vec::new()
        };
        log::info!("{}: {} records loaded from {}", label, records.len(), path.display());
        Ok(Self {
            label,
            path: PathBuf::from(path),
            records: Mutex::new(records),
        })
    }

    fn read_fs(label: &str, path: &Path) -> Result<Vec<FileRecord>> {
        let file = fs::File::open(path)?;
        let data: JsonMetadataData = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| SyncError::MetadataStore(format!("{}: {}", label, err)))?;

        match data.version.cmp(&STORAGE_VERSION) {
            std::cmp::Ordering::Equal => Ok(data.records),
            std::cmp::Ordering::Greater => Err(SyncError::MetadataStore(format!(
                "{}: Storage format is newer than the app",
                label
            ))),
            std::cmp::Ordering::Less => Err(SyncError::MetadataStore(format!(
                "{}: Storage format is older than the app",
                label
            ))),
        }
    }

    async fn write_fs(&self, records: &[FileRecord]) -> Result<()> {
        let data = JsonMetadataData {
            version: STORAGE_VERSION,
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&data)?;
        let path = self.path.clone();
        let count = records.len();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let parent = path.parent().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "storage path has no parent directory",
                )
            })?;
            fs::create_dir_all(parent)?;
            let mut tmp = TmpFile::create_in(parent)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path)
        })
        .await?
        .map_err(|e| SyncError::MetadataStore(format!("{}: {}", self.label, e)))?;

        log::debug!("{}: {} records have been written", self.label, count);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn insert(&self, record: NewFileRecord) -> Result<FileId> {
        let mut records = self.records.lock().await;
        let id = FileId::new();
        let mut updated = records.clone();
        updated.push(record.into_record(id, Utc::now()));
        self.write_fs(&updated).await?;
        *records = updated;
        Ok(id)
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FileRecord>> {
        let mut listed: Vec<FileRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| &r.owner_id == owner)
            .cloned()
            .collect();
        newest_first(&mut listed);
        Ok(listed)
    }

    async fn find_by_id(&self, id: &FileId) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| &r.id == id)
            .cloned())
    }

    async fn delete_by_id(&self, id: &FileId) -> Result<()> {
        let mut records = self.records.lock().await;
        let updated: Vec<FileRecord> =
            records.iter().filter(|r| &r.id != id).cloned().collect();
        if updated.len() == records.len() {
            return Err(SyncError::NotFound(format!("File record {}", id)));
        }
        self.write_fs(&updated).await?;
        *records = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BlobKey;
    use tempdir::TempDir;

    fn new_record(owner: &OwnerId, name: &str, size: u64) -> NewFileRecord {
        NewFileRecord {
            owner_id: owner.clone(),
            display_name: name.to_owned(),
            size_bytes: size,
            content_type: "text/plain".to_owned(),
            blob_key: BlobKey::generate(owner, name),
        }
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = TempDir::new("json_meta").unwrap();
        let path = dir.path().join("files.json");
        let owner = OwnerId::new("alice");

        let id = {
            let store = JsonMetadataStore::open("files", &path).unwrap();
            store.insert(new_record(&owner, "notes.txt", 10)).await.unwrap()
        };

        let store = JsonMetadataStore::open("files", &path).unwrap();
        let found = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.display_name, "notes.txt");
        assert_eq!(found.size_bytes, 10);
        assert_eq!(store.list_by_owner(&owner).await.unwrap(), vec![found]);
    }

    #[tokio::test]
    async fn delete_is_persisted() {
        let dir = TempDir::new("json_meta").unwrap();
        let path = dir.path().join("files.json");
        let owner = OwnerId::new("alice");

        let store = JsonMetadataStore::open("files", &path).unwrap();
        let keep = store.insert(new_record(&owner, "a.txt", 1)).await.unwrap();
        let gone = store.insert(new_record(&owner, "b.txt", 2)).await.unwrap();
        store.delete_by_id(&gone).await.unwrap();
        assert!(matches!(
            store.delete_by_id(&gone).await,
            Err(SyncError::NotFound(_))
        ));

        let reopened = JsonMetadataStore::open("files", &path).unwrap();
        let ids: Vec<FileId> = reopened
            .list_by_owner(&owner)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![keep]);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let dir = TempDir::new("json_meta").unwrap();
        let store = JsonMetadataStore::open("files", &dir.path().join("files.json")).unwrap();
        let owner = OwnerId::new("alice");

        for name in ["first", "second", "third"] {
            store.insert(new_record(&owner, name, 0)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let names: Vec<String> = store
            .list_by_owner(&owner)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.display_name)
            .collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[test]
    fn newer_storage_version_is_rejected() {
        let dir = TempDir::new("json_meta").unwrap();
        let path = dir.path().join("files.json");
        fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();

        match JsonMetadataStore::open("files", &path) {
            Err(SyncError::MetadataStore(msg)) => assert!(msg.contains("newer")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("version 99 must not load"),
        }
    }
}
