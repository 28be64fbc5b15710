use async_trait::async_trait;

use crate::id::{BlobKey, FileId, OwnerId};
use crate::record::{FileRecord, NewFileRecord};
use crate::Result;

pub mod folder;
pub mod json;
pub mod memory;

pub use folder::FolderBlobStore;
pub use json::JsonMetadataStore;
pub use memory::{BlobOp, MemoryBlobStore, MemoryMetadataStore, MetadataOp};

/// Key-addressed byte storage.
/// Failures are reported as [`crate::SyncError::BlobStore`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create an object. Fails if the key is already taken.
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()>;

    /// Create or overwrite an object.
    async fn upsert(&self, key: &BlobKey, bytes: &[u8]) -> Result<()>;

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>>;

    /// Remove an object. Removing a missing key is not an error.
    async fn remove(&self, key: &BlobKey) -> Result<()>;

    /// All keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobKey>>;
}

/// Structured file records.
/// Failures are reported as [`crate::SyncError::MetadataStore`].
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store a new record, assigning its id and creation time.
    async fn insert(&self, record: NewFileRecord) -> Result<FileId>;

    /// Records of `owner`, newest first. Records created at the same
    /// instant keep the order in which the store received them.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FileRecord>>;

    async fn find_by_id(&self, id: &FileId) -> Result<Option<FileRecord>>;

    /// Fails with [`crate::SyncError::NotFound`] if no such record exists.
    async fn delete_by_id(&self, id: &FileId) -> Result<()>;
}

/// Sort newest first, keeping arrival order among equal timestamps.
pub(crate) fn newest_first(records: &mut [FileRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
