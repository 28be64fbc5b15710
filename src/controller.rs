//! The file synchronization state machine.
//!
//! [`FileSyncController`] owns the list of file records of the signed-in
//! user and mediates every mutation against the blob store and the
//! metadata store. The list is a snapshot: each mutating operation ends
//! with a full [`FileSyncController::reload`] which replaces it wholesale,
//! it is never patched in place.
//!
//! The two stores are not transactional. Known gaps:
//! - upload writes the blob first; a failing metadata insert leaves an
//!   orphaned blob unless [`SyncOptions::rollback_failed_uploads`] is set,
//!   in which case the blob is removed again (best effort);
//! - delete removes the blob first; a failing metadata delete leaves a
//!   record pointing at missing content;
//! - saving content never touches `size_bytes`, the stored size keeps
//!   describing the content of the upload.
//!
//! [`FileSyncController::reconcile`] finds what these gaps leave behind.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tokio::runtime::Handle;

use crate::atomic::TmpFile;
use crate::compensation::with_compensation;
use crate::config::{SyncConfig, SyncOptions};
use crate::download::{safe_file_name, SaveTarget};
use crate::editor::EditSession;
use crate::id::{BlobKey, FileId, OwnerId};
use crate::notify::Notifier;
use crate::record::{FileRecord, NewFileRecord, UploadFile};
use crate::session::{Identity, SessionContext, Subscription};
use crate::storage::{BlobStore, FolderBlobStore, JsonMetadataStore, MetadataStore};
use crate::{lock, read, write, Result, SyncError};

const UPLOADED: &str = "Files uploaded successfully!";
const UPLOAD_FAILED: &str = "Error uploading files";
const SAVED: &str = "File saved successfully!";
const SAVE_FAILED: &str = "Error saving file";
const DELETED: &str = "File deleted successfully!";
const DELETE_FAILED: &str = "Error deleting file";
const DOWNLOADED: &str = "File downloaded successfully!";
const DOWNLOAD_FAILED: &str = "Error downloading file";
const LOAD_FAILED: &str = "Error loading file";
const RELOAD_FAILED: &str = "Error loading files";
const PURGE_FAILED: &str = "Error cleaning up files";

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum DeleteOutcome {
    Deleted,
    /// Another delete of the same record was still in flight.
    Suppressed,
}

/// Leftovers of non-atomic writes, as seen from both stores.
#[derive(Default, Eq, PartialEq, Clone, Debug)]
pub struct Reconciliation {
    /// Blobs in the owner's namespace that no record refers to.
    pub orphaned_blobs: Vec<BlobKey>,
    /// Records whose blob is gone.
    pub dangling_records: Vec<FileRecord>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.orphaned_blobs.is_empty() && self.dangling_records.is_empty()
    }
}

/// Membership in a shared set for as long as the guard lives.
struct InFlight<'a, T: Eq + Hash + Clone> {
    set: &'a Mutex<HashSet<T>>,
    item: T,
}

impl<'a, T: Eq + Hash + Clone> InFlight<'a, T> {
    /// `None` if `item` is already in flight.
    fn claim(set: &'a Mutex<HashSet<T>>, item: T) -> Option<Self> {
        if lock(set).insert(item.clone()) {
            Some(Self { set, item })
        } else {
            None
        }
    }
}

impl<T: Eq + Hash + Clone> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.item);
    }
}

pub struct FileSyncController {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    identity: Arc<dyn Identity>,
    notifier: Arc<dyn Notifier>,
    options: SyncOptions,
    files: RwLock<Arc<Vec<FileRecord>>>,
    deleting: Mutex<HashSet<FileId>>,
    uploading: Mutex<HashSet<BlobKey>>,
}

impl FileSyncController {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            blobs,
            metadata,
            identity,
            notifier,
            options: SyncOptions::default(),
            files: RwLock::new(Arc::new(Vec::new())),
            deleting: Mutex::new(HashSet::new()),
            uploading: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Controller over the folder blob store and JSON metadata store
    /// located by `config`.
    pub fn open_local(
        config: &SyncConfig,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let blobs = FolderBlobStore::new(config.blob_root())?;
        let metadata = JsonMetadataStore::open("files", &config.metadata_path())?;
        Ok(
            Self::new(Arc::new(blobs), Arc::new(metadata), identity, notifier)
                .with_options(config.options()),
        )
    }

    /// Current snapshot of the file list, newest first.
    pub fn files(&self) -> Arc<Vec<FileRecord>> {
        read(&self.files).clone()
    }

    /// Keep the list in step with `session`: cleared on sign-out,
    /// reloaded on sign-in when a tokio runtime is available.
    pub fn follow(self: &Arc<Self>, session: &SessionContext) -> Subscription {
        let controller = Arc::downgrade(self);
        session.on_change(move |owner| {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if owner.is_none() {
                controller.replace_files(Vec::new());
                return;
            }
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = controller.reload().await;
                    });
                }
                Err(_) => log::warn!("no runtime to reload files after sign-in"),
            }
        })
    }

    /// Fetch every record of the current owner and replace the list.
    pub async fn reload(&self) -> Result<Arc<Vec<FileRecord>>> {
        let result = self.fetch_files().await;
        self.notify_failure(result, RELOAD_FAILED)
    }

    /// Upload every file of `selection` in order. Files are independent:
    /// a failure does not stop the remaining files nor undo earlier ones.
    /// The selection is cleared only when every file made it.
    pub async fn upload(&self, selection: &mut Vec<UploadFile>) -> Result<Vec<FileId>> {
        if selection.is_empty() {
            return Ok(Vec::new());
        }
        let owner = match self.owner() {
            Ok(owner) => owner,
            Err(err) => return self.notify_failure(Err(err), UPLOAD_FAILED),
        };

        let mut uploaded = Vec::with_capacity(selection.len());
        let mut failures = Vec::new();
        for file in selection.iter() {
            match self.upload_one(&owner, file).await {
                Ok(id) => uploaded.push(id),
                Err(err) => {
                    log::warn!("upload of {} failed: {}", file.name, err);
                    failures.push(err);
                }
            }
        }

        if !uploaded.is_empty() {
            let _ = self.reload().await;
        }

        let total = selection.len();
        let failed = failures.len();
        match failures.into_iter().next() {
            None => {
                log::info!("{} files uploaded for {}", total, owner);
                self.notifier.report_success(UPLOADED);
                selection.clear();
                Ok(uploaded)
            }
            Some(first) => self.notify_failure(
                Err(SyncError::Upload {
                    total,
                    failed,
                    first: Box::new(first),
                }),
                UPLOAD_FAILED,
            ),
        }
    }

    async fn upload_one(&self, owner: &OwnerId, file: &UploadFile) -> Result<FileId> {
        let key = BlobKey::generate(owner, &file.name);
        let _pending = InFlight::claim(&self.uploading, key.clone());

        self.blobs.put(&key, &file.bytes).await?;
        log::debug!("stored {} as {}", file.name, key);

        let record = NewFileRecord {
            owner_id: owner.clone(),
            display_name: file.name.clone(),
            size_bytes: file.size(),
            content_type: file.content_type.clone(),
            blob_key: key.clone(),
        };
        if self.options.rollback_failed_uploads {
            let label = format!("metadata insert for {}", key);
            with_compensation(&label, self.metadata.insert(record), || {
                self.blobs.remove(&key)
            })
            .await
        } else {
            self.metadata.insert(record).await.map_err(|err| {
                log::warn!("{} is orphaned: {}", key, err);
                err
            })
        }
    }

    /// Overwrite the content of `record`. The metadata is left as is,
    /// so `size_bytes` keeps the size of the original upload.
    pub async fn save_content(&self, record: &FileRecord, content: &str) -> Result<()> {
        let result = self.write_content(record, content).await;
        let result = self.notify_failure(result, SAVE_FAILED);
        if result.is_ok() {
            self.notifier.report_success(SAVED);
            let _ = self.reload().await;
        }
        result
    }

    async fn write_content(&self, record: &FileRecord, content: &str) -> Result<()> {
        let owner = self.owner()?;
        let stored = self.ensure_present(&owner, record).await?;
        self.blobs.upsert(&stored.blob_key, content.as_bytes()).await?;

        if stored.size_bytes != content.len() as u64 {
            log::debug!(
                "{}: recorded size stays {} bytes, content is now {} bytes",
                stored.id,
                stored.size_bytes,
                content.len()
            );
        }
        Ok(())
    }

    /// Load `record` into an inline editor. Only text files are editable.
    pub async fn open_editor(&self, record: &FileRecord) -> Result<EditSession> {
        let result = self.load_text(record).await;
        let content = self.notify_failure(result, LOAD_FAILED)?;
        Ok(EditSession::new(record.clone(), content))
    }

    async fn load_text(&self, record: &FileRecord) -> Result<String> {
        if !record.is_text() {
            return Err(SyncError::NotEditable(format!(
                "{} ({})",
                record.display_name, record.content_type
            )));
        }
        self.owner()?;
        let bytes = self.blobs.get(&record.blob_key).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Save the open editor. The editor is closed on success and left
    /// untouched, edits included, on failure.
    pub async fn save_edits(&self, editor: &mut Option<EditSession>) -> Result<()> {
        let Some(session) = editor.as_ref() else {
            return Ok(());
        };
        self.save_content(session.record(), session.content()).await?;
        *editor = None;
        Ok(())
    }

    /// Remove `record` from both stores, blob first.
    ///
    /// Only one delete per record runs at a time; a second request
    /// arriving while the first is in flight is dropped.
    pub async fn delete(&self, record: &FileRecord) -> Result<DeleteOutcome> {
        let Some(_guard) = InFlight::claim(&self.deleting, record.id) else {
            log::debug!("delete of {} already in flight", record.id);
            return Ok(DeleteOutcome::Suppressed);
        };

        let result = self.remove_both(record).await;
        self.notify_failure(result, DELETE_FAILED)?;
        self.notifier.report_success(DELETED);
        let _ = self.reload().await;
        Ok(DeleteOutcome::Deleted)
    }

    async fn remove_both(&self, record: &FileRecord) -> Result<()> {
        let owner = self.owner()?;
        let stored = self.ensure_present(&owner, record).await?;

        self.blobs.remove(&stored.blob_key).await?;
        self.metadata.delete_by_id(&stored.id).await.map_err(|err| {
            log::warn!(
                "{} lost its content but its record remains: {}",
                stored.id,
                err
            );
            err
        })?;
        log::info!("deleted {} ({})", stored.display_name, stored.id);
        Ok(())
    }

    /// Fetch the content of `record` and hand a transient copy to `target`.
    /// The transient copy is removed as soon as `target` returns.
    pub async fn download(
        &self,
        record: &FileRecord,
        target: &dyn SaveTarget,
    ) -> Result<PathBuf> {
        let result = self.fetch_to(record, target).await;
        let saved = self.notify_failure(result, DOWNLOAD_FAILED)?;
        self.notifier.report_success(DOWNLOADED);
        Ok(saved)
    }

    async fn fetch_to(&self, record: &FileRecord, target: &dyn SaveTarget) -> Result<PathBuf> {
        self.owner()?;
        let bytes = self.blobs.get(&record.blob_key).await?;

        let mut resource = TmpFile::create_named(
            &self.options.scratch_dir,
            safe_file_name(&record.display_name)?,
        )?;
        resource.write_all(&bytes)?;
        target.save_as(resource.path(), &record.display_name)
    }

    /// Compare both stores for the current owner.
    ///
    /// Blobs of uploads and records of deletes still in progress are not
    /// reported. The listings are taken in an order that makes this hold
    /// for operations overlapping the comparison: the blob listing comes
    /// before the pending uploads are read, and the pending deletes are
    /// read after the second blob listing.
    pub async fn reconcile(&self) -> Result<Reconciliation> {
        let owner = self.owner()?;
        let namespace = BlobKey::namespace(&owner);

        let keys = self.blobs.list(&namespace).await?;
        let uploading = lock(&self.uploading).clone();
        let records = self.metadata.list_by_owner(&owner).await?;
        let present: HashSet<BlobKey> = self.blobs.list(&namespace).await?.into_iter().collect();
        let deleting = lock(&self.deleting).clone();

        let referenced: HashSet<&BlobKey> = records.iter().map(|r| &r.blob_key).collect();
        let report = Reconciliation {
            orphaned_blobs: keys
                .into_iter()
                .filter(|k| k.belongs_to(&owner))
                .filter(|k| !referenced.contains(k) && !uploading.contains(k))
                .collect(),
            dangling_records: records
                .iter()
                .filter(|r| !present.contains(&r.blob_key) && !deleting.contains(&r.id))
                .cloned()
                .collect(),
        };
        if !report.is_clean() {
            log::warn!(
                "{}: {} orphaned blobs, {} dangling records",
                owner,
                report.orphaned_blobs.len(),
                report.dangling_records.len()
            );
        }
        Ok(report)
    }

    /// Remove what `report` found. Returns the number of removed items.
    ///
    /// Every item is checked again against fresh listings first, so a
    /// report that went stale only removes what is still a leftover.
    pub async fn purge(&self, report: &Reconciliation) -> Result<usize> {
        let result = self.purge_items(report).await;
        let removed = self.notify_failure(result, PURGE_FAILED)?;
        let _ = self.reload().await;
        Ok(removed)
    }

    async fn purge_items(&self, report: &Reconciliation) -> Result<usize> {
        let owner = self.owner()?;
        let mut removed = 0;

        if !report.orphaned_blobs.is_empty() {
            let uploading = lock(&self.uploading).clone();
            let referenced: HashSet<BlobKey> = self
                .metadata
                .list_by_owner(&owner)
                .await?
                .into_iter()
                .map(|r| r.blob_key)
                .collect();
            for key in &report.orphaned_blobs {
                if !key.belongs_to(&owner) || uploading.contains(key) || referenced.contains(key) {
                    log::debug!("{} is no longer orphaned", key);
                    continue;
                }
                self.blobs.remove(key).await?;
                removed += 1;
            }
        }

        if !report.dangling_records.is_empty() {
            let present: HashSet<BlobKey> = self
                .blobs
                .list(&BlobKey::namespace(&owner))
                .await?
                .into_iter()
                .collect();
            for record in &report.dangling_records {
                if record.owner_id != owner || present.contains(&record.blob_key) {
                    continue;
                }
                // A delete of the same record in flight finishes the job itself.
                let Some(_guard) = InFlight::claim(&self.deleting, record.id) else {
                    continue;
                };
                match self.metadata.delete_by_id(&record.id).await {
                    Ok(()) => removed += 1,
                    Err(SyncError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        log::info!("{}: purged {} items", owner, removed);
        Ok(removed)
    }

    async fn fetch_files(&self) -> Result<Arc<Vec<FileRecord>>> {
        let owner = match self.owner() {
            Ok(owner) => owner,
            Err(err) => {
                self.replace_files(Vec::new());
                return Err(err);
            }
        };
        let records = self.metadata.list_by_owner(&owner).await?;

        // A reload started before a change of owner must not
        // overwrite the list of the new owner.
        if self.identity.current_owner_id().as_ref() != Some(&owner) {
            log::debug!("discarding file list of {}", owner);
            return Ok(self.files());
        }
        log::trace!("{} records for {}", records.len(), owner);
        Ok(self.replace_files(records))
    }

    fn replace_files(&self, records: Vec<FileRecord>) -> Arc<Vec<FileRecord>> {
        let snapshot = Arc::new(records);
        *write(&self.files) = snapshot.clone();
        snapshot
    }

    fn owner(&self) -> Result<OwnerId> {
        self.identity.current_owner_id().ok_or(SyncError::NoSession)
    }

    async fn ensure_present(&self, owner: &OwnerId, record: &FileRecord) -> Result<FileRecord> {
        match self.metadata.find_by_id(&record.id).await? {
            Some(stored) if &stored.owner_id == owner => Ok(stored),
            _ => Err(SyncError::NotFound(format!(
                "{} no longer exists",
                record.display_name
            ))),
        }
    }

    fn notify_failure<T>(&self, result: Result<T>, fallback: &str) -> Result<T> {
        if let Err(err) = &result {
            let message = err.user_message().unwrap_or_else(|| fallback.to_owned());
            self.notifier.report_error(&message);
        }
        result
    }
}
