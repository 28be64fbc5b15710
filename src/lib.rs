#[macro_use]
extern crate lazy_static;

pub mod errors;
pub use errors::{Result, SyncError};

pub mod atomic;
pub mod compensation;
pub mod config;
pub mod controller;
pub mod download;
pub mod editor;
pub mod id;
pub mod notify;
pub mod record;
pub mod session;
pub mod storage;

pub use config::{SyncConfig, SyncOptions};
pub use controller::{DeleteOutcome, FileSyncController, Reconciliation};
pub use download::{DirectoryTarget, SaveTarget};
pub use editor::EditSession;
pub use id::{BlobKey, FileId, OwnerId};
pub use notify::{LogNotifier, MemoryNotifier, Notice, Notifier};
pub use record::{format_size, is_text_content_type, FileRecord, UploadFile};
pub use session::{GlobalSession, Identity, SessionContext, SESSION};
pub use storage::{BlobStore, MetadataStore};

use std::sync::{Mutex, MutexGuard, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub static INIT: Once = Once::new();

/// Blob namespace used when none is configured.
pub const DEFAULT_BUCKET: &str = "user-files";
/// Name of the metadata document inside the data folder.
pub const METADATA_FILE: &str = "files.json";

/// Install the logger once per process. Safe to call from every test.
pub fn initialize() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        log::info!("Initializing filesync");
    });
}

/// Lock `mutex`, recovering the guard of a poisoned one.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
