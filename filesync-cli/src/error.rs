use filesync::SyncError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No owner given: pass --owner or set `owner` in the config")]
    OwnerMissing,

    #[error("No stored file matches {0:?}")]
    FileNotFound(String),

    #[error("{0:?} matches several files, use one of the ids: {1}")]
    AmbiguousFile(String, String),

    #[error("{0}")]
    Setup(SyncError),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    SyncError(#[from] SyncError),
}
