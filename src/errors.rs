use std::str::Utf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Blob store error: {0}")]
    BlobStore(String),
    #[error("Metadata store error: {0}")]
    MetadataStore(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No active session")]
    NoSession,
    #[error("File cannot be edited inline: {0}")]
    NotEditable(String),
    #[error("{failed} of {total} uploads failed: {first}")]
    Upload {
        total: usize,
        failed: usize,
        first: Box<SyncError>,
    },
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parsing error")]
    Parse,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// The message reported to the user, when the failure carries one.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Self::BlobStore(msg)
            | Self::MetadataStore(msg)
            | Self::NotFound(msg)
            | Self::Config(msg) => msg.clone(),
            Self::Upload { first, .. } => return first.user_message(),
            Self::Parse => return None,
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            None
        } else {
            Some(message)
        }
    }
}

impl From<Utf8Error> for SyncError {
    fn from(_: Utf8Error) -> Self {
        Self::Parse
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Other(anyhow::anyhow!(e.to_string()))
    }
}
