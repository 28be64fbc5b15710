use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::id::OwnerId;
use crate::{Result, SyncError, DEFAULT_BUCKET, METADATA_FILE};

const APP_FOLDER: &str = "filesync";
const CONFIG_FILE: &str = "config.toml";

/// Behaviour switches of the controller.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Remove the freshly written blob when its metadata insert fails.
    pub rollback_failed_uploads: bool,
    /// Where transient download resources are created.
    pub scratch_dir: PathBuf,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            rollback_failed_uploads: true,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Settings read from `config.toml`. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub bucket: String,
    pub downloads_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub owner: Option<OwnerId>,
    pub rollback_failed_uploads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_FOLDER);
        let downloads_dir = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir,
            bucket: DEFAULT_BUCKET.to_owned(),
            downloads_dir,
            scratch_dir: None,
            owner: None,
            rollback_failed_uploads: true,
        }
    }
}

impl SyncConfig {
    /// `<platform config dir>/filesync/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_FOLDER).join(CONFIG_FILE))
            .ok_or_else(|| {
                SyncError::Config("Unable to determine config directory".to_owned())
            })
    }

    /// Load the config at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.bucket.is_empty()
            || self.bucket.contains(['/', '\\'])
            || self.bucket.starts_with('.')
        {
            return Err(SyncError::Config(format!(
                "Invalid bucket name: {:?}",
                self.bucket
            )));
        }
        Ok(())
    }

    pub fn blob_root(&self) -> PathBuf {
        self.data_dir.join(&self.bucket)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_FILE)
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            rollback_failed_uploads: self.rollback_failed_uploads,
            scratch_dir: self
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}
