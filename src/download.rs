use std::path::{Path, PathBuf};

use crate::{Result, SyncError};

/// The "save as" step of a download: receives a transient local copy
/// of the content and the name the user knows the file by.
///
/// `resource` is only valid for the duration of the call.
pub trait SaveTarget: Send + Sync {
    fn save_as(&self, resource: &Path, display_name: &str) -> Result<PathBuf>;
}

/// Saves downloads into a folder, without overwriting existing files.
#[derive(Clone, Debug)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// First free path for `name`: `name`, `name (1)`, `name (2)`...
    fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        (1..)
            .map(|n| match ext {
                Some(ext) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
                None => self.dir.join(format!("{} ({})", stem, n)),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

/// Strip any directory part from a user supplied name.
pub fn safe_file_name(display_name: &str) -> Result<&str> {
    let name = display_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot save a file named {:?}", display_name),
        )));
    }
    Ok(name)
}

impl SaveTarget for DirectoryTarget {
    fn save_as(&self, resource: &Path, display_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let destination = self.free_path(safe_file_name(display_name)?);
        std::fs::copy(resource, &destination)?;
        log::debug!("saved {} as {}", display_name, destination.display());
        Ok(destination)
    }
}
