use std::fs::File;
use std::io::{Result, Write};
use std::path::{Path, PathBuf};

const TMP_NAME_LENGTH: usize = 10;

/// Random file name, used for scratch files next to their destination.
pub fn scratch_name() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(TMP_NAME_LENGTH)
        .collect()
}

/// A file that lives exactly as long as this value.
///
/// Either [`TmpFile::persist`] moves it to its final place,
/// or it is removed on drop.
pub struct TmpFile {
    file: Option<File>,
    path: PathBuf,
    persisted: bool,
}

impl TmpFile {
    pub fn create_in(temp_dir: impl AsRef<Path>) -> Result<Self> {
        Self::create_named(temp_dir, &scratch_name())
    }

    /// Like [`TmpFile::create_in`], keeping `suffix` at the end of the
    /// random name so that consumers can still guess the file type.
    pub fn create_named(temp_dir: impl AsRef<Path>, suffix: &str) -> Result<Self> {
        std::fs::create_dir_all(temp_dir.as_ref())?;
        let filename = if suffix.is_empty() {
            scratch_name()
        } else {
            format!("{}-{}", scratch_name(), suffix)
        };
        let path = temp_dir.as_ref().join(filename);
        let file = File::create(&path)?;
        Ok(Self {
            file: Some(file),
            path,
            persisted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(bytes)?;
                file.flush()
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "temporary file already closed",
            )),
        }
    }

    /// Atomically move the file to `destination`.
    pub fn persist(mut self, destination: impl AsRef<Path>) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        std::fs::rename(&self.path, destination)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.persisted {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::debug!(
                    "failed to remove temporary file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn dropped_file_is_removed() {
        let dir = TempDir::new("atomic_test").unwrap();
        let path = {
            let mut tmp = TmpFile::create_in(dir.path()).unwrap();
            tmp.write_all(b"scratch").unwrap();
            assert!(tmp.path().exists());
            tmp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn persisted_file_survives() {
        let dir = TempDir::new("atomic_test").unwrap();
        let destination = dir.path().join("final.txt");

        let mut tmp = TmpFile::create_named(dir.path(), "final.txt").unwrap();
        tmp.write_all(b"kept").unwrap();
        tmp.persist(&destination).unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"kept");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
