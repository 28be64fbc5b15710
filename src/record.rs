use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{BlobKey, FileId, OwnerId};

/// One user-owned file as seen through the metadata store.
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: OwnerId,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub blob_key: BlobKey,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_text(&self) -> bool {
        is_text_content_type(&self.content_type)
    }
}

/// Record fields supplied by the caller on insert.
/// The store assigns `id` and `created_at`.
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct NewFileRecord {
    pub owner_id: OwnerId,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub blob_key: BlobKey,
}

impl NewFileRecord {
    pub fn into_record(self, id: FileId, created_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id,
            owner_id: self.owner_id,
            display_name: self.display_name,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            blob_key: self.blob_key,
            created_at,
        }
    }
}

/// A file picked for upload: original name, content type and bytes.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file, classifying its content type by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no file name",
                )
            })?;
        Ok(Self {
            content_type: content_type_for(path).to_owned(),
            name,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Whether inline text editing is offered for this content type.
pub fn is_text_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type == "application/json"
        || content_type == "application/javascript"
}

pub fn content_type_for<P: AsRef<Path>>(path: P) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

const KILOBYTE: f64 = 1024.0;
const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human readable size, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_owned();
    }
    let mut scaled = bytes as f64;
    let mut unit = 0;
    while scaled >= KILOBYTE && unit < UNITS.len() - 1 {
        scaled /= KILOBYTE;
        unit += 1;
    }
    let value = (scaled * 100.0).round() / 100.0;
    format!("{} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 Bytes")]
    #[case(10, "10 Bytes")]
    #[case(1024, "1 KB")]
    #[case(1536, "1.5 KB")]
    #[case(5 * 1024 * 1024, "5 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3 GB")]
    #[case(2048 * 1024 * 1024 * 1024, "2048 GB")]
    fn sizes_are_formatted(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }

    #[rstest]
    #[case("text/plain", true)]
    #[case("text/markdown", true)]
    #[case("application/json", true)]
    #[case("application/javascript", true)]
    #[case("application/pdf", false)]
    #[case("image/png", false)]
    #[case("", false)]
    fn text_types_are_editable(#[case] content_type: &str, #[case] editable: bool) {
        assert_eq!(is_text_content_type(content_type), editable);
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("notes.TXT"), "text/plain");
        assert_eq!(content_type_for("dir/data.json"), "application/json");
        assert_eq!(content_type_for("archive"), "application/octet-stream");
    }
}
