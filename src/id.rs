use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SyncError;

/// Identifier of a file record, assigned by the metadata store on insert.
#[derive(
    Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| SyncError::Parse)
    }
}

/// Opaque identifier of the user owning a set of files.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of an object in the blob store.
///
/// Generated keys always live under the owner's namespace,
/// i.e. `<owner>/<random>.<ext>`, so that files of different
/// users never collide.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Fresh key for a file named `display_name` owned by `owner`.
    /// The extension of the original name is kept, the stem is random.
    pub fn generate(owner: &OwnerId, display_name: &str) -> Self {
        let stem = Uuid::new_v4().simple().to_string();
        let namespace = Self::namespace(owner);
        let key = match extension_of(display_name) {
            Some(ext) => format!("{}{}.{}", namespace, stem, ext),
            None => format!("{}{}", namespace, stem),
        };
        Self(key)
    }

    /// Prefix shared by every key in the owner's namespace.
    ///
    /// The owner id is escaped so that it always forms a single path
    /// segment: `a` and `a/b` get the disjoint prefixes `a/` and `a%2Fb/`.
    pub fn namespace(owner: &OwnerId) -> String {
        format!("{}/", escape_segment(owner.as_str()))
    }

    /// Whether this is a key generated for `owner`, i.e. exactly one
    /// segment below the owner's namespace.
    pub fn belongs_to(&self, owner: &OwnerId) -> bool {
        match self.0.strip_prefix(&Self::namespace(owner)) {
            Some(rest) => !rest.is_empty() && !rest.contains('/'),
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Percent-escape the characters that would split or hide a path segment.
/// The empty id maps to a lone `%`, which no escaped id can produce.
fn escape_segment(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_owned();
    }
    let mut escaped = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            '.' if i == 0 => escaped.push_str("%2E"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    let valid = !stem.is_empty()
        && !ext.is_empty()
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}
