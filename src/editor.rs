use crate::record::FileRecord;

/// An open inline editor: the record being edited and the text buffer.
///
/// The buffer is only dropped when the session is closed, which the
/// controller does after a successful save. A failed save leaves the
/// user's edits in place.
#[derive(Clone, Debug)]
pub struct EditSession {
    record: FileRecord,
    loaded: String,
    content: String,
}

impl EditSession {
    pub(crate) fn new(record: FileRecord, loaded: String) -> Self {
        Self {
            record,
            content: loaded.clone(),
            loaded,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Whether the buffer differs from what was loaded.
    pub fn is_dirty(&self) -> bool {
        self.content != self.loaded
    }
}
