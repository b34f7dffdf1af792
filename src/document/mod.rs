//! Document Model
//!
//! Immutable text document snapshots plus the per-URI state tracker that
//! applies open/change/save/close lifecycle events.

pub mod line_index;
pub mod store;

use std::sync::Arc;

use crate::error::DocumentError;

pub use line_index::{Delimiter, Line, LineIndex};
pub use store::DocumentStore;

/// An immutable snapshot of one open text document.
///
/// Every mutation produces a fresh snapshot; readers holding an `Arc` to an
/// old one keep a fully consistent view.
#[derive(Debug, Clone)]
pub struct Document {
    uri: String,
    language_id: String,
    version: i32,
    content: Arc<str>,
    line_index: LineIndex,
}

/// One content mutation, either a full replacement or an in-place splice.
#[derive(Debug, Clone)]
pub enum ContentChange {
    Full {
        text: String,
    },
    Incremental {
        offset: usize,
        length: usize,
        text: String,
    },
}

impl Document {
    pub fn new(
        uri: impl Into<String>,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let line_index = LineIndex::new(&text);
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            version,
            content: text.into(),
            line_index,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// Byte offset of a line/column position. The column is a byte column
    /// within the line and is clamped to the line's content length.
    pub fn offset_at(&self, line: u32, character: u32) -> Result<usize, DocumentError> {
        let (start, content_len) = self.line_index.line_range(line)?;
        Ok(start + (character as usize).min(content_len))
    }

    /// Produce the snapshot that results from applying `changes` in order.
    pub fn with_changes(
        &self,
        changes: &[ContentChange],
        version: i32,
    ) -> Result<Document, DocumentError> {
        let mut content = self.content.to_string();
        let mut line_index = self.line_index.clone();

        for change in changes {
            match change {
                ContentChange::Full { text } => {
                    content = text.clone();
                    line_index = LineIndex::new(&content);
                }
                ContentChange::Incremental {
                    offset,
                    length,
                    text,
                } => {
                    let (offset, length) = (*offset, *length);
                    let end = offset + length;
                    if end > content.len() {
                        return Err(DocumentError::EditOutOfRange {
                            offset,
                            end,
                            len: content.len(),
                        });
                    }
                    if !content.is_char_boundary(offset) {
                        return Err(DocumentError::NotCharBoundary(offset));
                    }
                    if !content.is_char_boundary(end) {
                        return Err(DocumentError::NotCharBoundary(end));
                    }
                    content.replace_range(offset..end, text);
                    line_index = line_index.apply_edit(&content, offset, length, text.len())?;
                }
            }
        }

        Ok(Document {
            uri: self.uri.clone(),
            language_id: self.language_id.clone(),
            version,
            content: content.into(),
            line_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accessors() {
        let doc = Document::new("file:///a.rs", "rust", 1, "fn main() {}\n");
        assert_eq!(doc.uri(), "file:///a.rs");
        assert_eq!(doc.language_id(), "rust");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.content(), "fn main() {}\n");
        assert_eq!(doc.line_index().line_count(), 2);
    }

    #[test]
    fn test_with_changes_full() {
        let doc = Document::new("file:///a.rs", "rust", 1, "old");
        let next = doc
            .with_changes(
                &[ContentChange::Full {
                    text: "new\ntext".to_string(),
                }],
                2,
            )
            .unwrap();
        assert_eq!(next.content(), "new\ntext");
        assert_eq!(next.version(), 2);
        // The original snapshot is untouched.
        assert_eq!(doc.content(), "old");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_with_changes_incremental_updates_index() {
        let doc = Document::new("file:///a.rs", "rust", 1, "ab\ncd");
        let next = doc
            .with_changes(
                &[ContentChange::Incremental {
                    offset: 2,
                    length: 1,
                    text: "\r\nX\r\n".to_string(),
                }],
                2,
            )
            .unwrap();
        assert_eq!(next.content(), "ab\r\nX\r\ncd");
        assert_eq!(next.line_index(), &LineIndex::new("ab\r\nX\r\ncd"));
    }

    #[test]
    fn test_with_changes_applies_in_order() {
        let doc = Document::new("file:///a.rs", "rust", 1, "abc");
        let next = doc
            .with_changes(
                &[
                    ContentChange::Incremental {
                        offset: 3,
                        length: 0,
                        text: "def".to_string(),
                    },
                    ContentChange::Incremental {
                        offset: 0,
                        length: 3,
                        text: "".to_string(),
                    },
                ],
                2,
            )
            .unwrap();
        assert_eq!(next.content(), "def");
    }

    #[test]
    fn test_with_changes_rejects_bad_ranges() {
        let doc = Document::new("file:///a.rs", "rust", 1, "héllo");
        assert!(matches!(
            doc.with_changes(
                &[ContentChange::Incremental {
                    offset: 0,
                    length: 99,
                    text: String::new(),
                }],
                2
            ),
            Err(DocumentError::EditOutOfRange { .. })
        ));
        // Offset 2 lands inside the two-byte 'é'.
        assert!(matches!(
            doc.with_changes(
                &[ContentChange::Incremental {
                    offset: 2,
                    length: 1,
                    text: String::new(),
                }],
                2
            ),
            Err(DocumentError::NotCharBoundary(2))
        ));
    }

    #[test]
    fn test_offset_at_clamps_column() {
        let doc = Document::new("file:///a.rs", "rust", 1, "ab\ncdef");
        assert_eq!(doc.offset_at(0, 0).unwrap(), 0);
        assert_eq!(doc.offset_at(0, 2).unwrap(), 2);
        assert_eq!(doc.offset_at(0, 99).unwrap(), 2);
        assert_eq!(doc.offset_at(1, 4).unwrap(), 7);
        assert!(doc.offset_at(5, 0).is_err());
    }
}
