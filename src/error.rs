//! Error types for Portico

use thiserror::Error;

pub type PorticoResult<T> = std::result::Result<T, PorticoError>;

#[derive(Debug, Error)]
pub enum PorticoError {
    #[error("{0}")]
    Frame(#[from] FrameError),

    #[error("{0}")]
    Document(#[from] DocumentError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Header line exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("Declared Content-Length {declared} exceeds frame limit of {limit} bytes")]
    FrameTooLarge { declared: usize, limit: usize },

    #[error("Header block ended without a Content-Length header")]
    MissingContentLength,

    #[error("Invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    #[error("Frame body is not valid UTF-8")]
    BodyNotUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the connection must be closed rather than resumed.
    ///
    /// Once header framing is lost there is no way to find the next frame
    /// boundary, so every header-level failure tears the connection down.
    /// A body that fails UTF-8 validation has already been consumed in full
    /// and the decoder is positioned at the next frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BodyNotUtf8)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Offset {offset} out of range (buffer is {len} bytes)")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("Line {line} out of range (buffer has {count} lines)")]
    LineOutOfRange { line: u32, count: u32 },

    #[error("Edit range {offset}..{end} exceeds buffer length {len}")]
    EditOutOfRange {
        offset: usize,
        end: usize,
        len: usize,
    },

    #[error("Offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    #[error("Document not open: {0}")]
    NotOpen(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_errors_are_fatal() {
        assert!(FrameError::HeaderTooLarge { limit: 128 }.is_fatal());
        assert!(
            FrameError::FrameTooLarge {
                declared: 1,
                limit: 0
            }
            .is_fatal()
        );
        assert!(FrameError::MissingContentLength.is_fatal());
        assert!(FrameError::InvalidContentLength("abc".to_string()).is_fatal());
    }

    #[test]
    fn test_body_encoding_error_is_recoverable() {
        assert!(!FrameError::BodyNotUtf8.is_fatal());
    }

    #[test]
    fn test_document_error_messages() {
        let err = DocumentError::OffsetOutOfRange { offset: 9, len: 3 };
        assert!(err.to_string().contains("Offset 9"));
        let err = DocumentError::NotOpen("file:///a.rs".to_string());
        assert!(err.to_string().contains("file:///a.rs"));
    }
}
