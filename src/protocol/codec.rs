//! Wire Frame Codec
//!
//! Length-prefixed header+body framing:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! {"jsonrpc":"2.0",...}
//! ```
//!
//! The decoder is a push-based state machine with its own accumulation
//! buffer, so bytes may arrive in arbitrary chunks and a frame is only
//! emitted once exactly `Content-Length` body bytes are available. No byte
//! belonging to the next frame is consumed early.

use crate::error::FrameError;

/// Upper bound on a single header line, excluding the `\r\n` terminator.
pub const MAX_HEADER_LINE_BYTES: usize = 128;

/// Default ceiling for a declared `Content-Length`.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    ReadHeaders,
    ReadContent { length: usize },
    FinalizeFrameRead,
}

/// Streaming frame decoder.
///
/// Feed raw bytes with [`feed`](Self::feed), then drain completed payloads
/// with [`next_frame`](Self::next_frame) until it returns `Ok(None)`. After
/// an error where [`FrameError::is_fatal`] holds, the decoder must be
/// discarded along with its connection.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buf: Vec<u8>,
    pos: usize,
    content_length: Option<usize>,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            state: DecodeState::ReadHeaders,
            buf: Vec::new(),
            pos: 0,
            content_length: None,
            max_frame_bytes,
        }
    }

    /// Append raw bytes from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to decode the next complete payload.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            match self.state {
                DecodeState::ReadHeaders => match self.take_header_line()? {
                    None => return Ok(None),
                    Some(line) if line.is_empty() => {
                        let length = self
                            .content_length
                            .take()
                            .ok_or(FrameError::MissingContentLength)?;
                        self.state = DecodeState::ReadContent { length };
                    }
                    Some(line) => self.parse_header(&line)?,
                },
                DecodeState::ReadContent { length } => {
                    if self.buf.len() - self.pos < length {
                        return Ok(None);
                    }
                    let body = self.buf[self.pos..self.pos + length].to_vec();
                    self.pos += length;
                    self.state = DecodeState::FinalizeFrameRead;
                    let payload =
                        String::from_utf8(body).map_err(|_| FrameError::BodyNotUtf8)?;
                    return Ok(Some(payload));
                }
                DecodeState::FinalizeFrameRead => {
                    self.buf.drain(..self.pos);
                    self.pos = 0;
                    self.state = DecodeState::ReadHeaders;
                }
            }
        }
    }

    /// Take one `\r\n`-terminated header line if fully buffered.
    ///
    /// A partial line is rejected as soon as it can no longer terminate
    /// within [`MAX_HEADER_LINE_BYTES`], so the bound holds regardless of
    /// how the bytes were chunked.
    fn take_header_line(&mut self) -> Result<Option<String>, FrameError> {
        let avail = &self.buf[self.pos..];
        match avail.windows(2).position(|w| w == b"\r\n") {
            Some(idx) => {
                if idx > MAX_HEADER_LINE_BYTES {
                    return Err(FrameError::HeaderTooLarge {
                        limit: MAX_HEADER_LINE_BYTES,
                    });
                }
                let line = String::from_utf8_lossy(&avail[..idx]).into_owned();
                self.pos += idx + 2;
                Ok(Some(line))
            }
            None => {
                // All buffered bytes except a possible pending '\r' are line
                // content already.
                if avail.len().saturating_sub(1) > MAX_HEADER_LINE_BYTES {
                    Err(FrameError::HeaderTooLarge {
                        limit: MAX_HEADER_LINE_BYTES,
                    })
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn parse_header(&mut self, line: &str) -> Result<(), FrameError> {
        if let Some(value) = line.strip_prefix(CONTENT_LENGTH) {
            let value = value.trim();
            let length: usize = value
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
            if length > self.max_frame_bytes {
                return Err(FrameError::FrameTooLarge {
                    declared: length,
                    limit: self.max_frame_bytes,
                });
            }
            self.content_length = Some(length);
        }
        // Unknown headers (Content-Type, etc.) are ignored.
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame a payload for the wire. Only `Content-Length` is emitted.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 32);
    frame.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    frame.extend_from_slice(payload.as_bytes());
    frame
}
