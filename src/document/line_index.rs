//! Line Index
//!
//! Maps between byte offsets and line numbers for one text buffer. Lines
//! are contiguous, sorted by offset, and fully partition the buffer; a
//! buffer always has at least one line, even when empty. Lookups are a
//! binary search over line start offsets.
//!
//! A fresh [`LineIndex::new`] scan is always correct; [`apply_edit`]
//! recomputes only the lines touched by an edit and shifts the trailing
//! lines, producing the same table a full rebuild would.
//!
//! [`apply_edit`]: LineIndex::apply_edit

use crate::error::DocumentError;

/// A line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Cr,
    Lf,
    CrLf,
}

impl Delimiter {
    pub fn len(self) -> usize {
        match self {
            Delimiter::Cr | Delimiter::Lf => 1,
            Delimiter::CrLf => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Delimiter::Cr => "\r",
            Delimiter::Lf => "\n",
            Delimiter::CrLf => "\r\n",
        }
    }
}

/// One line of the buffer. `length` includes the delimiter bytes, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub offset: usize,
    pub length: usize,
    pub delimiter: Option<Delimiter>,
}

impl Line {
    fn end(&self) -> usize {
        self.offset + self.length
    }

    fn content_len(&self) -> usize {
        self.length - self.delimiter.map_or(0, Delimiter::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    lines: Vec<Line>,
    len: usize,
}

impl LineIndex {
    /// Build the index by scanning the whole text once.
    pub fn new(text: &str) -> Self {
        let mut lines = Vec::new();
        scan_lines(text.as_bytes(), 0, true, &mut lines);
        Self {
            lines,
            len: text.len(),
        }
    }

    /// Length of the indexed buffer in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// The line containing `offset`. `offset == len()` resolves to the last
    /// line.
    pub fn line_of(&self, offset: usize) -> Result<u32, DocumentError> {
        if offset > self.len {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                len: self.len,
            });
        }
        let idx = self.lines.partition_point(|line| line.offset <= offset) - 1;
        Ok(idx as u32)
    }

    /// Start offset and content length of a line, excluding its delimiter.
    pub fn line_range(&self, line: u32) -> Result<(usize, usize), DocumentError> {
        let line = self.line(line)?;
        Ok((line.offset, line.content_len()))
    }

    pub fn delimiter_of(&self, line: u32) -> Result<Option<Delimiter>, DocumentError> {
        Ok(self.line(line)?.delimiter)
    }

    /// All lines, in offset order.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn line(&self, line: u32) -> Result<&Line, DocumentError> {
        self.lines
            .get(line as usize)
            .ok_or(DocumentError::LineOutOfRange {
                line,
                count: self.line_count(),
            })
    }

    /// Re-index after replacing `removed` bytes at `offset` with `inserted`
    /// bytes, given the resulting buffer `new_text`.
    ///
    /// Only the lines overlapping the edit are rescanned; every later line
    /// keeps its shape and has its offset shifted by `inserted - removed`.
    pub fn apply_edit(
        &self,
        new_text: &str,
        offset: usize,
        removed: usize,
        inserted: usize,
    ) -> Result<LineIndex, DocumentError> {
        let end = offset + removed;
        if end > self.len {
            return Err(DocumentError::EditOutOfRange {
                offset,
                end,
                len: self.len,
            });
        }
        debug_assert_eq!(new_text.len(), self.len - removed + inserted);

        let delta = inserted as isize - removed as isize;
        let mut first = self.line_of(offset)? as usize;
        // A bare CR just before the edit may pair up with an inserted LF.
        if first > 0 && self.lines[first - 1].delimiter == Some(Delimiter::Cr) {
            first -= 1;
        }
        let mut last = self.line_of(end)? as usize;

        let bytes = new_text.as_bytes();
        let region_start = self.lines[first].offset;
        let (region_end, at_eof) = loop {
            if last == self.lines.len() - 1 {
                break (new_text.len(), true);
            }
            let region_end = (self.lines[last].end() as isize + delta) as usize;
            // A bare CR at the region edge may pair with the LF that starts
            // the retained tail.
            if region_end > region_start
                && bytes[region_end - 1] == b'\r'
                && bytes.get(region_end) == Some(&b'\n')
            {
                last += 1;
                continue;
            }
            break (region_end, false);
        };

        let mut lines = Vec::with_capacity(self.lines.len() + 4);
        lines.extend_from_slice(&self.lines[..first]);
        scan_lines(&bytes[region_start..region_end], region_start, at_eof, &mut lines);
        for line in &self.lines[last + 1..] {
            lines.push(Line {
                offset: (line.offset as isize + delta) as usize,
                ..*line
            });
        }

        Ok(LineIndex {
            lines,
            len: new_text.len(),
        })
    }
}

/// Scan `bytes` into lines, offsetting each by `base`.
///
/// When `at_eof` is set the text after the last delimiter (possibly empty)
/// becomes one final delimiter-less line; otherwise the slice is known to
/// end exactly on a delimiter.
fn scan_lines(bytes: &[u8], base: usize, at_eof: bool, out: &mut Vec<Line>) {
    let mut line_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                out.push(Line {
                    offset: base + line_start,
                    length: i + 1 - line_start,
                    delimiter: Some(Delimiter::Lf),
                });
                i += 1;
                line_start = i;
            }
            b'\r' => {
                let delimiter = if bytes.get(i + 1) == Some(&b'\n') {
                    i += 2;
                    Delimiter::CrLf
                } else {
                    i += 1;
                    Delimiter::Cr
                };
                out.push(Line {
                    offset: base + line_start,
                    length: i - line_start,
                    delimiter: Some(delimiter),
                });
                line_start = i;
            }
            _ => i += 1,
        }
    }
    if at_eof {
        out.push(Line {
            offset: base + line_start,
            length: bytes.len() - line_start,
            delimiter: None,
        });
    }
}
