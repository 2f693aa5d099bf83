//! Line-break index for cursor <-> line/column translation.
//!
//! Built once by scanning a buffer for its line separator; every lookup
//! afterwards is a binary search over the recorded break offsets. Lines and
//! columns are 1-based; offsets are byte-oriented (no codepoint awareness).

use crate::context::Context;
use crate::error::{Error, Result};

/// Precomputed line metadata for a buffer.
///
/// `linebreaks` holds, in strictly ascending order, the offset of the first
/// byte after each line separator; `filesize` is the total byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMap {
    linebreaks: Vec<usize>,
    filesize: usize,
}

impl FileMap {
    pub fn new(linebreaks: Vec<usize>, filesize: usize) -> FileMap {
        debug_assert!(linebreaks.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(linebreaks.iter().all(|&b| b < filesize));
        FileMap {
            linebreaks,
            filesize,
        }
    }

    /// Scan `data` for every occurrence of `separator`. A separator ending
    /// exactly at EOF is not recorded: it terminates the last line rather
    /// than opening an empty one.
    pub fn from_bytes(data: &[u8], separator: &[u8]) -> FileMap {
        let mut linebreaks = Vec::new();
        if !separator.is_empty() {
            let mut pos = 0;
            while pos + separator.len() <= data.len() {
                if &data[pos..pos + separator.len()] == separator {
                    pos += separator.len();
                    if pos < data.len() {
                        linebreaks.push(pos);
                    }
                } else {
                    pos += 1;
                }
            }
        }
        FileMap::new(linebreaks, data.len())
    }

    /// Index the whole buffer behind a context, using its separator.
    pub fn from_context(ctx: &Context) -> FileMap {
        FileMap::from_bytes(ctx.buffer_data(), ctx.line_separator())
    }

    /// Number of lines in the file. A trailing separator does not open an
    /// extra line; an empty file has one (empty) line.
    pub fn line_count(&self) -> usize {
        self.linebreaks.len() + 1
    }

    /// The 1-based line a cursor falls on. A cursor immediately after a
    /// separator belongs to the following line.
    pub fn cursor_to_line(&self, cursor: usize) -> usize {
        self.linebreaks.partition_point(|&b| b <= cursor) + 1
    }

    /// The 1-based line and column of the byte immediately following the
    /// cursor. Columns are byte columns.
    pub fn cursor_to_line_col(&self, cursor: usize) -> (usize, usize) {
        let breaks_before = self.linebreaks.partition_point(|&b| b <= cursor);
        let col = if breaks_before == 0 {
            cursor
        } else {
            cursor - self.linebreaks[breaks_before - 1]
        };
        (breaks_before + 1, col + 1)
    }

    /// Byte span of a 1-based line, including its terminating separator if
    /// present.
    pub fn line_to_start_end_cursor(&self, lineno: usize) -> Result<(usize, usize)> {
        if lineno == 0 || lineno > self.line_count() {
            return Err(Error::Bounds(format!(
                "line {lineno} outside file of {} lines",
                self.line_count()
            )));
        }
        let index = lineno - 1;
        let end = if index == self.linebreaks.len() {
            self.filesize
        } else {
            self.linebreaks[index]
        };
        let start = if index == 0 {
            0
        } else {
            self.linebreaks[index - 1]
        };
        Ok((start, end))
    }

    /// Cursor position at the beginning of a 1-based line.
    pub fn line_to_cursor(&self, lineno: usize) -> Result<usize> {
        Ok(self.line_to_start_end_cursor(lineno)?.0)
    }

    /// Length in bytes of a 1-based line, separator included.
    pub fn line_length(&self, lineno: usize) -> Result<usize> {
        let (start, end) = self.line_to_start_end_cursor(lineno)?;
        Ok(end - start)
    }

    /// Cursor immediately before the given 1-based line and column,
    /// clamped to the line's end.
    pub fn line_col_to_cursor(&self, lineno: usize, colno: usize) -> Result<usize> {
        let (start, end) = self.line_to_start_end_cursor(lineno)?;
        Ok((start + colno.saturating_sub(1)).min(end))
    }
}
