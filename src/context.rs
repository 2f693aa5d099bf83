//! Bounded, shareable byte-range views over a backing buffer.
//!
//! A [`Context`] is the addressing primitive of the engine: both cursors
//! (zero-width) and selections (non-zero-width) are Contexts. All views
//! derived from one source share a single immutable buffer behind an `Arc`;
//! deriving a view never copies content, it only narrows offsets.

use crate::error::{Error, Result};
use encoding_rs::{Encoding, UTF_8};
use memmap2::Mmap;
use regex::bytes::{Regex, RegexBuilder};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// The backing store for a family of Contexts: either a read-only mapped
/// file or an owned in-memory buffer.
pub enum SourceBuffer {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl SourceBuffer {
    pub fn data(&self) -> &[u8] {
        match self {
            SourceBuffer::Mapped(map) => map,
            SourceBuffer::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Capture-group spans recorded from a regex match, as absolute byte
/// offsets into the backing buffer. Group 0 is the whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchData {
    pub groups: Vec<Option<(usize, usize)>>,
}

/// A bounded view over a shared byte buffer.
///
/// Immutable once constructed. `start == end` marks a cursor (insertion
/// point); `start < end` marks a selection. The optional parent reference
/// records which view this one was derived from; it is diagnostic metadata
/// only and plays no role in lifetime management or mutation.
#[derive(Clone)]
pub struct Context {
    buffer: Arc<SourceBuffer>,
    start: usize,
    end: usize,
    encoding: &'static Encoding,
    line_separator: Vec<u8>,
    parent: Option<Arc<Context>>,
    match_data: Option<MatchData>,
}

/// The platform's line separator, used when none is configured.
pub fn default_line_separator() -> &'static [u8] {
    if cfg!(windows) {
        b"\r\n"
    } else {
        b"\n"
    }
}

impl Context {
    /// Map a file read-only and span the whole of it.
    ///
    /// The caller must not mutate or truncate the file while any Context
    /// over the mapping is alive.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Context> {
        Context::from_path_with(path, UTF_8, default_line_separator())
    }

    pub fn from_path_with(
        path: impl AsRef<Path>,
        encoding: &'static Encoding,
        line_separator: &[u8],
    ) -> Result<Context> {
        let file = File::open(path.as_ref())?;
        let metadata = file.metadata()?;
        // Mapping a zero-length file fails on some platforms
        let buffer = if metadata.len() == 0 {
            SourceBuffer::Owned(Vec::new())
        } else {
            SourceBuffer::Mapped(unsafe { Mmap::map(&file)? })
        };
        Ok(Context::from_buffer(buffer, encoding, line_separator))
    }

    /// Span an owned in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Context {
        Context::from_buffer(SourceBuffer::Owned(bytes), UTF_8, default_line_separator())
    }

    pub fn from_bytes_with(
        bytes: Vec<u8>,
        encoding: &'static Encoding,
        line_separator: &[u8],
    ) -> Context {
        Context::from_buffer(SourceBuffer::Owned(bytes), encoding, line_separator)
    }

    pub fn from_text(text: &str) -> Context {
        Context::from_bytes(text.as_bytes().to_vec())
    }

    fn from_buffer(
        buffer: SourceBuffer,
        encoding: &'static Encoding,
        line_separator: &[u8],
    ) -> Context {
        let end = buffer.len();
        Context {
            buffer: Arc::new(buffer),
            start: 0,
            end,
            encoding,
            line_separator: line_separator.to_vec(),
            parent: None,
            match_data: None,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// A cursor is a zero-width Context: an insertion point.
    pub fn is_cursor(&self) -> bool {
        self.start == self.end
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn line_separator(&self) -> &[u8] {
        &self.line_separator
    }

    pub fn parent(&self) -> Option<&Context> {
        self.parent.as_deref()
    }

    pub fn match_data(&self) -> Option<&MatchData> {
        self.match_data.as_ref()
    }

    pub(crate) fn buffer_data(&self) -> &[u8] {
        self.buffer.data()
    }

    /// Derive a view with absolute bounds into the shared buffer,
    /// recording `self` as its parent.
    fn view(&self, start: usize, end: usize) -> Context {
        debug_assert!(start <= end && end <= self.buffer.len());
        Context {
            buffer: Arc::clone(&self.buffer),
            start,
            end,
            encoding: self.encoding,
            line_separator: self.line_separator.clone(),
            parent: Some(Arc::new(self.clone())),
            match_data: None,
        }
    }

    /// Sub-selection: a view whose bounds are relative to this context's
    /// start. Fails if it would reach past this context's end.
    pub fn sub(&self, rel_start: usize, rel_end: usize) -> Result<Context> {
        if rel_start > rel_end {
            return Err(Error::Bounds(format!(
                "sub-selection start {rel_start} is after end {rel_end}"
            )));
        }
        let abs_end = self.start + rel_end;
        if abs_end > self.end {
            return Err(Error::Bounds(format!(
                "sub-selection {}..{} exceeds parent bounds {}..{}",
                self.start + rel_start,
                abs_end,
                self.start,
                self.end
            )));
        }
        Ok(self.view(self.start + rel_start, abs_end))
    }

    /// Escape any sub-selection: a Context spanning the entire backing
    /// buffer.
    pub fn file(&self) -> Context {
        Context {
            buffer: Arc::clone(&self.buffer),
            start: 0,
            end: self.buffer.len(),
            encoding: self.encoding,
            line_separator: self.line_separator.clone(),
            parent: None,
            match_data: None,
        }
    }

    /// First exact match of `needle` within bounds, or None.
    pub fn find(&self, needle: &[u8]) -> Option<Context> {
        if needle.is_empty() {
            return None;
        }
        let data = self.buffer.data();
        let at = find_subslice(&data[..self.end], needle, self.start)?;
        Some(self.view(at, at + needle.len()))
    }

    /// Lazy, left-to-right, non-overlapping matches of `needle`: each scan
    /// resumes after the prior match's end.
    pub fn find_all(&self, needle: &[u8]) -> FindAll {
        FindAll {
            ctx: self.clone(),
            needle: needle.to_vec(),
            pos: self.start,
        }
    }

    /// First regex match within bounds, or None.
    pub fn find_re(&self, pattern: &str, flags: &str) -> Result<Option<Context>> {
        let re = compile_regex(pattern, flags)?;
        let mut iter = FindAllRe {
            ctx: self.clone(),
            re,
            pos: self.start,
        };
        Ok(iter.next())
    }

    /// Lazy, non-overlapping regex matches within bounds.
    pub fn find_all_re(&self, pattern: &str, flags: &str) -> Result<FindAllRe> {
        Ok(self.find_all_compiled(compile_regex(pattern, flags)?))
    }

    /// Matches of an already-compiled regex.
    pub(crate) fn find_all_compiled(&self, re: Regex) -> FindAllRe {
        FindAllRe {
            ctx: self.clone(),
            re,
            pos: self.start,
        }
    }

    /// Raw bytes of a subrange. Omitted bounds default to this context's
    /// own bounds; negative values count backward from this context's end.
    pub fn bytes(&self, start: Option<i64>, end: Option<i64>) -> Result<&[u8]> {
        let s = self.resolve_offset(start, self.start)?;
        let e = self.resolve_offset(end, self.end)?;
        if s > e {
            return Err(Error::Bounds(format!("byte range {s}..{e} is reversed")));
        }
        if e > self.end || s < self.start {
            return Err(Error::Bounds(format!(
                "byte range {s}..{e} exceeds bounds {}..{}",
                self.start, self.end
            )));
        }
        Ok(&self.buffer.data()[s..e])
    }

    fn resolve_offset(&self, offset: Option<i64>, default: usize) -> Result<usize> {
        match offset {
            None => Ok(default),
            Some(v) if v < 0 => {
                let abs = self.end as i64 + v;
                if abs < self.start as i64 {
                    return Err(Error::Bounds(format!(
                        "offset {v} reaches before the context start"
                    )));
                }
                Ok(abs as usize)
            }
            Some(v) => Ok(self.start + v as usize),
        }
    }

    /// Decoded content of a subrange, using the context encoding.
    pub fn string(&self, start: Option<i64>, end: Option<i64>) -> Result<String> {
        let bytes = self.bytes(start, end)?;
        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if had_errors {
            return Err(Error::Encoding(format!(
                "content is not valid {}",
                self.encoding.name()
            )));
        }
        Ok(text.into_owned())
    }

    /// Decoded content of the whole context.
    pub fn text(&self) -> Result<String> {
        self.string(None, None)
    }

    /// Snap outward to full-line boundaries: back to the byte after the
    /// previous separator (or buffer start), forward through the next
    /// separator (or to buffer end). Idempotent.
    pub fn expand_to_lines(&self) -> Context {
        let data = self.buffer.data();
        let sep = &self.line_separator;
        let size = data.len();

        let start = if self.start == 0 {
            0
        } else {
            match rfind_subslice(&data[..self.start], sep) {
                Some(at) => at + sep.len(),
                None => 0,
            }
        };
        let end = if self.end == size {
            size
        } else {
            // Start the forward scan one separator-width early so a
            // selection already ending on a boundary is left alone
            match find_subslice(data, sep, self.end.saturating_sub(sep.len())) {
                Some(at) => at + sep.len(),
                None => size,
            }
        };
        self.view(start, end)
    }

    /// Per-line views within bounds, each including its terminating
    /// separator except possibly the final line.
    pub fn split_lines(&self) -> SplitLines {
        SplitLines {
            ctx: self.clone(),
            pos: self.start,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_cursor() {
            write!(f, "Cursor @ {}", self.start)
        } else {
            write!(f, "Selection @ {}-{}", self.start, self.end)
        }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.start == other.start
            && self.end == other.end
    }
}

/// Iterator over non-overlapping literal matches.
pub struct FindAll {
    ctx: Context,
    needle: Vec<u8>,
    pos: usize,
}

impl Iterator for FindAll {
    type Item = Context;

    fn next(&mut self) -> Option<Context> {
        if self.needle.is_empty() || self.pos >= self.ctx.end {
            return None;
        }
        let data = self.ctx.buffer.data();
        let at = find_subslice(&data[..self.ctx.end], &self.needle, self.pos)?;
        self.pos = at + self.needle.len();
        Some(self.ctx.view(at, self.pos))
    }
}

/// Iterator over non-overlapping regex matches, carrying capture spans as
/// match metadata on each yielded Context.
pub struct FindAllRe {
    ctx: Context,
    re: Regex,
    pos: usize,
}

impl Iterator for FindAllRe {
    type Item = Context;

    fn next(&mut self) -> Option<Context> {
        if self.pos > self.ctx.end {
            return None;
        }
        let data = self.ctx.buffer.data();
        let haystack = &data[..self.ctx.end];
        let mut locs = self.re.capture_locations();
        let m = self.re.captures_read_at(&mut locs, haystack, self.pos)?;
        let groups = (0..locs.len()).map(|i| locs.get(i)).collect();
        // Advance past the match; step one byte on empty matches so the
        // scan terminates
        self.pos = if m.end() == m.start() {
            m.end() + 1
        } else {
            m.end()
        };
        let mut found = self.ctx.view(m.start(), m.end());
        found.match_data = Some(MatchData { groups });
        Some(found)
    }
}

/// Iterator over the lines of a context.
pub struct SplitLines {
    ctx: Context,
    pos: usize,
}

impl Iterator for SplitLines {
    type Item = Context;

    fn next(&mut self) -> Option<Context> {
        if self.pos >= self.ctx.end {
            return None;
        }
        let data = self.ctx.buffer.data();
        let sep = &self.ctx.line_separator;
        let line_end = match find_subslice(&data[..self.ctx.end], sep, self.pos) {
            Some(at) => at + sep.len(),
            None => self.ctx.end,
        };
        let line = self.ctx.view(self.pos, line_end);
        self.pos = line_end;
        Some(line)
    }
}

/// Compile a byte-oriented regex with TEQL flag characters:
/// `i` case-insensitive, `m` multiline, `s` dot-matches-newline,
/// `u` unicode classes.
pub(crate) fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag.to_ascii_lowercase() {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'u' => {
                builder.unicode(true);
            }
            other => {
                return Err(Error::Parse {
                    message: format!("unknown regex flag `{other}`"),
                    position: None,
                })
            }
        }
    }
    builder.build().map_err(|e| Error::Parse {
        message: format!("invalid regular expression: {e}"),
        position: None,
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|at| at + from)
}

fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_reports_absolute_offsets() {
        let ctx = Context::from_text("let's look for a needle in a haystack");
        let found = ctx.find(b"needle").expect("should match");
        assert_eq!(found.start(), 17);
        assert_eq!(found.end(), 23);
        assert_eq!(found.text().unwrap(), "needle");
    }

    #[test]
    fn find_all_is_non_overlapping() {
        let ctx = Context::from_text(
            "Worn and torn, those forlorn Norn born of Bjorn hath sworn upon the horn and shorn the corn",
        );
        assert_eq!(ctx.find_all(b"orn").count(), 10);
    }

    #[test]
    fn find_respects_bounds() {
        let ctx = Context::from_text("abcabcabc");
        let inner = ctx.sub(3, 6).unwrap();
        let found = inner.find(b"abc").unwrap();
        assert_eq!((found.start(), found.end()), (3, 6));
        assert!(inner.find(b"cab").is_none());
    }

    #[test]
    fn find_re_case_insensitive() {
        let ctx = Context::from_text("Virtue and virtue and VIRTUE");
        let all: Vec<_> = ctx.find_all_re("virtue", "i").unwrap().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].start(), 11);
    }

    #[test]
    fn find_re_captures_groups() {
        let ctx = Context::from_text("price: $42.00");
        let found = ctx.find_re(r"\$(\d+)\.(\d{2})", "").unwrap().unwrap();
        let groups = &found.match_data().unwrap().groups;
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1], Some((8, 10)));
        assert_eq!(groups[2], Some((11, 13)));
    }

    #[test]
    fn sub_composes_additively() {
        let ctx = Context::from_text("0123456789");
        let once = ctx.sub(2, 8).unwrap();
        let twice = once.sub(1, 4).unwrap();
        assert_eq!(twice, ctx.sub(3, 6).unwrap());
        assert_eq!(twice.text().unwrap(), "345");
    }

    #[test]
    fn sub_out_of_bounds_is_an_error() {
        let ctx = Context::from_text("0123456789");
        let inner = ctx.sub(2, 6).unwrap();
        assert!(matches!(inner.sub(0, 5), Err(Error::Bounds(_))));
        assert!(matches!(ctx.sub(4, 2), Err(Error::Bounds(_))));
    }

    #[test]
    fn bytes_supports_negative_offsets() {
        let ctx = Context::from_text("0123456789");
        assert_eq!(ctx.bytes(Some(-3), None).unwrap(), b"789");
        assert_eq!(ctx.bytes(Some(2), Some(-2)).unwrap(), b"234567");
        assert!(ctx.bytes(None, Some(11)).is_err());
    }

    #[test]
    fn file_escapes_sub_selection() {
        let ctx = Context::from_text("0123456789");
        let inner = ctx.sub(6, 7).unwrap();
        let whole = inner.file();
        assert_eq!((whole.start(), whole.end()), (0, 10));
    }

    #[test]
    fn expand_to_lines_snaps_outward() {
        let ctx = Context::from_text("line1\nline2\nline3\n");
        let partial = ctx.sub(2, 16).unwrap();
        assert_eq!(partial.expand_to_lines().text().unwrap(), "line1\nline2\nline3\n");
    }

    #[test]
    fn expand_to_lines_without_trailing_separator() {
        let ctx = Context::from_text("line1\nline2\nline3");
        let partial = ctx.sub(2, 16).unwrap();
        assert_eq!(partial.expand_to_lines().text().unwrap(), "line1\nline2\nline3");
    }

    #[test]
    fn expand_to_lines_already_aligned() {
        let ctx = Context::from_text("line1\nline2\nline3\n");
        let line2 = ctx.sub(6, 12).unwrap();
        assert_eq!(line2.expand_to_lines().text().unwrap(), "line2\n");
    }

    #[test]
    fn expand_to_lines_is_idempotent() {
        let ctx = Context::from_text("alpha\nbravo\ncharlie");
        let partial = ctx.sub(7, 9).unwrap();
        let once = partial.expand_to_lines();
        let twice = once.expand_to_lines();
        assert_eq!(once, twice);
    }

    #[test]
    fn split_lines_keeps_separators() {
        let ctx = Context::from_text("line1\nline2\nline3");
        let lines: Vec<String> = ctx.split_lines().map(|l| l.text().unwrap()).collect();
        assert_eq!(lines, vec!["line1\n", "line2\n", "line3"]);
    }

    #[test]
    fn split_lines_with_trailing_separator() {
        let ctx = Context::from_text("line1\nline2\n");
        let lines: Vec<String> = ctx.split_lines().map(|l| l.text().unwrap()).collect();
        assert_eq!(lines, vec!["line1\n", "line2\n"]);
    }

    #[test]
    fn crlf_separator_splitting() {
        let ctx = Context::from_bytes_with(
            b"one\r\ntwo\r\nthree".to_vec(),
            encoding_rs::UTF_8,
            b"\r\n",
        );
        let lines: Vec<String> = ctx.split_lines().map(|l| l.text().unwrap()).collect();
        assert_eq!(lines, vec!["one\r\n", "two\r\n", "three"]);
    }

    #[test]
    fn derived_views_record_a_parent() {
        let ctx = Context::from_text("needle in a haystack");
        let found = ctx.find(b"needle").unwrap();
        assert_eq!(found.parent().unwrap(), &ctx);
    }
}
