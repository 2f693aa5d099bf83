//! Application of an opcode set to a context.
//!
//! The editor never mutates the backing buffer: output is streamed to a
//! sink (or collected into a byte vector), or rendered as a line-oriented
//! unified patch. Conflict and encoding checks complete before the first
//! byte is emitted, so an edit either fully applies or not at all.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::file_map::FileMap;
use crate::opcode::{normalize, Opcode, OpcodeKind};
use encoding_rs::Encoding;
use std::io::Write;

/// Opcodes closer than this many lines share a patch hunk.
pub const DEFAULT_HUNK_MERGE_DISTANCE: usize = 3;

/// Applies an ordered, non-overlapping opcode set to a context.
pub struct Editor<'a> {
    context: &'a Context,
    opcodes: Vec<Opcode>,
    /// Opcode values pre-encoded in the context encoding, parallel to
    /// `opcodes`; computed up front so encoding failures surface before
    /// any output is produced
    encoded: Vec<Option<Vec<u8>>>,
}

impl<'a> Editor<'a> {
    /// Normalize (sort + conflict check) and validate the opcode set
    /// against the context bounds and encoding.
    pub fn new(context: &'a Context, opcodes: impl IntoIterator<Item = Opcode>) -> Result<Editor<'a>> {
        let opcodes = normalize(opcodes.into_iter().collect())?;
        if let (Some(first), Some(last)) = (opcodes.first(), opcodes.last()) {
            if first.start < context.start() || last.end > context.end() {
                return Err(Error::Bounds(format!(
                    "opcodes span {}..{} outside context bounds {}..{}",
                    first.start,
                    last.end,
                    context.start(),
                    context.end()
                )));
            }
        }
        let encoded = opcodes
            .iter()
            .map(|op| op.value.as_deref().map(|v| encode_value(context.encoding(), v)).transpose())
            .collect::<Result<Vec<_>>>()?;
        Ok(Editor {
            context,
            opcodes,
            encoded,
        })
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Stream the edited content: unchanged bytes between opcodes, each
    /// opcode's value in place of its span.
    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<()> {
        let data = self.context.buffer_data();
        let mut cursor = self.context.start();
        for (op, encoded) in self.opcodes.iter().zip(&self.encoded) {
            if cursor > op.start {
                // Unreachable after normalize; kept as a hard stop rather
                // than emitting corrupt output
                return Err(Error::Conflict {
                    first: format!("opcode ending at {cursor}"),
                    second: op.to_string(),
                });
            }
            sink.write_all(&data[cursor..op.start])?;
            match op.kind {
                OpcodeKind::Insert | OpcodeKind::Replace => {
                    if let Some(bytes) = encoded {
                        sink.write_all(bytes)?;
                    }
                }
                OpcodeKind::Delete => {}
            }
            cursor = op.end;
        }
        sink.write_all(&data[cursor..self.context.end()])?;
        Ok(())
    }

    /// Edited content as one byte vector.
    pub fn emit(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.context.len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Stream to a sink that declares its own encoding. A mismatch with
    /// the context encoding aborts before any byte is written.
    pub fn write_encoded<W: Write>(&self, sink: W, sink_encoding: &'static Encoding) -> Result<()> {
        if sink_encoding != self.context.encoding() {
            return Err(Error::Encoding(format!(
                "encodings do not match; source is {} and destination is {}",
                self.context.encoding().name(),
                sink_encoding.name()
            )));
        }
        self.write_to(sink)
    }

    /// Rewrite a file through a temp file in its directory, renamed over
    /// the original once fully written. A mapped original stays readable
    /// throughout; the rename is the only visible transition.
    pub fn write_path(&self, path: &std::path::Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => std::path::Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(tmp.as_file_mut())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Render the opcode set as a unified patch.
    ///
    /// Opcodes within `merge_distance` lines of each other are grouped into
    /// one hunk. Hunk headers carry the original line range and the shifted
    /// range on the edited side, the shift being the running line-count
    /// delta of all preceding hunks.
    pub fn patch(&self, merge_distance: usize) -> Result<String> {
        if self.opcodes.is_empty() {
            return Ok(String::new());
        }
        let map = FileMap::from_context(self.context);
        let separator = self.context.line_separator().to_vec();
        let data = self.context.buffer_data();

        // Line span touched by each opcode, in normalized order
        let spans: Vec<(usize, usize)> = self
            .opcodes
            .iter()
            .map(|op| {
                let first = map.cursor_to_line(op.start);
                let last_byte = if op.end > op.start { op.end - 1 } else { op.start };
                (first, map.cursor_to_line(last_byte))
            })
            .collect();

        // Group adjacent opcodes into hunks
        let mut hunks: Vec<(usize, usize, Vec<usize>)> = Vec::new();
        for (index, &(first, last)) in spans.iter().enumerate() {
            match hunks.last_mut() {
                Some((_, hunk_last, members)) if first <= *hunk_last + merge_distance => {
                    *hunk_last = (*hunk_last).max(last);
                    members.push(index);
                }
                _ => hunks.push((first, last, vec![index])),
            }
        }

        let mut out = String::new();
        let mut line_delta: i64 = 0;
        for (first_line, last_line, members) in hunks {
            let (hunk_start, _) = map.line_to_start_end_cursor(first_line)?;
            let (_, hunk_end) = map.line_to_start_end_cursor(last_line)?;

            let old_lines = split_content_lines(&data[hunk_start..hunk_end], &separator);

            // Render the hunk's replacement text through a nested editor
            // scoped to the hunk's byte span
            let hunk_ctx = self.context.file().sub(hunk_start, hunk_end)?;
            let hunk_ops: Vec<Opcode> =
                members.iter().map(|&i| self.opcodes[i].clone()).collect();
            let rendered = Editor::new(&hunk_ctx, hunk_ops)?.emit()?;
            let new_lines = split_content_lines(&rendered, &separator);

            let new_first = first_line as i64 + line_delta;
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                first_line,
                old_lines.len(),
                new_first,
                new_lines.len()
            ));
            for line in &old_lines {
                out.push_str("- ");
                out.push_str(line);
                out.push('\n');
            }
            for line in &new_lines {
                out.push_str("+ ");
                out.push_str(line);
                out.push('\n');
            }
            line_delta += new_lines.len() as i64 - old_lines.len() as i64;
        }
        Ok(out)
    }
}

fn encode_value(encoding: &'static Encoding, value: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = encoding.encode(value);
    if had_errors {
        return Err(Error::Encoding(format!(
            "replacement text is not representable in {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}

/// Split content into display lines, separators stripped; a trailing
/// fragment without a separator still counts as a line.
fn split_content_lines(content: &[u8], separator: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pos = 0;
    while pos < content.len() {
        let line_end = content[pos..]
            .windows(separator.len().max(1))
            .position(|w| w == separator)
            .map(|at| pos + at);
        match line_end {
            Some(at) => {
                lines.push(String::from_utf8_lossy(&content[pos..at]).into_owned());
                pos = at + separator.len();
            }
            None => {
                lines.push(String::from_utf8_lossy(&content[pos..]).into_owned());
                break;
            }
        }
    }
    lines
}
