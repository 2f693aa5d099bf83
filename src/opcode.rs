//! Typed edit instructions with byte-offset spans.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeKind {
    Insert,
    Replace,
    Delete,
}

/// One atomic edit: a half-open byte span and, for insert/replace, the
/// replacement text (encoded at emission time with the context encoding).
#[derive(Debug, Clone, PartialEq)]
pub struct Opcode {
    pub kind: OpcodeKind,
    pub start: usize,
    pub end: usize,
    pub value: Option<String>,
}

impl Opcode {
    /// Insert `value` at a zero-width target.
    pub fn insert(at: usize, value: impl Into<String>) -> Opcode {
        Opcode {
            kind: OpcodeKind::Insert,
            start: at,
            end: at,
            value: Some(value.into()),
        }
    }

    pub fn replace(start: usize, end: usize, value: impl Into<String>) -> Opcode {
        Opcode {
            kind: OpcodeKind::Replace,
            start,
            end,
            value: Some(value.into()),
        }
    }

    pub fn delete(start: usize, end: usize) -> Opcode {
        Opcode {
            kind: OpcodeKind::Delete,
            start,
            end,
            value: None,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            OpcodeKind::Insert => write!(f, "insert @ {}", self.start),
            OpcodeKind::Replace => write!(f, "replace {}..{}", self.start, self.end),
            OpcodeKind::Delete => write!(f, "delete {}..{}", self.start, self.end),
        }
    }
}

/// Sort opcodes by start and verify the set is pairwise non-overlapping:
/// each opcode's end must not exceed the following opcode's start.
/// Runs to completion before any byte of output is emitted, so a conflict
/// means nothing has been written.
pub fn normalize(mut opcodes: Vec<Opcode>) -> Result<Vec<Opcode>> {
    opcodes.sort_by_key(|op| (op.start, op.end));
    for pair in opcodes.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(Error::Conflict {
                first: pair[0].to_string(),
                second: pair[1].to_string(),
            });
        }
    }
    Ok(opcodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_by_start() {
        let ops = vec![Opcode::delete(8, 10), Opcode::replace(2, 5, "a")];
        let sorted = normalize(ops).unwrap();
        assert_eq!(sorted[0].start, 2);
        assert_eq!(sorted[1].start, 8);
    }

    #[test]
    fn touching_spans_are_legal() {
        let ops = vec![Opcode::replace(7, 8, "a"), Opcode::delete(8, 10)];
        assert!(normalize(ops).is_ok());
    }

    #[test]
    fn overlap_is_a_conflict_in_either_order() {
        let a = Opcode::replace(7, 9, "a");
        let b = Opcode::delete(8, 10);
        for ops in [vec![a.clone(), b.clone()], vec![b, a]] {
            match normalize(ops) {
                Err(Error::Conflict { first, second }) => {
                    assert_eq!(first, "replace 7..9");
                    assert_eq!(second, "delete 8..10");
                }
                other => panic!("expected conflict, got {other:?}"),
            }
        }
    }

    #[test]
    fn insert_between_touching_spans_is_legal() {
        let ops = vec![
            Opcode::replace(0, 4, "x"),
            Opcode::insert(4, "y"),
            Opcode::delete(4, 6),
        ];
        assert!(normalize(ops).is_ok());
    }
}
