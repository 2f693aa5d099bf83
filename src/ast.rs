//! The selector/operation/query AST consumed by the evaluator and session.
//!
//! Every family here is a closed sum type: the variant sets are fixed by the
//! grammar, so each consumer dispatches with an exhaustive match and the
//! compiler flags any unhandled kind.

/// Ordinal/slice directive narrowing a candidate sequence.
///
/// Counts are external 1-based values; negative `Index`/`Range` bounds count
/// from the end of the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeIndex {
    /// FIRST\[n\], default 1
    First(Option<usize>),
    /// LAST\[n\], default 1
    Last(Option<usize>),
    /// NEXT\[n\], default 1; starts right after the previously consumed index
    Next(Option<usize>),
    /// A single 1-based ordinal; negative counts from the end, 0 is invalid
    Index(i64),
    /// Inclusive 1-based span `start:end[:step]`
    Range {
        start: i64,
        end: i64,
        step: Option<usize>,
    },
}

/// Either family of selector node.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Cursor(Cursor),
    Selection(Selection),
}

/// Cursor-producing selector nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Zero-width at context offset 0
    Start,
    /// Zero-width at context length
    End,
    /// `AFTER [n] x`: n bytes (default 1) past the referenced result's end
    After {
        offset: Option<i64>,
        target: Box<Selector>,
    },
    /// `BEFORE [n] x`: n bytes (default 1) before the referenced result's
    /// start
    Before {
        offset: Option<i64>,
        target: Box<Selector>,
    },
    /// `cursor OF selection`: re-evaluate the cursor inside each outer
    /// result
    Of {
        inner: Box<Cursor>,
        outer: Box<Selection>,
    },
    /// Ordinal filtering of a multi-result cursor
    Ranged {
        ranges: Vec<RangeIndex>,
        inner: Box<Cursor>,
    },
}

/// Selection-producing selector nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `LINE n` / `FIRST n LINES`: direct line selection by ordinal
    Lines { ranges: Vec<RangeIndex> },
    /// `LINE OF cursor`: the line a cursor sits on
    LineOfCursor(Box<Cursor>),
    /// `LINES OF selection`: individual lines of a larger selection
    LinesOf(Box<Selection>),
    /// `FIND expr` and its line-oriented variants
    Find { target: MatchTarget, mode: FindMode },
    /// Everything from the last result of the target to the context end
    AfterAll(Box<Selector>),
    /// Everything from the context start to the first result of the target
    BeforeAll(Box<Selector>),
    /// `FROM x TO y`, inclusive of both endpoints
    Block {
        start: Box<Selector>,
        end: Box<Selector>,
    },
    /// `BETWEEN x AND y`, exclusive interior
    Between {
        start: Box<Selector>,
        end: Box<Selector>,
    },
    /// `inner OF outer`: evaluate inner within each outer result
    Of {
        inner: Box<Selection>,
        outer: Box<Selection>,
    },
    /// Ordinal filtering of a multi-result selection
    Ranged {
        ranges: Vec<RangeIndex>,
        inner: Box<Selection>,
    },
    /// The entire backing buffer, escaping any sub-selection
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    /// Match anywhere and select exactly the match
    Plain,
    /// `FIND LINE expr`: select lines whose whole content matches
    WholeLine,
    /// `FIND LINE WITH expr`: select the whole line around each match
    LineWith,
}

/// What a FIND searches for.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTarget {
    Literal(String),
    Regex { pattern: String, flags: String },
    Variable(VarPath),
    Selection(Box<Selection>),
}

/// A `$variable` reference: a sequence of positional or named keys.
pub type VarPath = Vec<VarKey>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKey {
    Named(String),
    Position(usize),
}

/// Top-level query forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select {
        values: Vec<SelectValue>,
        path: String,
    },
    Update {
        path: String,
        operations: Vec<Operation>,
    },
    Show {
        value: SelectValue,
    },
    Set {
        key: SetKey,
        value: Value,
    },
    Use {
        path: String,
    },
}

/// One value position of a SELECT/SHOW, with its optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectValue {
    pub value: ValueExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Selector(Selector),
    Variable(VarPath),
}

/// Edit operations of an UPDATE query.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert {
        text: StringExpr,
        cursor: Cursor,
        is_line: bool,
    },
    Change {
        selection: Selection,
        replacement: StringExpr,
    },
    Delete {
        selection: Selection,
    },
    Indent {
        selection: Selection,
        amount: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringExpr {
    Literal(String),
    Variable(VarPath),
}

/// Target of a SET: a session setting name or a session variable.
#[derive(Debug, Clone, PartialEq)]
pub enum SetKey {
    Setting(String),
    Variable(VarPath),
}

/// A literal or reference in a SET value position.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Symbol(String),
    Variable(VarPath),
}
