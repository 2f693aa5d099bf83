//! Query text -> AST.
//!
//! A pull-based tokenizer feeding a recursive-descent parser. Keywords are
//! case-insensitive; string literals take single or double quotes with
//! backslash escapes; regex literals are `/pattern/flags`; `$name.0.key`
//! references session variables. Paths (after FROM/UPDATE/USE) are lexed in
//! a dedicated mode since they are not ordinary identifiers.

use crate::ast::{
    Cursor, FindMode, MatchTarget, Operation, Query, RangeIndex, Selection, Selector, SelectValue,
    SetKey, StringExpr, Value, ValueExpr, VarKey, VarPath,
};
use crate::error::{Error, Result};

/// Parse a script into its queries, separated by `;`.
pub fn parse(input: &str) -> Result<Vec<Query>> {
    let mut parser = Parser::new(input);
    let mut queries = Vec::new();
    loop {
        while parser.eat(&Tok::Semi)? {}
        if matches!(parser.peek()?.0, Tok::Eof) {
            break;
        }
        queries.push(parser.parse_query()?);
        let (tok, pos) = parser.peek()?.clone();
        match tok {
            Tok::Semi | Tok::Eof => {}
            other => {
                return Err(Error::parse(
                    format!("expected `;` between queries, found {}", other.describe()),
                    pos,
                ))
            }
        }
    }
    Ok(queries)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    Regex { pattern: String, flags: String },
    Var(VarPath),
    Comma,
    Semi,
    Colon,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("`{s}`"),
            Tok::Int(n) => format!("`{n}`"),
            Tok::Str(_) => "a string".into(),
            Tok::Regex { .. } => "a regex".into(),
            Tok::Var(_) => "a variable".into(),
            Tok::Comma => "`,`".into(),
            Tok::Semi => "`;`".into(),
            Tok::Colon => "`:`".into(),
            Tok::Eof => "end of input".into(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Tok::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Lexer<'s> {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.starts_with(b"--") || self.starts_with(b"//") {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if self.starts_with(b"/*") {
                let open = self.pos;
                self.pos += 2;
                loop {
                    if self.pos + 1 >= self.src.len() {
                        return Err(Error::parse("unterminated block comment", open));
                    }
                    if self.starts_with(b"*/") {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                return Ok(());
            }
        }
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    fn next_token(&mut self) -> Result<(Tok, usize)> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(&byte) = self.src.get(self.pos) else {
            return Ok((Tok::Eof, start));
        };
        match byte {
            b',' => {
                self.pos += 1;
                Ok((Tok::Comma, start))
            }
            b';' => {
                self.pos += 1;
                Ok((Tok::Semi, start))
            }
            b':' => {
                self.pos += 1;
                Ok((Tok::Colon, start))
            }
            b'"' | b'\'' => Ok((Tok::Str(self.lex_string()?), start)),
            b'/' => self.lex_regex(),
            b'$' => self.lex_variable(),
            b'-' => {
                if self.src.get(self.pos + 1).is_some_and(|b| b.is_ascii_digit()) {
                    self.lex_int()
                } else {
                    Err(Error::parse("unexpected `-`", start))
                }
            }
            b if b.is_ascii_digit() => self.lex_int(),
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let word = self.lex_word();
                Ok((Tok::Ident(word), start))
            }
            other => Err(Error::parse(
                format!("unexpected character `{}`", other as char),
                start,
            )),
        }
    }

    fn lex_word(&mut self) -> String {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_int(&mut self) -> Result<(Tok, usize)> {
        let start = self.pos;
        if self.src[self.pos] == b'-' {
            self.pos += 1;
        }
        while self.src.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        let value = text
            .parse::<i64>()
            .map_err(|_| Error::parse(format!("integer `{text}` out of range"), start))?;
        Ok((Tok::Int(value), start))
    }

    fn lex_string(&mut self) -> Result<String> {
        let quote = self.src[self.pos];
        let open = self.pos;
        self.pos += 1;
        // Accumulate raw bytes so multi-byte characters pass through intact
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.src.get(self.pos) {
                None => return Err(Error::parse("unterminated string literal", open)),
                Some(&b) if b == quote => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&out).into_owned());
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .src
                        .get(self.pos)
                        .ok_or_else(|| Error::parse("unterminated string literal", open))?;
                    out.push(match escaped {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'0' => b'\0',
                        other => *other,
                    });
                    self.pos += 1;
                }
                Some(&b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn lex_regex(&mut self) -> Result<(Tok, usize)> {
        let open = self.pos;
        self.pos += 1;
        let mut pattern: Vec<u8> = Vec::new();
        loop {
            match self.src.get(self.pos) {
                None => return Err(Error::parse("unterminated regex literal", open)),
                Some(b'/') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    // Escaped slash drops the backslash; any other escape
                    // passes through to the regex engine untouched
                    if self.src.get(self.pos + 1) == Some(&b'/') {
                        pattern.push(b'/');
                        self.pos += 2;
                    } else {
                        pattern.push(b'\\');
                        self.pos += 1;
                    }
                }
                Some(&b) => {
                    pattern.push(b);
                    self.pos += 1;
                }
            }
        }
        let pattern = String::from_utf8_lossy(&pattern).into_owned();
        let mut flags = String::new();
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphabetic())
        {
            flags.push(self.src[self.pos] as char);
            self.pos += 1;
        }
        Ok((Tok::Regex { pattern, flags }, open))
    }

    fn lex_variable(&mut self) -> Result<(Tok, usize)> {
        let start = self.pos;
        self.pos += 1;
        let mut path = VarPath::new();
        loop {
            let key = if self.src.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                let digits_start = self.pos;
                while self.src.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits = std::str::from_utf8(&self.src[digits_start..self.pos])
                    .unwrap_or("");
                let index = digits.parse::<usize>().map_err(|_| {
                    Error::parse(format!("positional index `{digits}` out of range"), digits_start)
                })?;
                VarKey::Position(index)
            } else if self
                .src
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
            {
                VarKey::Named(self.lex_word())
            } else {
                return Err(Error::parse("expected a variable name after `$`", start));
            };
            path.push(key);
            if self.src.get(self.pos) == Some(&b'.')
                && self
                    .src
                    .get(self.pos + 1)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
            {
                self.pos += 1;
            } else {
                return Ok((Tok::Var(path), start));
            }
        }
    }

    /// Lex a path operand: a quoted string, or a bare token running to the
    /// next whitespace, comma or semicolon.
    fn next_path(&mut self) -> Result<(String, usize)> {
        self.skip_trivia()?;
        let start = self.pos;
        match self.src.get(self.pos) {
            None => Err(Error::parse("expected a path", start)),
            Some(b'"') | Some(b'\'') => Ok((self.lex_string()?, start)),
            Some(_) => {
                while self.src.get(self.pos).is_some_and(|b| {
                    !b.is_ascii_whitespace() && *b != b';' && *b != b','
                }) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(Error::parse("expected a path", start));
                }
                Ok((
                    String::from_utf8_lossy(&self.src[start..self.pos]).into_owned(),
                    start,
                ))
            }
        }
    }
}

struct Parser<'s> {
    lexer: Lexer<'s>,
    peeked: Option<(Tok, usize)>,
}

impl<'s> Parser<'s> {
    fn new(input: &'s str) -> Parser<'s> {
        Parser {
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&(Tok, usize)> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn advance(&mut self) -> Result<(Tok, usize)> {
        match self.peeked.take() {
            Some(entry) => Ok(entry),
            None => self.lexer.next_token(),
        }
    }

    fn eat(&mut self, tok: &Tok) -> Result<bool> {
        if &self.peek()?.0 == tok {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn peek_keyword(&mut self, keyword: &str) -> Result<bool> {
        Ok(self.peek()?.0.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> Result<bool> {
        if self.peek_keyword(keyword)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let (tok, pos) = self.advance()?;
        if tok.is_keyword(keyword) {
            Ok(())
        } else {
            Err(Error::parse(
                format!("expected `{keyword}`, found {}", tok.describe()),
                pos,
            ))
        }
    }

    /// `OF` with `IN` accepted as a synonym.
    fn eat_of(&mut self) -> Result<bool> {
        Ok(self.eat_keyword("OF")? || self.eat_keyword("IN")?)
    }

    fn opt_int(&mut self) -> Result<Option<i64>> {
        if let Tok::Int(n) = self.peek()?.0 {
            self.advance()?;
            Ok(Some(n))
        } else {
            Ok(None)
        }
    }

    fn snapshot(&self) -> (usize, Option<(Tok, usize)>) {
        (self.lexer.pos, self.peeked.clone())
    }

    fn restore(&mut self, snap: (usize, Option<(Tok, usize)>)) {
        self.lexer.pos = snap.0;
        self.peeked = snap.1;
    }

    fn path(&mut self) -> Result<String> {
        match self.peeked.take() {
            // A quoted path may have been pre-lexed as a string; bare
            // paths must come from the dedicated lexing mode
            Some((Tok::Str(s), _)) => Ok(s),
            Some((tok, pos)) => Err(Error::parse(
                format!("expected a path, found {}", tok.describe()),
                pos,
            )),
            None => Ok(self.lexer.next_path()?.0),
        }
    }

    fn parse_query(&mut self) -> Result<Query> {
        let (tok, pos) = self.peek()?.clone();
        if tok.is_keyword("SELECT") {
            self.advance()?;
            self.parse_select()
        } else if tok.is_keyword("UPDATE") {
            self.advance()?;
            self.parse_update()
        } else if tok.is_keyword("SHOW") {
            self.advance()?;
            Ok(Query::Show {
                value: self.parse_select_value()?,
            })
        } else if tok.is_keyword("SET") {
            self.advance()?;
            self.parse_set()
        } else if tok.is_keyword("USE") {
            self.advance()?;
            Ok(Query::Use { path: self.path()? })
        } else {
            Err(Error::parse(
                format!(
                    "expected SELECT, UPDATE, SHOW, SET or USE, found {}",
                    tok.describe()
                ),
                pos,
            ))
        }
    }

    fn parse_select(&mut self) -> Result<Query> {
        let mut values = vec![self.parse_select_value()?];
        while self.eat(&Tok::Comma)? {
            values.push(self.parse_select_value()?);
        }
        self.expect_keyword("FROM")?;
        Ok(Query::Select {
            values,
            path: self.path()?,
        })
    }

    fn parse_select_value(&mut self) -> Result<SelectValue> {
        let value = if let Tok::Var(path) = &self.peek()?.0 {
            let path = path.clone();
            self.advance()?;
            ValueExpr::Variable(path)
        } else {
            ValueExpr::Selector(self.parse_selector()?)
        };
        let alias = if self.eat_keyword("AS")? {
            let (tok, pos) = self.advance()?;
            match tok {
                Tok::Ident(name) => Some(name),
                other => {
                    return Err(Error::parse(
                        format!("expected an alias name, found {}", other.describe()),
                        pos,
                    ))
                }
            }
        } else {
            None
        };
        Ok(SelectValue { value, alias })
    }

    fn parse_update(&mut self) -> Result<Query> {
        let path = self.path()?;
        let mut operations = vec![self.parse_operation()?];
        while self.eat(&Tok::Comma)? {
            operations.push(self.parse_operation()?);
        }
        Ok(Query::Update { path, operations })
    }

    fn parse_operation(&mut self) -> Result<Operation> {
        let (tok, pos) = self.peek()?.clone();
        if tok.is_keyword("INSERT") {
            self.advance()?;
            let is_line = self.eat_keyword("LINE")? || self.eat_keyword("LINES")?;
            let text = self.parse_string_expr()?;
            // Optional AT before the cursor reads naturally
            let _ = self.eat_keyword("AT")?;
            let cursor = self.parse_cursor()?;
            Ok(Operation::Insert {
                text,
                cursor,
                is_line,
            })
        } else if tok.is_keyword("CHANGE") {
            self.advance()?;
            let selection = self.parse_selection()?;
            self.expect_keyword("TO")?;
            let replacement = self.parse_string_expr()?;
            Ok(Operation::Change {
                selection,
                replacement,
            })
        } else if tok.is_keyword("DELETE") {
            self.advance()?;
            Ok(Operation::Delete {
                selection: self.parse_selection()?,
            })
        } else if tok.is_keyword("INDENT") {
            self.advance()?;
            let amount = self.opt_int()?;
            Ok(Operation::Indent {
                selection: self.parse_selection()?,
                amount,
            })
        } else {
            Err(Error::parse(
                format!(
                    "expected INSERT, CHANGE, DELETE or INDENT, found {}",
                    tok.describe()
                ),
                pos,
            ))
        }
    }

    fn parse_string_expr(&mut self) -> Result<StringExpr> {
        let (tok, pos) = self.advance()?;
        match tok {
            Tok::Str(s) => Ok(StringExpr::Literal(s)),
            Tok::Var(path) => Ok(StringExpr::Variable(path)),
            other => Err(Error::parse(
                format!("expected a string or variable, found {}", other.describe()),
                pos,
            )),
        }
    }

    fn parse_set(&mut self) -> Result<Query> {
        let (tok, pos) = self.advance()?;
        let key = match tok {
            Tok::Var(path) => SetKey::Variable(path),
            Tok::Ident(name) => SetKey::Setting(name.to_ascii_lowercase()),
            other => {
                return Err(Error::parse(
                    format!(
                        "expected a setting name or variable, found {}",
                        other.describe()
                    ),
                    pos,
                ))
            }
        };
        let (tok, pos) = self.advance()?;
        let value = match tok {
            Tok::Str(s) => Value::Str(s),
            Tok::Int(n) => Value::Int(n),
            Tok::Var(path) => Value::Variable(path),
            Tok::Ident(name) => Value::Symbol(name),
            other => {
                return Err(Error::parse(
                    format!("expected a value, found {}", other.describe()),
                    pos,
                ))
            }
        };
        Ok(Query::Set { key, value })
    }

    /// Cursor or selection, disambiguated by the leading token. AFTER and
    /// BEFORE read as relative cursors here; where a selection is required
    /// they read as open-ended spans instead.
    fn parse_selector(&mut self) -> Result<Selector> {
        let (tok, _) = self.peek()?.clone();
        if tok.is_keyword("START")
            || tok.is_keyword("END")
            || tok.is_keyword("AFTER")
            || tok.is_keyword("BEFORE")
        {
            return Ok(Selector::Cursor(self.parse_cursor()?));
        }
        if starts_range_list(&tok) {
            // Look past the range list to see which family it applies to
            let snap = self.snapshot();
            self.parse_range_list()?;
            let (next, _) = self.peek()?.clone();
            let is_cursor = next.is_keyword("START")
                || next.is_keyword("END")
                || next.is_keyword("AFTER")
                || next.is_keyword("BEFORE");
            self.restore(snap);
            if is_cursor {
                return Ok(Selector::Cursor(self.parse_cursor()?));
            }
        }
        Ok(Selector::Selection(self.parse_selection()?))
    }

    fn parse_cursor(&mut self) -> Result<Cursor> {
        let (tok, pos) = self.peek()?.clone();
        let mut cursor = if tok.is_keyword("START") {
            self.advance()?;
            Cursor::Start
        } else if tok.is_keyword("END") {
            self.advance()?;
            Cursor::End
        } else if tok.is_keyword("AFTER") {
            self.advance()?;
            let offset = self.opt_int()?;
            Cursor::After {
                offset,
                target: Box::new(self.parse_selector()?),
            }
        } else if tok.is_keyword("BEFORE") {
            self.advance()?;
            let offset = self.opt_int()?;
            Cursor::Before {
                offset,
                target: Box::new(self.parse_selector()?),
            }
        } else if starts_range_list(&tok) {
            let ranges = self.parse_range_list()?;
            Cursor::Ranged {
                ranges,
                inner: Box::new(self.parse_cursor()?),
            }
        } else {
            return Err(Error::parse(
                format!("expected a cursor, found {}", tok.describe()),
                pos,
            ));
        };
        while self.eat_of()? {
            cursor = Cursor::Of {
                inner: Box::new(cursor),
                outer: Box::new(self.parse_selection()?),
            };
        }
        Ok(cursor)
    }

    fn parse_selection(&mut self) -> Result<Selection> {
        let (tok, pos) = self.peek()?.clone();
        let mut selection = if tok.is_keyword("LINE") {
            self.advance()?;
            if self.eat_of()? {
                Selection::LineOfCursor(Box::new(self.parse_cursor()?))
            } else {
                Selection::Lines {
                    ranges: self.parse_range_list()?,
                }
            }
        } else if tok.is_keyword("LINES") {
            self.advance()?;
            let (next, next_pos) = self.peek()?.clone();
            if self.eat_of()? {
                Selection::LinesOf(Box::new(self.parse_selection()?))
            } else {
                return Err(Error::parse(
                    format!("expected `OF` after `LINES`, found {}", next.describe()),
                    next_pos,
                ));
            }
        } else if tok.is_keyword("FIND") {
            self.advance()?;
            let mode = if self.eat_keyword("LINE")? || self.eat_keyword("LINES")? {
                if self.eat_keyword("WITH")? {
                    FindMode::LineWith
                } else {
                    FindMode::WholeLine
                }
            } else {
                FindMode::Plain
            };
            Selection::Find {
                target: self.parse_match_target()?,
                mode,
            }
        } else if tok.is_keyword("FROM") {
            self.advance()?;
            let start = Box::new(self.parse_selector()?);
            self.expect_keyword("TO")?;
            Selection::Block {
                start,
                end: Box::new(self.parse_selector()?),
            }
        } else if tok.is_keyword("BETWEEN") {
            self.advance()?;
            let start = Box::new(self.parse_selector()?);
            self.expect_keyword("AND")?;
            Selection::Between {
                start,
                end: Box::new(self.parse_selector()?),
            }
        } else if tok.is_keyword("FILE") {
            self.advance()?;
            Selection::File
        } else if tok.is_keyword("AFTER") {
            self.advance()?;
            Selection::AfterAll(Box::new(self.parse_selector()?))
        } else if tok.is_keyword("BEFORE") {
            self.advance()?;
            Selection::BeforeAll(Box::new(self.parse_selector()?))
        } else if starts_range_list(&tok) {
            let ranges = self.parse_range_list()?;
            if self.eat_keyword("LINES")? || self.eat_keyword("LINE")? {
                Selection::Lines { ranges }
            } else {
                Selection::Ranged {
                    ranges,
                    inner: Box::new(self.parse_selection()?),
                }
            }
        } else {
            match tok {
                // A bare string/regex/variable in selection position is an
                // implicit FIND
                Tok::Str(text) => {
                    self.advance()?;
                    Selection::Find {
                        target: MatchTarget::Literal(text),
                        mode: FindMode::Plain,
                    }
                }
                Tok::Regex { pattern, flags } => {
                    self.advance()?;
                    Selection::Find {
                        target: MatchTarget::Regex { pattern, flags },
                        mode: FindMode::Plain,
                    }
                }
                Tok::Var(path) => {
                    self.advance()?;
                    Selection::Find {
                        target: MatchTarget::Variable(path),
                        mode: FindMode::Plain,
                    }
                }
                other => {
                    return Err(Error::parse(
                        format!("expected a selection, found {}", other.describe()),
                        pos,
                    ))
                }
            }
        };
        while self.eat_of()? {
            selection = Selection::Of {
                inner: Box::new(selection),
                outer: Box::new(self.parse_selection()?),
            };
        }
        Ok(selection)
    }

    fn parse_match_target(&mut self) -> Result<MatchTarget> {
        let (tok, _) = self.peek()?.clone();
        match tok {
            Tok::Str(text) => {
                self.advance()?;
                Ok(MatchTarget::Literal(text))
            }
            Tok::Regex { pattern, flags } => {
                self.advance()?;
                Ok(MatchTarget::Regex { pattern, flags })
            }
            Tok::Var(path) => {
                self.advance()?;
                Ok(MatchTarget::Variable(path))
            }
            _ => Ok(MatchTarget::Selection(Box::new(self.parse_selection()?))),
        }
    }

    fn parse_range_list(&mut self) -> Result<Vec<RangeIndex>> {
        let mut ranges = vec![self.parse_range_index()?];
        loop {
            let snap = self.snapshot();
            if !self.eat(&Tok::Comma)? {
                break;
            }
            let next = self.peek()?.0.clone();
            if starts_range_list(&next) {
                ranges.push(self.parse_range_index()?);
            } else {
                // The comma belongs to an enclosing list
                self.restore(snap);
                break;
            }
        }
        Ok(ranges)
    }

    fn parse_range_index(&mut self) -> Result<RangeIndex> {
        let (tok, pos) = self.advance()?;
        if tok.is_keyword("FIRST") {
            return Ok(RangeIndex::First(self.count_operand()?));
        }
        if tok.is_keyword("LAST") {
            return Ok(RangeIndex::Last(self.count_operand()?));
        }
        if tok.is_keyword("NEXT") {
            return Ok(RangeIndex::Next(self.count_operand()?));
        }
        if let Tok::Int(start) = tok {
            if self.eat(&Tok::Colon)? {
                let (end_tok, end_pos) = self.advance()?;
                let Tok::Int(end) = end_tok else {
                    return Err(Error::parse(
                        format!("expected a range end, found {}", end_tok.describe()),
                        end_pos,
                    ));
                };
                let step = if self.eat(&Tok::Colon)? {
                    let (step_tok, step_pos) = self.advance()?;
                    match step_tok {
                        Tok::Int(step) if step > 0 => Some(step as usize),
                        Tok::Int(step) => {
                            return Err(Error::parse(
                                format!("range step must be positive, found {step}"),
                                step_pos,
                            ))
                        }
                        other => {
                            return Err(Error::parse(
                                format!("expected a range step, found {}", other.describe()),
                                step_pos,
                            ))
                        }
                    }
                } else {
                    None
                };
                return Ok(RangeIndex::Range { start, end, step });
            }
            return Ok(RangeIndex::Index(start));
        }
        Err(Error::parse(
            format!("expected an ordinal, found {}", tok.describe()),
            pos,
        ))
    }

    fn count_operand(&mut self) -> Result<Option<usize>> {
        match self.opt_int()? {
            None => Ok(None),
            Some(n) if n > 0 => Ok(Some(n as usize)),
            Some(n) => Err(Error::IndexSemantic(format!(
                "ordinal count must be positive, found {n}"
            ))),
        }
    }
}

fn starts_range_list(tok: &Tok) -> bool {
    matches!(tok, Tok::Int(_))
        || tok.is_keyword("FIRST")
        || tok.is_keyword("LAST")
        || tok.is_keyword("NEXT")
}
