//! Query execution against files.
//!
//! A [`Session`] owns the settings a query runs under (encoding, line
//! separator, line-number display, the `USE` path) plus the variable store,
//! and executes parsed queries: SELECT collects per-file result stores,
//! UPDATE turns operations into opcodes and rewrites files atomically
//! (write to a temp file in the same directory, then rename over the
//! original), SHOW prints selections from the `USE` path, SET mutates
//! settings or variables, USE picks the default path.

use crate::ast::{
    Operation, Query, SelectValue, SetKey, StringExpr, Value, ValueExpr, VarKey,
};
use crate::context::{default_line_separator, Context};
use crate::editor::{Editor, DEFAULT_HUNK_MERGE_DISTANCE};
use crate::error::{Error, Result};
use crate::eval::{evaluate_cursor, evaluate_selection, evaluate_selector};
use crate::file_map::FileMap;
use crate::opcode::Opcode;
use crate::parser::parse;
use crate::vars::{format_path, variable_text, SessionValue, VariableStore};
use encoding_rs::{Encoding, UTF_8};
use globset::Glob;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_INDENT: i64 = 4;

pub struct Session {
    encoding: &'static Encoding,
    line_separator: Vec<u8>,
    /// Line-number prefix format for SHOW output; `{}` is the line number
    line_numbers: Option<String>,
    use_path: Option<String>,
    variables: VariableStore,
    /// Render UPDATE queries as patches instead of writing files
    dry_run: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

/// Result of one executed query.
#[derive(Debug)]
pub enum QueryResult {
    Select(Vec<VariableStore>),
    Update(UpdateReport),
    Show(Vec<String>),
    Set,
    Use,
}

#[derive(Debug)]
pub struct UpdateReport {
    pub files: Vec<FileUpdate>,
}

#[derive(Debug)]
pub struct FileUpdate {
    pub path: PathBuf,
    pub opcodes: usize,
    /// Present in dry-run mode instead of a file write
    pub patch: Option<String>,
}

impl Session {
    pub fn new() -> Session {
        Session {
            encoding: UTF_8,
            line_separator: default_line_separator().to_vec(),
            line_numbers: None,
            use_path: None,
            variables: VariableStore::new(),
            dry_run: false,
        }
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Apply a session setting by name, as `SET <name> <value>` would.
    pub fn configure(&mut self, name: &str, value: &str) -> Result<()> {
        self.apply_setting(name, &Value::Symbol(value.to_string()))
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Execute exactly one query.
    pub fn execute(&mut self, code: &str) -> Result<QueryResult> {
        let queries = parse(code)?;
        match queries.len() {
            0 => Err(Error::Parse {
                message: "no query to execute".into(),
                position: None,
            }),
            1 => self.execute_query(&queries[0]),
            _ => Err(Error::Parse {
                message: "can't execute multiple queries with `execute`, use `execute_all`".into(),
                position: None,
            }),
        }
    }

    /// Execute a script in order, stopping at the first failure.
    pub fn execute_all(&mut self, code: &str) -> Result<Vec<QueryResult>> {
        let queries = parse(code)?;
        let mut results = Vec::with_capacity(queries.len());
        for query in &queries {
            results.push(self.execute_query(query)?);
        }
        Ok(results)
    }

    pub fn execute_query(&mut self, query: &Query) -> Result<QueryResult> {
        match query {
            Query::Select { values, path } => self.execute_select(values, path),
            Query::Update { path, operations } => self.execute_update(path, operations),
            Query::Show { value } => self.execute_show(value),
            Query::Set { key, value } => {
                self.execute_set(key, value)?;
                Ok(QueryResult::Set)
            }
            Query::Use { path } => {
                tracing::debug!("using path {path}");
                self.use_path = Some(path.clone());
                Ok(QueryResult::Use)
            }
        }
    }

    fn file_context(&self, path: &Path) -> Result<Context> {
        Context::from_path_with(path, self.encoding, &self.line_separator)
    }

    fn execute_select(&mut self, values: &[SelectValue], path: &str) -> Result<QueryResult> {
        let mut stores = Vec::new();
        for file in expand_glob(path)? {
            tracing::debug!("selecting from {}", file.display());
            let ctx = self.file_context(&file)?;
            let mut store = VariableStore::new();
            store.push(SessionValue::Text(file.display().to_string()));
            for value in values {
                let evaluated = self.evaluate_value(&value.value, &ctx)?;
                if let Some(alias) = &value.alias {
                    store.set_key(&VarKey::Named(alias.clone()), evaluated.clone());
                }
                store.push(evaluated);
            }
            stores.push(store);
        }
        Ok(QueryResult::Select(stores))
    }

    fn evaluate_value(&self, value: &ValueExpr, ctx: &Context) -> Result<SessionValue> {
        match value {
            ValueExpr::Selector(selector) => {
                let mut texts = Vec::new();
                for result in evaluate_selector(selector, ctx, &self.variables) {
                    texts.push(result?.text()?);
                }
                Ok(SessionValue::Store(VariableStore::from_texts(texts)))
            }
            ValueExpr::Variable(path) => self
                .variables
                .lookup(path)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("variable {}", format_path(path)))),
        }
    }

    fn execute_show(&mut self, value: &SelectValue) -> Result<QueryResult> {
        match &value.value {
            ValueExpr::Variable(path) => {
                let found = self
                    .variables
                    .lookup(path)
                    .ok_or_else(|| Error::NotFound(format!("variable {}", format_path(path))))?;
                let rendered = match found {
                    SessionValue::Text(s) => s.clone(),
                    SessionValue::Int(i) => i.to_string(),
                    SessionValue::Store(store) => store.to_json().to_string(),
                };
                Ok(QueryResult::Show(vec![rendered]))
            }
            ValueExpr::Selector(selector) => {
                let pattern = self.use_path.clone().ok_or_else(|| {
                    Error::NotFound("no path in use; run `USE <path>` first".into())
                })?;
                let mut out = Vec::new();
                for file in expand_glob(&pattern)? {
                    let ctx = self.file_context(&file)?;
                    for result in evaluate_selector(selector, &ctx, &self.variables) {
                        out.push(self.render_selection(&result?)?);
                    }
                }
                Ok(QueryResult::Show(out))
            }
        }
    }

    /// Selection text for SHOW, with the line-number prefix applied when
    /// configured.
    fn render_selection(&self, ctx: &Context) -> Result<String> {
        let Some(format) = &self.line_numbers else {
            return ctx.text();
        };
        let map = FileMap::from_context(ctx);
        let mut out = String::new();
        for line in ctx.split_lines() {
            let lineno = map.cursor_to_line(line.start());
            out.push_str(&format.replace("{}", &lineno.to_string()));
            out.push_str(&line.text()?);
        }
        Ok(out)
    }

    fn execute_update(&mut self, path: &str, operations: &[Operation]) -> Result<QueryResult> {
        let mut files = Vec::new();
        for file in expand_glob(path)? {
            let ctx = self.file_context(&file)?;
            let mut opcodes = Vec::new();
            for operation in operations {
                self.operation_opcodes(operation, &ctx, &mut opcodes)?;
            }
            let editor = Editor::new(&ctx, opcodes)?;
            let count = editor.opcodes().len();
            if self.dry_run {
                files.push(FileUpdate {
                    path: file,
                    opcodes: count,
                    patch: Some(editor.patch(DEFAULT_HUNK_MERGE_DISTANCE)?),
                });
            } else {
                editor.write_path(&file)?;
                tracing::info!("updated {} with {count} operations", file.display());
                files.push(FileUpdate {
                    path: file,
                    opcodes: count,
                    patch: None,
                });
            }
        }
        Ok(QueryResult::Update(UpdateReport { files }))
    }

    /// Expand one update operation into opcodes against a file context.
    fn operation_opcodes(
        &self,
        operation: &Operation,
        ctx: &Context,
        out: &mut Vec<Opcode>,
    ) -> Result<()> {
        match operation {
            Operation::Insert {
                text,
                cursor,
                is_line,
            } => {
                let value = self.string_expr(text)?;
                for result in evaluate_cursor(cursor, ctx, &self.variables) {
                    let at = result?;
                    if *is_line {
                        let (snapped, line_value) = self.snap_line_insert(&at, &value);
                        out.push(Opcode::insert(snapped, line_value));
                    } else {
                        out.push(Opcode::insert(at.start(), value.clone()));
                    }
                }
            }
            Operation::Change {
                selection,
                replacement,
            } => {
                let value = self.string_expr(replacement)?;
                for result in evaluate_selection(selection, ctx, &self.variables) {
                    let found = result?;
                    out.push(Opcode::replace(found.start(), found.end(), value.clone()));
                }
            }
            Operation::Delete { selection } => {
                for result in evaluate_selection(selection, ctx, &self.variables) {
                    let found = result?;
                    out.push(Opcode::delete(found.start(), found.end()));
                }
            }
            Operation::Indent { selection, amount } => {
                let amount = amount.unwrap_or(DEFAULT_INDENT);
                for result in evaluate_selection(selection, ctx, &self.variables) {
                    let found = result?;
                    for line in found.expand_to_lines().split_lines() {
                        if amount >= 0 {
                            out.push(Opcode::insert(line.start(), " ".repeat(amount as usize)));
                        } else {
                            let bytes = line.bytes(None, None)?;
                            let strip = bytes
                                .iter()
                                .take_while(|b| **b == b' ')
                                .count()
                                .min((-amount) as usize);
                            if strip > 0 {
                                out.push(Opcode::delete(line.start(), line.start() + strip));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Line-mode insert: the point snaps forward to the next line boundary
    /// and the text gains a trailing separator if it lacks one.
    fn snap_line_insert(&self, cursor: &Context, value: &str) -> (usize, String) {
        let line = cursor.expand_to_lines();
        let at = if cursor.start() == line.start() {
            cursor.start()
        } else {
            line.end()
        };
        let separator = String::from_utf8_lossy(&self.line_separator).into_owned();
        let mut value = value.to_string();
        if !value.ends_with(&separator) {
            value.push_str(&separator);
        }
        (at, value)
    }

    fn string_expr(&self, expr: &StringExpr) -> Result<String> {
        match expr {
            StringExpr::Literal(s) => Ok(s.clone()),
            StringExpr::Variable(path) => variable_text(&self.variables, path),
        }
    }

    fn execute_set(&mut self, key: &SetKey, value: &Value) -> Result<()> {
        match key {
            SetKey::Setting(name) => self.apply_setting(name, value),
            SetKey::Variable(path) => {
                let resolved = match value {
                    Value::Str(s) => SessionValue::Text(s.clone()),
                    Value::Int(i) => SessionValue::Int(*i),
                    Value::Symbol(s) => SessionValue::Text(s.clone()),
                    Value::Variable(source) => self
                        .variables
                        .lookup(source)
                        .cloned()
                        .ok_or_else(|| {
                            Error::NotFound(format!("variable {}", format_path(source)))
                        })?,
                };
                self.variables.set(path, resolved)
            }
        }
    }

    fn apply_setting(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "encoding" => {
                let label = self.value_text(value)?;
                self.encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                    Error::Encoding(format!("unknown encoding label `{label}`"))
                })?;
                tracing::debug!("encoding set to {}", self.encoding.name());
                Ok(())
            }
            "linesep" => {
                self.line_separator = match value {
                    Value::Str(s) => s.clone().into_bytes(),
                    Value::Symbol(s) => match s.to_ascii_lowercase().as_str() {
                        "posix" | "unix" | "lf" => b"\n".to_vec(),
                        "windows" | "dos" | "crlf" => b"\r\n".to_vec(),
                        "cr" => b"\r".to_vec(),
                        "lfcr" => b"\n\r".to_vec(),
                        other => {
                            return Err(Error::Parse {
                                message: format!("`{other}` is not valid for linesep"),
                                position: None,
                            })
                        }
                    },
                    _ => {
                        return Err(Error::Parse {
                            message: "linesep takes a string or symbol".into(),
                            position: None,
                        })
                    }
                };
                Ok(())
            }
            "linenumbers" => {
                self.line_numbers = match value {
                    Value::Str(format) => Some(format.clone()),
                    Value::Symbol(s) if s.eq_ignore_ascii_case("on") => Some("{} ".into()),
                    Value::Symbol(s) if s.eq_ignore_ascii_case("off") => None,
                    _ => {
                        return Err(Error::Parse {
                            message: "linenumbers takes on, off or a format string".into(),
                            position: None,
                        })
                    }
                };
                Ok(())
            }
            other => Err(Error::Parse {
                message: format!("unknown setting `{other}`"),
                position: None,
            }),
        }
    }

    fn value_text(&self, value: &Value) -> Result<String> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            Value::Symbol(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Variable(path) => variable_text(&self.variables, path),
        }
    }
}

/// Shell-style glob expansion. A pattern without glob metacharacters is a
/// plain existence check; zero matches is a `NotFound` naming the pattern.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    if !pattern.contains(['*', '?', '[', '{']) {
        let path = PathBuf::from(pattern);
        if path.is_file() {
            return Ok(vec![path]);
        }
        return Err(Error::NotFound(format!("file(s) not found: {pattern}")));
    }

    let matcher = Glob::new(pattern)
        .map_err(|e| Error::Parse {
            message: format!("invalid path pattern: {e}"),
            position: None,
        })?
        .compile_matcher();

    // Walk from the deepest literal directory prefix of the pattern
    let meta = pattern
        .find(['*', '?', '[', '{'])
        .unwrap_or(pattern.len());
    let base = match pattern[..meta].rfind('/') {
        Some(slash) => &pattern[..slash],
        None => ".",
    };

    let mut matches = Vec::new();
    walk_files(Path::new(base), &mut |path| {
        let candidate = path.strip_prefix(".").unwrap_or(path);
        if matcher.is_match(candidate) {
            matches.push(candidate.to_path_buf());
        }
    })?;
    matches.sort();
    if matches.is_empty() {
        return Err(Error::NotFound(format!("file(s) not found: {pattern}")));
    }
    tracing::debug!("pattern {pattern} matched {} files", matches.len());
    Ok(matches)
}

fn walk_files(dir: &Path, visit: &mut impl FnMut(&Path)) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_files(&path, visit)?;
        } else {
            visit(&path);
        }
    }
    Ok(())
}
