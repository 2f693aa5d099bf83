//! Recursive evaluation of selector nodes against a context.
//!
//! Each node evaluates to a lazy sequence of result Contexts. Laziness is
//! the default; operators that must see the whole candidate set (LAST,
//! open-ended spans, block endpoints, ordinal directives) force exactly the
//! candidates they need. Failures inside a chain surface as `Err` items in
//! the yielded sequence.

use crate::ast::{Cursor, FindMode, MatchTarget, RangeIndex, Selection, Selector};
use crate::context::{compile_regex, Context};
use crate::error::{Error, Result};
use crate::ranges::{apply_ranges, first, last};
use crate::vars::{variable_text, VariableStore};
use regex::bytes::Regex;
use std::iter;

/// A lazy stream of evaluation results.
pub type ContextIter<'a> = Box<dyn Iterator<Item = Result<Context>> + 'a>;

/// Evaluate either selector family.
pub fn evaluate_selector<'a>(
    node: &'a Selector,
    ctx: &Context,
    vars: &'a VariableStore,
) -> ContextIter<'a> {
    match node {
        Selector::Cursor(cursor) => evaluate_cursor(cursor, ctx, vars),
        Selector::Selection(selection) => evaluate_selection(selection, ctx, vars),
    }
}

pub fn evaluate_cursor<'a>(
    node: &'a Cursor,
    ctx: &Context,
    vars: &'a VariableStore,
) -> ContextIter<'a> {
    match node {
        Cursor::Start => one(ctx.sub(0, 0)),
        Cursor::End => one(ctx.sub(ctx.len(), ctx.len())),
        Cursor::After { offset, target } => {
            let n = offset.unwrap_or(1);
            let base = ctx.clone();
            flat_map_ok(evaluate_selector(target, ctx, vars), move |found| {
                let pos = found.end() as i64 - base.start() as i64 + n;
                one(cursor_at(&base, pos))
            })
        }
        Cursor::Before { offset, target } => {
            let n = offset.unwrap_or(1);
            let base = ctx.clone();
            flat_map_ok(evaluate_selector(target, ctx, vars), move |found| {
                let pos = found.start() as i64 - base.start() as i64 - n;
                one(cursor_at(&base, pos))
            })
        }
        Cursor::Of { inner, outer } => flat_map_ok(
            evaluate_selection(outer, ctx, vars),
            move |outer_result| evaluate_cursor(inner, &outer_result, vars),
        ),
        Cursor::Ranged { ranges, inner } => {
            ranged(ranges, evaluate_cursor(inner, ctx, vars))
        }
    }
}

pub fn evaluate_selection<'a>(
    node: &'a Selection,
    ctx: &Context,
    vars: &'a VariableStore,
) -> ContextIter<'a> {
    match node {
        Selection::Lines { ranges } => {
            let lines = ctx.expand_to_lines().split_lines().map(Ok);
            ranged(ranges, Box::new(lines))
        }
        Selection::LineOfCursor(cursor) => flat_map_ok(
            evaluate_cursor(cursor, ctx, vars),
            move |c| one(Ok(c.expand_to_lines())),
        ),
        Selection::LinesOf(inner) => flat_map_ok(
            evaluate_selection(inner, ctx, vars),
            move |r| Box::new(r.expand_to_lines().split_lines().map(Ok)) as ContextIter<'a>,
        ),
        Selection::Find { target, mode } => find_stream(target, *mode, ctx, vars),
        Selection::AfterAll(target) => match last(evaluate_selector(target, ctx, vars)) {
            Err(e) => one(Err(e)),
            // An empty inner selector contributes nothing
            Ok(None) => empty(),
            Ok(Some(found)) => one(span_abs(ctx, found.end(), ctx.end())),
        },
        Selection::BeforeAll(target) => match first(evaluate_selector(target, ctx, vars)) {
            Err(e) => one(Err(e)),
            Ok(None) => empty(),
            Ok(Some(found)) => one(span_abs(ctx, ctx.start(), found.start())),
        },
        Selection::Block { start, end } => endpoints(ctx, start, end, vars, true),
        Selection::Between { start, end } => endpoints(ctx, start, end, vars, false),
        Selection::Of { inner, outer } => flat_map_ok(
            evaluate_selection(outer, ctx, vars),
            move |outer_result| evaluate_selection(inner, &outer_result, vars),
        ),
        Selection::Ranged { ranges, inner } => {
            ranged(ranges, evaluate_selection(inner, ctx, vars))
        }
        Selection::File => one(Ok(ctx.file())),
    }
}

fn one(result: Result<Context>) -> ContextIter<'static> {
    Box::new(iter::once(result))
}

fn empty<'a>() -> ContextIter<'a> {
    Box::new(iter::empty())
}

fn flat_map_ok<'a, F>(input: ContextIter<'a>, mut f: F) -> ContextIter<'a>
where
    F: FnMut(Context) -> ContextIter<'a> + 'a,
{
    Box::new(input.flat_map(move |item| match item {
        Ok(ctx) => f(ctx),
        Err(e) => one(Err(e)),
    }))
}

fn ranged<'a>(ranges: &[RangeIndex], candidates: ContextIter<'a>) -> ContextIter<'a> {
    match apply_ranges(ranges, candidates) {
        Ok(selected) => Box::new(selected.into_iter().map(Ok)),
        Err(e) => one(Err(e)),
    }
}

/// Zero-width context at a position relative to `ctx` start.
fn cursor_at(ctx: &Context, pos: i64) -> Result<Context> {
    if pos < 0 || pos as usize > ctx.len() {
        return Err(Error::Bounds(format!(
            "cursor position {pos} outside context of {} bytes",
            ctx.len()
        )));
    }
    ctx.sub(pos as usize, pos as usize)
}

/// Sub-context of `ctx` given absolute byte offsets.
fn span_abs(ctx: &Context, abs_start: usize, abs_end: usize) -> Result<Context> {
    let rel_start = abs_start.checked_sub(ctx.start()).ok_or_else(|| {
        Error::Bounds(format!(
            "offset {abs_start} reaches before the context start {}",
            ctx.start()
        ))
    })?;
    ctx.sub(rel_start, abs_end - ctx.start())
}

/// FROM..TO (inclusive) and BETWEEN..AND (exclusive): first match of the
/// start side, last match of the end side; nothing unless the end lies at
/// or beyond the start.
fn endpoints<'a>(
    ctx: &Context,
    start: &'a Selector,
    end: &'a Selector,
    vars: &'a VariableStore,
    inclusive: bool,
) -> ContextIter<'a> {
    let start_match = match first(evaluate_selector(start, ctx, vars)) {
        Err(e) => return one(Err(e)),
        Ok(v) => v,
    };
    let end_match = match last(evaluate_selector(end, ctx, vars)) {
        Err(e) => return one(Err(e)),
        Ok(v) => v,
    };
    match (start_match, end_match) {
        (Some(s), Some(e)) if s.end() <= e.start() => {
            if inclusive {
                one(span_abs(ctx, s.start(), e.end()))
            } else {
                one(span_abs(ctx, s.end(), e.start()))
            }
        }
        _ => empty(),
    }
}

/// What a FIND matches with, once its target is resolved.
enum FindSpec {
    Needles(Vec<Vec<u8>>),
    Pattern(Regex),
}

fn find_stream<'a>(
    target: &'a MatchTarget,
    mode: FindMode,
    ctx: &Context,
    vars: &'a VariableStore,
) -> ContextIter<'a> {
    let spec = match build_find_spec(target, mode, ctx, vars) {
        Ok(spec) => spec,
        Err(e) => return one(Err(e)),
    };
    match mode {
        FindMode::Plain => plain_stream(ctx, spec),
        FindMode::LineWith => dedupe_line_spans(plain_stream(ctx, spec)),
        FindMode::WholeLine => whole_line_stream(ctx, spec),
    }
}

fn build_find_spec(
    target: &MatchTarget,
    mode: FindMode,
    ctx: &Context,
    vars: &VariableStore,
) -> Result<FindSpec> {
    match target {
        MatchTarget::Literal(text) => Ok(FindSpec::Needles(vec![encode_text(ctx, text)])),
        MatchTarget::Regex { pattern, flags } => {
            // Whole-line matching anchors the pattern to the line content
            let pattern = if mode == FindMode::WholeLine {
                format!("\\A(?:{pattern})\\z")
            } else {
                pattern.clone()
            };
            Ok(FindSpec::Pattern(compile_regex(&pattern, flags)?))
        }
        MatchTarget::Variable(path) => {
            let text = variable_text(vars, path)?;
            Ok(FindSpec::Needles(vec![encode_text(ctx, &text)]))
        }
        MatchTarget::Selection(selection) => {
            let mut needles = Vec::new();
            for result in evaluate_selection(selection, ctx, vars) {
                let found = result?;
                needles.push(found.bytes(None, None)?.to_vec());
            }
            Ok(FindSpec::Needles(needles))
        }
    }
}

fn encode_text(ctx: &Context, text: &str) -> Vec<u8> {
    ctx.encoding().encode(text).0.into_owned()
}

fn plain_stream(ctx: &Context, spec: FindSpec) -> ContextIter<'static> {
    match spec {
        FindSpec::Needles(needles) => {
            let ctx = ctx.clone();
            Box::new(
                needles
                    .into_iter()
                    .flat_map(move |needle| ctx.find_all(&needle))
                    .map(Ok),
            )
        }
        FindSpec::Pattern(re) => Box::new(ctx.find_all_compiled(re).map(Ok)),
    }
}

/// Map matches to their enclosing lines, dropping consecutive duplicates
/// (two matches in one line select that line once).
fn dedupe_line_spans(input: ContextIter<'_>) -> ContextIter<'_> {
    let mut last_span: Option<(usize, usize)> = None;
    Box::new(
        input
            .map(|result| result.map(|c| c.expand_to_lines()))
            .filter(move |result| match result {
                Ok(line) => {
                    let span = (line.start(), line.end());
                    if last_span == Some(span) {
                        false
                    } else {
                        last_span = Some(span);
                        true
                    }
                }
                Err(_) => true,
            }),
    )
}

/// Lines whose whole content (separator excluded) matches the spec.
fn whole_line_stream(ctx: &Context, spec: FindSpec) -> ContextIter<'static> {
    let separator = ctx.line_separator().to_vec();
    Box::new(
        ctx.expand_to_lines()
            .split_lines()
            .filter(move |line| {
                let Ok(bytes) = line.bytes(None, None) else {
                    return false;
                };
                let content = bytes.strip_suffix(separator.as_slice()).unwrap_or(bytes);
                match &spec {
                    FindSpec::Needles(needles) => {
                        needles.iter().any(|needle| needle.as_slice() == content)
                    }
                    FindSpec::Pattern(re) => re.is_match(content),
                }
            })
            .map(Ok),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RangeIndex::{First, Index, Last, Next, Range};
    use crate::ast::VarKey;
    use crate::vars::SessionValue;

    const TEXT: &str = "alpha\nbravo\ncharlie\ndelta\nepsilon\n";

    fn ctx() -> Context {
        Context::from_text(TEXT)
    }

    fn eval_sel(node: &Selection, ctx: &Context) -> Vec<Context> {
        let vars = VariableStore::new();
        evaluate_selection(node, ctx, &vars)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn texts(node: &Selection, ctx: &Context) -> Vec<String> {
        eval_sel(node, ctx)
            .iter()
            .map(|c| c.text().unwrap())
            .collect()
    }

    fn lines(ranges: Vec<RangeIndex>) -> Selection {
        Selection::Lines { ranges }
    }

    fn find(text: &str) -> Selection {
        Selection::Find {
            target: MatchTarget::Literal(text.into()),
            mode: FindMode::Plain,
        }
    }

    #[test]
    fn start_and_end_cursors() {
        let ctx = ctx();
        let vars = VariableStore::new();
        let start: Vec<_> = evaluate_cursor(&Cursor::Start, &ctx, &vars)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(start.len(), 1);
        assert!(start[0].is_cursor());
        assert_eq!(start[0].start(), 0);

        let end: Vec<_> = evaluate_cursor(&Cursor::End, &ctx, &vars)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(end[0].start(), TEXT.len());
    }

    #[test]
    fn after_cursor_default_offset() {
        // Documented decision: the relative offset defaults to 1
        let ctx = ctx();
        let vars = VariableStore::new();
        let node = Cursor::After {
            offset: None,
            target: Box::new(Selector::Selection(find("bravo"))),
        };
        let result: Vec<_> = evaluate_cursor(&node, &ctx, &vars)
            .collect::<Result<_>>()
            .unwrap();
        // "bravo" spans 6..11; the cursor lands one byte past its end
        assert_eq!(result[0].start(), 12);
    }

    #[test]
    fn before_cursor_subtracts_the_offset() {
        let ctx = ctx();
        let vars = VariableStore::new();
        let node = Cursor::Before {
            offset: Some(2),
            target: Box::new(Selector::Selection(find("bravo"))),
        };
        let result: Vec<_> = evaluate_cursor(&node, &ctx, &vars)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(result[0].start(), 4);
    }

    #[test]
    fn relative_cursor_out_of_bounds_is_an_error() {
        let ctx = ctx();
        let vars = VariableStore::new();
        let node = Cursor::Before {
            offset: Some(1),
            target: Box::new(Selector::Cursor(Cursor::Start)),
        };
        let results: Vec<_> = evaluate_cursor(&node, &ctx, &vars).collect();
        assert!(matches!(results[0], Err(Error::Bounds(_))));
    }

    #[test]
    fn direct_line_by_index() {
        assert_eq!(texts(&lines(vec![Index(2)]), &ctx()), vec!["bravo\n"]);
        assert_eq!(texts(&lines(vec![Index(-1)]), &ctx()), vec!["epsilon\n"]);
    }

    #[test]
    fn direct_line_first_and_last() {
        assert_eq!(
            texts(&lines(vec![First(Some(3))]), &ctx()),
            vec!["alpha\n", "bravo\n", "charlie\n"]
        );
        assert_eq!(
            texts(&lines(vec![Last(Some(2))]), &ctx()),
            vec!["delta\n", "epsilon\n"]
        );
    }

    #[test]
    fn direct_line_index_then_next() {
        assert_eq!(
            texts(&lines(vec![Index(3), Next(None)]), &ctx()),
            vec!["charlie\n", "delta\n"]
        );
    }

    #[test]
    fn direct_line_inclusive_range() {
        assert_eq!(
            texts(
                &lines(vec![Range {
                    start: 2,
                    end: 4,
                    step: None
                }]),
                &ctx()
            ),
            vec!["bravo\n", "charlie\n", "delta\n"]
        );
    }

    #[test]
    fn lines_of_a_selection() {
        let node = Selection::LinesOf(Box::new(Selection::File));
        assert_eq!(eval_sel(&node, &ctx()).len(), 5);
    }

    #[test]
    fn line_of_cursor() {
        let node = Selection::LineOfCursor(Box::new(Cursor::Start));
        assert_eq!(texts(&node, &ctx()), vec!["alpha\n"]);
    }

    #[test]
    fn before_selection_spans_from_context_start() {
        let node = Selection::BeforeAll(Box::new(Selector::Selection(lines(vec![Index(4)]))));
        assert_eq!(texts(&node, &ctx()), vec!["alpha\nbravo\ncharlie\n"]);
    }

    #[test]
    fn after_selection_spans_to_context_end() {
        let node = Selection::AfterAll(Box::new(Selector::Selection(lines(vec![Index(4)]))));
        assert_eq!(texts(&node, &ctx()), vec!["epsilon\n"]);
    }

    #[test]
    fn open_ended_span_skips_silently_when_inner_is_empty() {
        let node = Selection::AfterAll(Box::new(Selector::Selection(find("zulu"))));
        assert!(eval_sel(&node, &ctx()).is_empty());
    }

    #[test]
    fn block_is_inclusive() {
        let node = Selection::Block {
            start: Box::new(Selector::Selection(lines(vec![Index(2)]))),
            end: Box::new(Selector::Selection(lines(vec![Index(4)]))),
        };
        assert_eq!(texts(&node, &ctx()), vec!["bravo\ncharlie\ndelta\n"]);
    }

    #[test]
    fn between_is_exclusive() {
        let node = Selection::Between {
            start: Box::new(Selector::Selection(lines(vec![Index(2)]))),
            end: Box::new(Selector::Selection(lines(vec![Index(4)]))),
        };
        assert_eq!(texts(&node, &ctx()), vec!["charlie\n"]);
    }

    #[test]
    fn reversed_block_yields_nothing() {
        let node = Selection::Block {
            start: Box::new(Selector::Selection(lines(vec![Index(4)]))),
            end: Box::new(Selector::Selection(lines(vec![Index(2)]))),
        };
        assert!(eval_sel(&node, &ctx()).is_empty());
    }

    #[test]
    fn sub_selection_searches_within_each_outer_result() {
        let node = Selection::Of {
            inner: Box::new(find("e")),
            outer: Box::new(lines(vec![Index(4)])),
        };
        let results = eval_sel(&node, &ctx());
        // "delta\n" holds exactly one "e"
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start(), TEXT.find("delta").unwrap() + 1);
    }

    #[test]
    fn ranged_selection_filters_matches() {
        let node = Selection::Ranged {
            ranges: vec![Range {
                start: 2,
                end: 3,
                step: None,
            }],
            inner: Box::new(Selection::LinesOf(Box::new(Selection::File))),
        };
        assert_eq!(texts(&node, &ctx()), vec!["bravo\n", "charlie\n"]);
    }

    #[test]
    fn find_literal_yields_every_occurrence() {
        let ctx = Context::from_text("one two one two one");
        assert_eq!(eval_sel(&find("one"), &ctx).len(), 3);
    }

    #[test]
    fn find_regex_with_flags() {
        let ctx = Context::from_text("Alpha ALPHA alpha");
        let node = Selection::Find {
            target: MatchTarget::Regex {
                pattern: "alpha".into(),
                flags: "i".into(),
            },
            mode: FindMode::Plain,
        };
        assert_eq!(eval_sel(&node, &ctx).len(), 3);
    }

    #[test]
    fn find_line_with_selects_enclosing_lines_once() {
        let ctx = Context::from_text("aa bb aa\ncc\naa\n");
        let node = Selection::Find {
            target: MatchTarget::Literal("aa".into()),
            mode: FindMode::LineWith,
        };
        assert_eq!(texts(&node, &ctx), vec!["aa bb aa\n", "aa\n"]);
    }

    #[test]
    fn find_whole_line_matches_content_exactly() {
        let node = Selection::Find {
            target: MatchTarget::Literal("bravo".into()),
            mode: FindMode::WholeLine,
        };
        assert_eq!(texts(&node, &ctx()), vec!["bravo\n"]);

        // A partial line does not match
        let partial = Selection::Find {
            target: MatchTarget::Literal("brav".into()),
            mode: FindMode::WholeLine,
        };
        assert!(eval_sel(&partial, &ctx()).is_empty());
    }

    #[test]
    fn find_whole_line_with_regex_is_anchored() {
        let node = Selection::Find {
            target: MatchTarget::Regex {
                pattern: "[a-z]{5}".into(),
                flags: String::new(),
            },
            mode: FindMode::WholeLine,
        };
        // Only the five-letter lines match in full
        assert_eq!(texts(&node, &ctx()), vec!["alpha\n", "bravo\n", "delta\n"]);
    }

    #[test]
    fn find_bound_variable() {
        let ctx = ctx();
        let mut vars = VariableStore::new();
        vars.set_key(
            &VarKey::Named("needle".into()),
            SessionValue::Text("bravo".into()),
        );
        let node = Selection::Find {
            target: MatchTarget::Variable(vec![VarKey::Named("needle".into())]),
            mode: FindMode::Plain,
        };
        let results: Vec<_> = evaluate_selection(&node, &ctx, &vars)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start(), 6);
    }

    #[test]
    fn find_unbound_variable_is_not_found() {
        let ctx = ctx();
        let vars = VariableStore::new();
        let node = Selection::Find {
            target: MatchTarget::Variable(vec![VarKey::Named("ghost".into())]),
            mode: FindMode::Plain,
        };
        let results: Vec<_> = evaluate_selection(&node, &ctx, &vars).collect();
        assert!(matches!(results[0], Err(Error::NotFound(_))));
    }

    #[test]
    fn find_selection_target_matches_its_text_elsewhere() {
        let ctx = Context::from_text("key\nvalue\nkey\n");
        let node = Selection::Find {
            target: MatchTarget::Selection(Box::new(lines(vec![Index(1)]))),
            mode: FindMode::Plain,
        };
        // Line 1 is "key\n"; it recurs once more
        assert_eq!(eval_sel(&node, &ctx).len(), 2);
    }

    #[test]
    fn file_selection_escapes_sub_context() {
        let full = ctx();
        let inner = full.sub(6, 7).unwrap();
        let results = eval_sel(&Selection::File, &inner);
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].start(), results[0].end()), (0, TEXT.len()));
    }

    #[test]
    fn cursor_of_selection_addresses_within_it() {
        let ctx = ctx();
        let vars = VariableStore::new();
        let node = Cursor::Of {
            inner: Box::new(Cursor::Start),
            outer: Box::new(lines(vec![Index(2)])),
        };
        let results: Vec<_> = evaluate_cursor(&node, &ctx, &vars)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start(), 6);
    }

    #[test]
    fn ranged_cursor_picks_among_matches() {
        let ctx = Context::from_text("x.x.x.");
        let vars = VariableStore::new();
        let node = Cursor::Ranged {
            ranges: vec![Index(2)],
            inner: Box::new(Cursor::After {
                offset: None,
                target: Box::new(Selector::Selection(find("x"))),
            }),
        };
        let results: Vec<_> = evaluate_cursor(&node, &ctx, &vars)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start(), 4);
    }
}
