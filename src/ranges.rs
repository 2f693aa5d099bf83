//! Ordinal/slice algebra over candidate sequences.
//!
//! Directives are external 1-based (negative counts from the end); all
//! internal arithmetic is 0-based. The conversion lives in one place,
//! [`Buffered::resolve`], so FIRST/LAST/NEXT/INDEX/RANGE cannot drift apart
//! in off-by-one behavior. Candidates are pulled from the underlying
//! iterator only as far as a directive actually reaches.

use crate::ast::RangeIndex;
use crate::error::{Error, Result};

/// A candidate sequence materialized on demand from a fallible iterator.
struct Buffered<T, I: Iterator<Item = Result<T>>> {
    iter: I,
    cache: Vec<T>,
    done: bool,
}

impl<T, I: Iterator<Item = Result<T>>> Buffered<T, I> {
    fn new(iter: I) -> Self {
        Buffered {
            iter,
            cache: Vec::new(),
            done: false,
        }
    }

    /// Pull until at least `n` candidates are cached or the source ends.
    fn fill_to(&mut self, n: usize) -> Result<()> {
        while !self.done && self.cache.len() < n {
            match self.iter.next() {
                Some(Ok(item)) => self.cache.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => self.done = true,
            }
        }
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<Option<&T>> {
        self.fill_to(index + 1)?;
        Ok(self.cache.get(index))
    }

    fn force_len(&mut self) -> Result<usize> {
        self.fill_to(usize::MAX)?;
        Ok(self.cache.len())
    }

    /// The single adapter from external 1-based (possibly negative)
    /// ordinals to internal 0-based indices. Index 0 is invalid; negative
    /// ordinals force materialization to count from the end.
    fn resolve(&mut self, ordinal: i64) -> Result<usize> {
        if ordinal == 0 {
            return Err(Error::IndexSemantic(
                "ordinal index 0 is invalid; indices are 1-based".into(),
            ));
        }
        if ordinal > 0 {
            return Ok(ordinal as usize - 1);
        }
        let len = self.force_len()? as i64;
        let index = len + ordinal;
        if index < 0 {
            return Err(Error::Bounds(format!(
                "ordinal {ordinal} reaches before the start of {len} candidates"
            )));
        }
        Ok(index as usize)
    }
}

/// Apply an ordered directive list to a candidate sequence.
///
/// A `prev` cursor (the last 0-based index consumed) threads across
/// directives so relative directives chain: `FIRST 2, NEXT` yields elements
/// 0, 1 and 2. NEXT past the end of the sequence contributes nothing.
pub fn apply_ranges<T, I>(directives: &[RangeIndex], candidates: I) -> Result<Vec<T>>
where
    T: Clone,
    I: Iterator<Item = Result<T>>,
{
    let mut buf = Buffered::new(candidates);
    let mut out = Vec::new();
    let mut prev: i64 = -1;

    for directive in directives {
        match directive {
            RangeIndex::First(n) => {
                let n = n.unwrap_or(1);
                for i in 0..n {
                    match buf.get(i)? {
                        Some(item) => out.push(item.clone()),
                        None => break,
                    }
                }
                prev = n as i64 - 1;
            }
            RangeIndex::Last(n) => {
                let n = n.unwrap_or(1);
                let len = buf.force_len()?;
                for i in len.saturating_sub(n)..len {
                    out.push(buf.cache[i].clone());
                }
                prev = len as i64 - 1;
            }
            RangeIndex::Next(n) => {
                let n = n.unwrap_or(1);
                let start = (prev + 1).max(0) as usize;
                for i in start..start + n {
                    match buf.get(i)? {
                        Some(item) => out.push(item.clone()),
                        None => break,
                    }
                }
                prev += n as i64;
            }
            RangeIndex::Index(ordinal) => {
                let index = buf.resolve(*ordinal)?;
                match buf.get(index)? {
                    Some(item) => out.push(item.clone()),
                    None => {
                        return Err(Error::Bounds(format!(
                            "ordinal {ordinal} outside {} candidates",
                            buf.cache.len()
                        )))
                    }
                }
                prev = index as i64;
            }
            RangeIndex::Range { start, end, step } => {
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Err(Error::IndexSemantic("range step 0 is invalid".into()));
                }
                let first = buf.resolve(*start)?;
                // Inclusive external end; indices past the candidate count
                // clamp by running out of elements
                let last = buf.resolve(*end)?;
                let mut index = first;
                let mut consumed = None;
                while index <= last {
                    match buf.get(index)? {
                        Some(item) => {
                            out.push(item.clone());
                            consumed = Some(index);
                        }
                        None => break,
                    }
                    index += step;
                }
                if let Some(i) = consumed {
                    prev = i as i64;
                }
            }
        }
    }
    Ok(out)
}

/// First element of a possibly-lazy fallible sequence.
pub fn first<T>(mut iter: impl Iterator<Item = Result<T>>) -> Result<Option<T>> {
    iter.next().transpose()
}

/// Last element of a possibly-lazy fallible sequence; forces it.
pub fn last<T>(iter: impl Iterator<Item = Result<T>>) -> Result<Option<T>> {
    let mut result = None;
    for item in iter {
        result = Some(item?);
    }
    Ok(result)
}
