//! Compact range notation used for locations and segments.
//!
//! A selection is written as comma-separated tokens, each either a single
//! index (`"7"`) or an inclusive span (`"3-5"`), e.g. `"1,3-5,10"`. This module
//! converts between that text, [`RangeList`] values and flat index lists, and
//! folds overlapping or touching ranges into canonical form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Errors produced while reading range text. Nothing is ever coerced: a
/// malformed token always fails the whole parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("empty range token at position {index}")]
    EmptyToken { index: usize },
    #[error("'{token}' is not an integer range")]
    InvalidNumber { token: String },
    #[error("'{token}' has more than two bounds")]
    TooManyBounds { token: String },
    #[error("range start {start} is greater than its end {end}")]
    Inverted { start: u64, end: u64 },
}

/// Inclusive `[start, end]` span of locations or segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u64; 2]", into = "[u64; 2]")]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Result<Self, FormatError> {
        if start > end {
            return Err(FormatError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(index: u64) -> Self {
        Self {
            start: index,
            end: index,
        }
    }

    /// A range covering one index only.
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: u64) -> bool {
        self.start <= index && index <= self.end
    }
}

impl TryFrom<[u64; 2]> for Range {
    type Error = FormatError;

    fn try_from([start, end]: [u64; 2]) -> Result<Self, Self::Error> {
        Range::new(start, end)
    }
}

impl From<Range> for [u64; 2] {
    fn from(range: Range) -> Self {
        [range.start, range.end]
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Ordered list of ranges. Lists built by [`canonicalize`] are sorted and
/// never hold two ranges with `end_i + 1 >= start_{i+1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeList(Vec<Range>);

impl RangeList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Range] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Range> {
        self.0
    }

    /// True when the list is already in canonical form.
    pub fn is_canonical(&self) -> bool {
        self.0
            .windows(2)
            .all(|pair| pair[0].end.saturating_add(1) < pair[1].start)
    }
}

impl From<Vec<Range>> for RangeList {
    fn from(ranges: Vec<Range>) -> Self {
        Self(ranges)
    }
}

impl FromIterator<Range> for RangeList {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RangeList {
    type Item = Range;
    type IntoIter = std::vec::IntoIter<Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RangeList {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}

/// Parse range text such as `"1, 3-5,10"`.
///
/// Whitespace anywhere is ignored and empty text yields an empty list.
/// Token order is preserved; call [`canonicalize`] to sort and merge.
pub fn parse(text: &str) -> Result<RangeList, FormatError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Ok(RangeList::new());
    }

    cleaned
        .split(',')
        .enumerate()
        .map(|(index, token)| parse_token(index, token))
        .collect()
}

fn parse_token(index: usize, token: &str) -> Result<Range, FormatError> {
    if token.is_empty() {
        return Err(FormatError::EmptyToken { index });
    }

    match token.split_once('-') {
        None => Ok(Range::single(parse_bound(token, token)?)),
        Some((_, end)) if end.contains('-') => Err(FormatError::TooManyBounds {
            token: token.to_string(),
        }),
        Some((start, end)) => Range::new(parse_bound(token, start)?, parse_bound(token, end)?),
    }
}

fn parse_bound(token: &str, bound: &str) -> Result<u64, FormatError> {
    bound.parse().map_err(|_| FormatError::InvalidNumber {
        token: token.to_string(),
    })
}

/// Render ranges back to text; single-index ranges render as one number.
pub fn format(ranges: &RangeList) -> String {
    ranges
        .iter()
        .map(Range::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Control panel input check: accepts exactly what [`parse`] accepts.
pub fn is_valid_range_text(text: &str) -> bool {
    parse(text).is_ok()
}

/// Every index covered by `ranges`, ascending and de-duplicated.
pub fn expand(ranges: &RangeList) -> Vec<u64> {
    ranges
        .iter()
        .flat_map(|range| range.start..=range.end)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Collapse an ascending index list into runs, e.g. `[1,2,3,7]` -> `1-3,7`.
pub fn compact(values: &[u64]) -> RangeList {
    let mut ranges: Vec<Range> = Vec::new();
    for &value in values {
        match ranges.last_mut() {
            Some(current) if current.end.checked_add(1) == Some(value) => current.end = value,
            Some(current) if current.end == value => {}
            _ => ranges.push(Range::single(value)),
        }
    }
    RangeList(ranges)
}

/// Sort by start (then end) and merge ranges that overlap or touch.
pub fn canonicalize(ranges: &RangeList) -> RangeList {
    let mut sorted = ranges.0.clone();
    sorted.sort_unstable();

    let mut merged: Vec<Range> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    RangeList(merged)
}

/// Split a comma-joined gene list, dropping whitespace and empty names.
pub fn parse_gene_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|name| name.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn format_gene_list<S: AsRef<str>>(genes: &[S]) -> String {
    genes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
