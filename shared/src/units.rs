//! Location <-> segment conversion for a fixed project interval.

use crate::ranges::{self, Range, RangeList};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("segments are 1-indexed; segment 0 has no locations")]
    SegmentZero,
    #[error("segment {segment} overflows location space at interval {interval}")]
    Overflow { segment: u64, interval: u64 },
}

/// Number of locations per segment. Fixed for the lifetime of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interval(NonZeroU64);

impl Interval {
    pub fn new(locations_per_segment: u64) -> Option<Self> {
        NonZeroU64::new(locations_per_segment).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Segment range for a location range.
    ///
    /// A range starting exactly on a segment boundary belongs to the next
    /// segment, unless it spans exactly one interval, in which case it
    /// collapses onto its end segment.
    pub fn locations_to_segments(self, range: Range) -> Range {
        let interval = self.get();
        let mut start = range.start.div_ceil(interval);
        let end = range.end.div_ceil(interval);
        let span = range.end - range.start;

        if start.checked_mul(interval) == Some(range.start) {
            if span == interval {
                start = end;
            } else if span > interval {
                start += 1;
            }
        }

        Range { start, end }
    }

    /// Location range spanned by a segment range: `[(start-1)*interval, end*interval]`.
    pub fn segments_to_locations(self, range: Range) -> Result<Range, ConversionError> {
        if range.start == 0 {
            return Err(ConversionError::SegmentZero);
        }
        let start = self.segment_offset(range.start - 1)?;
        let end = self.segment_offset(range.end)?;
        Ok(Range { start, end })
    }

    fn segment_offset(self, segment: u64) -> Result<u64, ConversionError> {
        segment
            .checked_mul(self.get())
            .ok_or(ConversionError::Overflow {
                segment,
                interval: self.get(),
            })
    }

    pub fn locations_to_segment_list(self, locations: &RangeList) -> RangeList {
        let segments = locations
            .iter()
            .map(|&range| self.locations_to_segments(range))
            .collect();
        ranges::canonicalize(&segments)
    }

    pub fn segments_to_location_list(
        self,
        segments: &RangeList,
    ) -> Result<RangeList, ConversionError> {
        let locations = segments
            .iter()
            .map(|&range| self.segments_to_locations(range))
            .collect::<Result<RangeList, _>>()?;
        Ok(ranges::canonicalize(&locations))
    }

    /// Every segment whose location span touches the inclusive range `[start, end]`.
    pub fn segments_covering(self, range: Range) -> Range {
        let interval = self.get();
        let first = range.start.div_ceil(interval).max(1);
        let last = (range.end / interval).saturating_add(1);
        Range {
            start: first,
            end: last.max(first),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
