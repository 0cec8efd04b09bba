//! Raw, unsynchronized per-stream input.

use super::sample::Sample;
use super::stream::StreamTag;
use super::timestamp::TimestampUs;
use serde::{Deserialize, Serialize};

/// A single (timestamp, value) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub timestamp_us: TimestampUs,
    pub value: Sample,
}

impl RawPoint {
    #[must_use]
    pub fn new(timestamp_us: TimestampUs, value: f64) -> Self {
        Self {
            timestamp_us,
            value: Sample::from_raw(value),
        }
    }
}

/// An ordered sequence of measurements for one stream, plus the tag it
/// belongs to. The pipeline sorts this by timestamp before any stage reads
/// it (Stage 2's documented "break duplicate timestamps by input order"
/// rule relies on a stable sort over the as-given order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStream {
    pub tag: StreamTag,
    pub points: Vec<RawPoint>,
}

impl RawStream {
    #[must_use]
    pub fn new(tag: StreamTag, points: Vec<RawPoint>) -> Self {
        Self { tag, points }
    }

    /// Stable-sort by timestamp; ties keep their original relative order
    /// (spec.md §4.2: "break duplicate timestamps by input order").
    pub fn sorted(mut self) -> Self {
        self.points.sort_by_key(|p| p.timestamp_us);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn first_timestamp(&self) -> Option<TimestampUs> {
        self.points.first().map(|p| p.timestamp_us)
    }

    #[must_use]
    pub fn last_timestamp(&self) -> Option<TimestampUs> {
        self.points.last().map(|p| p.timestamp_us)
    }
}
