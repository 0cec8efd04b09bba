//! Maintenance-outage exclusion windows (spec.md §3, §4.2).

use super::stream::StreamTag;
use super::timestamp::TimestampUs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Approval state of a candidate exclusion window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl fmt::Display for ExclusionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExclusionStatus::PendingApproval => "PENDING_APPROVAL",
            ExclusionStatus::Approved => "APPROVED",
            ExclusionStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// A contiguous interval where two or more mandatory streams were
/// simultaneously in MAJOR_GAP — a likely maintenance outage.
///
/// No back-pointers to rows: rows carry this window's `window_id` string
/// instead (Design Notes §9: "replace with index-based lookup").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionWindow {
    pub window_id: String,
    pub start_us: TimestampUs,
    pub end_us: TimestampUs,
    pub duration_hours: f64,
    pub affecting_streams: BTreeSet<StreamTag>,
    pub status: ExclusionStatus,
}

impl ExclusionWindow {
    #[must_use]
    pub fn contains(&self, timestamp_us: TimestampUs) -> bool {
        timestamp_us >= self.start_us && timestamp_us <= self.end_us
    }

    /// Whether this window should be treated as in effect for Stage 3 row
    /// classification. Per spec.md §4.3 step 1 and the Open Question in
    /// §9, PENDING_APPROVAL is effective by default; REJECTED never is.
    #[must_use]
    pub fn is_effective(&self, treat_pending_as_effective: bool) -> bool {
        match self.status {
            ExclusionStatus::Approved => true,
            ExclusionStatus::PendingApproval => treat_pending_as_effective,
            ExclusionStatus::Rejected => false,
        }
    }
}
