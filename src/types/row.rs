//! Stage 3 / Stage 4 row schemas.

use super::gap::RowGapType;
use super::quality::AlignQuality;
use super::sample::Sample;
use super::stream::StreamTag;
use super::timestamp::TimestampUs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One stream's contribution to a synchronized row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamAlignment {
    pub value: Sample,
    pub quality: AlignQuality,
    /// Distance in microseconds from the grid point to the selected raw
    /// sample; absent when quality is MISSING.
    pub distance_us: Option<i64>,
}

impl StreamAlignment {
    #[must_use]
    pub fn missing() -> Self {
        Self {
            value: Sample::absent(),
            quality: AlignQuality::Missing,
            distance_us: None,
        }
    }
}

/// One row of the Stage 3 uniform, gap-annotated master table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRow {
    pub timestamp_us: TimestampUs,
    pub streams: BTreeMap<StreamTag, StreamAlignment>,
    pub gap_type: RowGapType,
    pub confidence: f64,
    pub exclusion_window_id: Option<String>,
}

impl SyncRow {
    #[must_use]
    pub fn stream(&self, tag: StreamTag) -> StreamAlignment {
        self.streams
            .get(&tag)
            .copied()
            .unwrap_or_else(StreamAlignment::missing)
    }
}

/// Hunting (control-loop oscillation) severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HuntSeverity {
    None,
    Minor,
    Major,
}

impl fmt::Display for HuntSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HuntSeverity::None => "NONE",
            HuntSeverity::Minor => "MINOR",
            HuntSeverity::Major => "MAJOR",
        };
        write!(f, "{s}")
    }
}

/// Evaporator/condenser fouling severity (same scale, different thresholds
/// per channel — see spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoulingSeverity {
    Clean,
    MinorFouling,
    MajorFouling,
}

impl fmt::Display for FoulingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FoulingSeverity::Clean => "CLEAN",
            FoulingSeverity::MinorFouling => "MINOR_FOULING",
            FoulingSeverity::MajorFouling => "MAJOR_FOULING",
        };
        write!(f, "{s}")
    }
}

/// A Stage 3 row with the Stage 4 derived fields appended (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    #[serde(flatten)]
    pub sync: SyncRow,
    pub delta_t_chw: Sample,
    pub lift: Sample,
    pub q_evap_kw: Sample,
    pub q_confidence: f64,
    pub cop: Sample,
    pub cop_confidence: f64,
    pub cop_carnot: Sample,
    pub cop_normalized: Sample,
    pub hunt_flag: bool,
    pub hunt_severity: HuntSeverity,
    pub fouling_evap_pct: Sample,
    pub fouling_evap_severity: FoulingSeverity,
    pub fouling_condenser_pct: Sample,
    pub fouling_condenser_severity: FoulingSeverity,
    /// Carried forward from `sync.confidence`; Stage 4 degradations affect
    /// only the pipeline-level roll-up, never this per-row value (spec.md §4.4).
    pub final_row_confidence: f64,
}
