//! Gap classification and semantic enums shared by Stage 2 and Stage 3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an inter-sample interval relative to the grid step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapClass {
    /// `Δt <= 1.5 × grid_step` (endpoints inclusive).
    Normal,
    /// `1.5 × grid_step < Δt <= 4.0 × grid_step`.
    MinorGap,
    /// `Δt > 4.0 × grid_step`.
    MajorGap,
}

impl fmt::Display for GapClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapClass::Normal => "NORMAL",
            GapClass::MinorGap => "MINOR_GAP",
            GapClass::MajorGap => "MAJOR_GAP",
        };
        write!(f, "{s}")
    }
}

/// Semantic explanation attached to a non-NORMAL interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapSemantic {
    /// Change-of-value logging held the setpoint constant across the gap.
    CovConstant,
    /// Slow drift triggered the next COV sample.
    CovMinor,
    /// A jump large enough to suggest a sensor fault or reversal.
    SensorAnomaly,
    /// Not applicable — the interval was NORMAL.
    NotApplicable,
}

impl fmt::Display for GapSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapSemantic::CovConstant => "COV_CONSTANT",
            GapSemantic::CovMinor => "COV_MINOR",
            GapSemantic::SensorAnomaly => "SENSOR_ANOMALY",
            GapSemantic::NotApplicable => "N_A",
        };
        write!(f, "{s}")
    }
}

/// The gap-type classification recorded on a synchronized row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowGapType {
    Valid,
    CovConstant,
    CovMinor,
    SensorAnomaly,
    Excluded,
    Gap,
}

impl fmt::Display for RowGapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowGapType::Valid => "VALID",
            RowGapType::CovConstant => "COV_CONSTANT",
            RowGapType::CovMinor => "COV_MINOR",
            RowGapType::SensorAnomaly => "SENSOR_ANOMALY",
            RowGapType::Excluded => "EXCLUDED",
            RowGapType::Gap => "GAP",
        };
        write!(f, "{s}")
    }
}

impl From<GapSemantic> for RowGapType {
    /// Map a Stage-2 semantic found near a MISSING grid point to the
    /// corresponding Stage-3 row gap type (spec.md §4.3 step 2).
    fn from(semantic: GapSemantic) -> Self {
        match semantic {
            GapSemantic::CovConstant => RowGapType::CovConstant,
            GapSemantic::CovMinor => RowGapType::CovMinor,
            GapSemantic::SensorAnomaly => RowGapType::SensorAnomaly,
            GapSemantic::NotApplicable => RowGapType::Gap,
        }
    }
}
