//! Per-sample alignment quality (Stage 3).

use serde::{Deserialize, Serialize};
use std::fmt;

/// How closely a grid point's selected raw sample matches the grid
/// timestamp. Ordered loosely best-to-worst for convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignQuality {
    /// Distance < exact threshold (default 60s).
    Exact,
    /// Distance < close threshold (default 300s).
    Close,
    /// Distance <= interp ceiling (default 1800s, inclusive per spec.md §9).
    Interp,
    /// No raw sample within tolerance.
    Missing,
}

impl AlignQuality {
    /// Confidence contribution per spec.md §4.3 step 3: EXACT 0.95,
    /// CLOSE 0.90, INTERP 0.85, MISSING 0.0.
    #[must_use]
    pub fn confidence(self) -> f64 {
        match self {
            AlignQuality::Exact => 0.95,
            AlignQuality::Close => 0.90,
            AlignQuality::Interp => 0.85,
            AlignQuality::Missing => 0.0,
        }
    }
}

impl fmt::Display for AlignQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlignQuality::Exact => "EXACT",
            AlignQuality::Close => "CLOSE",
            AlignQuality::Interp => "INTERP",
            AlignQuality::Missing => "MISSING",
        };
        write!(f, "{s}")
    }
}
