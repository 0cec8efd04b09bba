//! The `Present(real) | Absent` tagged value used at every stage boundary.
//!
//! Design Notes (spec.md §9): dynamic typing of the "value" field is replaced
//! with an explicit tagged variant; NaN arriving from an upstream source must
//! be converted to `Sample::absent()` at the construction boundary, never
//! propagated as a sentinel.

use serde::{Deserialize, Serialize};

/// A measured value that may be present (a finite real) or absent.
///
/// All arithmetic on `Sample` short-circuits to `Absent` if any operand is
/// absent — see [`Sample::map`] and [`Sample::zip_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(Option<f64>);

impl Sample {
    pub const ABSENT: Sample = Sample(None);

    /// Build a present sample. A non-finite input (NaN, ±inf) becomes
    /// `Absent` rather than propagating — see Design Notes §9.
    #[must_use]
    pub fn present(value: f64) -> Self {
        if value.is_finite() {
            Sample(Some(value))
        } else {
            Sample(None)
        }
    }

    /// Alias for [`Sample::present`], used at raw I/O boundaries where a
    /// caller hands over a bare `f64` that might be NaN.
    #[must_use]
    pub fn from_raw(value: f64) -> Self {
        Self::present(value)
    }

    #[must_use]
    pub fn absent() -> Self {
        Sample(None)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.0
    }

    /// Apply `f` if present, otherwise stay `Absent`.
    #[must_use]
    pub fn map<F: FnOnce(f64) -> f64>(self, f: F) -> Sample {
        match self.0 {
            Some(v) => Sample::present(f(v)),
            None => Sample::absent(),
        }
    }

    /// Combine two samples; `Absent` if either operand is `Absent`.
    #[must_use]
    pub fn zip_with<F: FnOnce(f64, f64) -> f64>(self, other: Sample, f: F) -> Sample {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Sample::present(f(a, b)),
            _ => Sample::absent(),
        }
    }

    /// Keep the value only if `predicate` holds; `Absent` otherwise.
    #[must_use]
    pub fn filter<F: FnOnce(f64) -> bool>(self, predicate: F) -> Sample {
        match self.0 {
            Some(v) if predicate(v) => Sample::present(v),
            _ => Sample::absent(),
        }
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => Sample::present(v),
            None => Sample::absent(),
        }
    }
}

impl From<Sample> for Option<f64> {
    fn from(value: Sample) -> Self {
        value.0
    }
}
