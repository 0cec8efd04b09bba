//! Per-row physical-range and cross-channel relationship checks.

use crate::config::PhysicsConfig;
use crate::types::{Sample, TimestampUs};

/// Result of range-checking one channel's canonical values.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeViolation {
    pub violations_count: usize,
    pub total_count: usize,
    pub violations_pct: f64,
}

impl RangeViolation {
    #[must_use]
    pub fn none(total_count: usize) -> Self {
        Self {
            violations_count: 0,
            total_count,
            violations_pct: 0.0,
        }
    }
}

/// Count samples outside `[lo, hi]`, ignoring absent samples.
#[must_use]
pub fn validate_range(values: &[Sample], lo: f64, hi: f64) -> RangeViolation {
    let present: Vec<f64> = values.iter().filter_map(Sample::value).collect();
    let total_count = present.len();
    if total_count == 0 {
        return RangeViolation::none(0);
    }
    let violations_count = present.iter().filter(|v| **v < lo || **v > hi).count();
    RangeViolation {
        violations_count,
        total_count,
        violations_pct: violations_count as f64 / total_count as f64 * 100.0,
    }
}

/// Count samples strictly below zero, ignoring absent samples.
#[must_use]
pub fn validate_non_negative(values: &[Sample]) -> RangeViolation {
    validate_range(values, 0.0, f64::INFINITY)
}

/// One (timestamp, chwst, chwrt, cdwrt) triple present in all three streams
/// at an identical timestamp — the "joined samples" the relationship
/// checks operate on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinedTemps {
    pub timestamp_us: TimestampUs,
    pub chwst: f64,
    pub chwrt: f64,
    pub cdwrt: f64,
}

/// Inner-join three canonical (timestamp, Sample) streams on identical
/// timestamps where all three are present. Streams must already be sorted
/// by timestamp.
#[must_use]
pub fn join_on_timestamp(
    chwst: &[(TimestampUs, Sample)],
    chwrt: &[(TimestampUs, Sample)],
    cdwrt: &[(TimestampUs, Sample)],
) -> Vec<JoinedTemps> {
    use std::collections::BTreeMap;

    let chwrt_map: BTreeMap<TimestampUs, f64> = chwrt
        .iter()
        .filter_map(|(t, v)| v.value().map(|x| (*t, x)))
        .collect();
    let cdwrt_map: BTreeMap<TimestampUs, f64> = cdwrt
        .iter()
        .filter_map(|(t, v)| v.value().map(|x| (*t, x)))
        .collect();

    chwst
        .iter()
        .filter_map(|(t, v)| {
            let chwst_val = v.value()?;
            let chwrt_val = *chwrt_map.get(t)?;
            let cdwrt_val = *cdwrt_map.get(t)?;
            Some(JoinedTemps {
                timestamp_us: *t,
                chwst: chwst_val,
                chwrt: chwrt_val,
                cdwrt: cdwrt_val,
            })
        })
        .collect()
}

/// Result of the two relationship checks over the joined sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationshipViolations {
    pub chwrt_lt_chwst_count: usize,
    pub chwrt_lt_chwst_pct: f64,
    pub cdwrt_lte_chwst_count: usize,
    pub cdwrt_lte_chwst_pct: f64,
    pub total_joined: usize,
}

#[must_use]
pub fn validate_relationships(joined: &[JoinedTemps]) -> RelationshipViolations {
    let total = joined.len();
    if total == 0 {
        return RelationshipViolations {
            chwrt_lt_chwst_count: 0,
            chwrt_lt_chwst_pct: 0.0,
            cdwrt_lte_chwst_count: 0,
            cdwrt_lte_chwst_pct: 0.0,
            total_joined: 0,
        };
    }
    let chwrt_lt_chwst_count = joined.iter().filter(|j| j.chwrt < j.chwst).count();
    let cdwrt_lte_chwst_count = joined.iter().filter(|j| j.cdwrt <= j.chwst).count();
    RelationshipViolations {
        chwrt_lt_chwst_count,
        chwrt_lt_chwst_pct: chwrt_lt_chwst_count as f64 / total as f64 * 100.0,
        cdwrt_lte_chwst_count,
        cdwrt_lte_chwst_pct: cdwrt_lte_chwst_count as f64 / total as f64 * 100.0,
        total_joined: total,
    }
}

#[must_use]
pub fn chwst_range(cfg: &PhysicsConfig) -> (f64, f64) {
    cfg.chwst_range_c
}

#[must_use]
pub fn chwrt_range(cfg: &PhysicsConfig) -> (f64, f64) {
    cfg.chwrt_range_c
}

#[must_use]
pub fn cdwrt_range(cfg: &PhysicsConfig) -> (f64, f64) {
    cfg.cdwrt_range_c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_violation_ignores_absent() {
        let values = vec![Sample::present(10.0), Sample::absent(), Sample::present(100.0)];
        let v = validate_range(&values, 0.0, 20.0);
        assert_eq!(v.total_count, 2);
        assert_eq!(v.violations_count, 1);
        assert!((v.violations_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn join_drops_rows_missing_any_stream() {
        let chwst = vec![(0i64, Sample::present(7.0)), (900, Sample::present(7.0))];
        let chwrt = vec![(0i64, Sample::present(12.0))];
        let cdwrt = vec![(0i64, Sample::present(28.0)), (900, Sample::present(28.0))];
        let joined = join_on_timestamp(&chwst, &chwrt, &cdwrt);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].timestamp_us, 0);
    }

    #[test]
    fn relationship_violation_detects_reversed_delta() {
        let joined = vec![
            JoinedTemps { timestamp_us: 0, chwst: 10.0, chwrt: 8.0, cdwrt: 20.0 },
            JoinedTemps { timestamp_us: 900, chwst: 7.0, chwrt: 12.0, cdwrt: 28.0 },
        ];
        let v = validate_relationships(&joined);
        assert_eq!(v.chwrt_lt_chwst_count, 1);
        assert!((v.chwrt_lt_chwst_pct - 50.0).abs() < 1e-9);
    }
}
