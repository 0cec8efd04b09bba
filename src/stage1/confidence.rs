//! Stage 1 confidence scoring (spec.md §4.1).

use std::collections::BTreeMap;

use crate::types::StreamTag;

const PENALTY_MISSING_OR_INFERRED: f64 = -0.30;
const PENALTY_AMBIGUOUS: f64 = -0.20;
const PENALTY_MANUAL_OVERRIDE: f64 = -0.10;
const AMBIGUOUS_THRESHOLD: f64 = 0.80;

/// `unit_confidence = 1.0 + penalties, clamped to >= 0`.
///
/// A channel whose unit came from a hint is never "missing or inferred";
/// everything else pays that penalty once. Ambiguous detection
/// (`detection_confidence < 0.80`) pays a second, independent penalty.
/// `manual_override` is a caller-asserted third penalty slot, unused by the
/// default detection path (no stage currently sets it).
#[must_use]
pub fn compute_unit_confidence(
    unit_detected: bool,
    detection_confidence: f64,
    was_inferred: bool,
    manual_override: bool,
) -> f64 {
    let mut confidence = 1.0;
    if !unit_detected || was_inferred {
        confidence += PENALTY_MISSING_OR_INFERRED;
    }
    if detection_confidence < AMBIGUOUS_THRESHOLD {
        confidence += PENALTY_AMBIGUOUS;
    }
    if manual_override {
        confidence += PENALTY_MANUAL_OVERRIDE;
    }
    confidence.max(0.0)
}

/// `physics_confidence = max(0, 1.0 - violation_pct/100 * 0.10)`.
#[must_use]
pub fn compute_physics_confidence(violations_pct: f64) -> f64 {
    (1.0 - violations_pct / 100.0 * 0.10).max(0.0)
}

#[must_use]
pub fn compute_channel_confidence(unit_confidence: f64, physics_confidence: f64) -> f64 {
    unit_confidence.min(physics_confidence)
}

/// Overall Stage 1 confidence is the minimum across every channel; an empty
/// map (should never happen once precondition checks run) reports 0.0.
#[must_use]
pub fn compute_stage1_confidence(channel_confidences: &BTreeMap<StreamTag, f64>) -> f64 {
    if channel_confidences.is_empty() {
        return 0.0;
    }
    channel_confidences.values().copied().fold(f64::INFINITY, f64::min)
}

/// Penalty applied to the final roll-up based on overall Stage 1 confidence.
#[must_use]
pub fn compute_stage1_penalty(stage1_confidence: f64) -> f64 {
    if stage1_confidence >= 0.95 {
        0.0
    } else if stage1_confidence >= 0.80 {
        -0.02
    } else {
        -0.05
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hinted_high_confidence_unit_has_no_penalty() {
        let c = compute_unit_confidence(true, 0.95, false, false);
        assert!((c - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inferred_ambiguous_unit_stacks_both_penalties() {
        let c = compute_unit_confidence(true, 0.70, true, false);
        assert!((c - 0.5).abs() < 1e-9);
    }

    #[test]
    fn undetected_unit_pays_missing_penalty() {
        let c = compute_unit_confidence(false, 0.0, true, false);
        assert!((c - 0.5).abs() < 1e-9);
    }

    #[test]
    fn stage1_confidence_is_minimum_across_channels() {
        let mut m = BTreeMap::new();
        m.insert(StreamTag::Chwst, 0.95);
        m.insert(StreamTag::Chwrt, 0.90);
        m.insert(StreamTag::Power, 0.80);
        assert!((compute_stage1_confidence(&m) - 0.80).abs() < 1e-9);
    }

    #[test]
    fn penalty_thresholds_match_spec() {
        assert_eq!(compute_stage1_penalty(1.0), 0.0);
        assert_eq!(compute_stage1_penalty(0.85), -0.02);
        assert_eq!(compute_stage1_penalty(0.75), -0.05);
    }
}
