//! The top-level orchestrator: wires Stage 1 → 2 → 3 → 4 and produces the
//! final confidence roll-up (spec.md §2, §4.4).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{error, info};

use crate::config::HtdamConfig;
use crate::errors::{HtdamError, PreconditionError};
use crate::sink::MetricsSink;
use crate::stage1::{self, Stage1Metrics};
use crate::stage2::{self, Stage2Metrics};
use crate::stage3::{self, Stage3Metrics};
use crate::stage4::{self, Stage4Metrics};
use crate::types::{DerivedRow, ExclusionWindow, RawStream, StreamTag};

/// Everything the pipeline needs beyond configuration: the raw per-stream
/// series and the optional hints/overrides an external collaborator may
/// supply (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub streams: BTreeMap<StreamTag, RawStream>,
    pub unit_hints: BTreeMap<StreamTag, String>,
    pub salvage_enabled: bool,
    pub approved_exclusion_windows: Option<Vec<ExclusionWindow>>,
    pub external_baseline_ufoa: Option<f64>,
    pub external_baseline_lift: Option<f64>,
}

/// Final quality classification of the pipeline run (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityTier {
    TierA,
    TierB,
    TierC,
    TierD,
    TierF,
}

impl QualityTier {
    #[must_use]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.90 {
            QualityTier::TierA
        } else if confidence >= 0.80 {
            QualityTier::TierB
        } else if confidence >= 0.70 {
            QualityTier::TierC
        } else if confidence >= 0.60 {
            QualityTier::TierD
        } else {
            QualityTier::TierF
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityTier::TierA => "TIER_A",
            QualityTier::TierB => "TIER_B",
            QualityTier::TierC => "TIER_C",
            QualityTier::TierD => "TIER_D",
            QualityTier::TierF => "TIER_F",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub rows: Vec<DerivedRow>,
    pub stage1_metrics: Stage1Metrics,
    pub stage2_metrics: Stage2Metrics,
    pub stage3_metrics: Stage3Metrics,
    pub stage4_metrics: Stage4Metrics,
    pub final_confidence: f64,
    pub quality_tier: QualityTier,
}

impl PipelineOutput {
    /// Render the row table and the four stage metrics reports as a single
    /// JSON document, the structured quality report callers persist
    /// alongside the row table itself.
    ///
    /// # Errors
    ///
    /// Returns an error only if a field somehow fails to serialize; every
    /// field on this type derives `Serialize` from primitives, so this
    /// should never occur in practice.
    pub fn to_json_report(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn weighted_rollup(stage1: f64, stage2: f64, stage3: f64, stage4: f64, weights: [f64; 4]) -> f64 {
    (stage1 * weights[0] + stage2 * weights[1] + stage3 * weights[2] + stage4 * weights[3]).clamp(0.0, 1.0)
}

/// Run the full four-stage pipeline. Returns `Err` on a configuration
/// error, a missing-precondition error, or a mid-stage HALT; a successful
/// `Ok` always carries a complete row table and metrics for all four
/// stages.
pub fn run_pipeline(
    input: PipelineInput,
    config: &HtdamConfig,
    sink: &mut dyn MetricsSink,
) -> Result<PipelineOutput, HtdamError> {
    config.validate()?;

    for mandatory in StreamTag::MANDATORY {
        if input.streams.get(&mandatory).map_or(true, RawStream::is_empty) {
            return Err(HtdamError::Precondition(PreconditionError::MissingMandatoryStream(mandatory)));
        }
    }

    info!("starting HTDAM pipeline run");

    let stage1 = stage1::run_stage1(&input.streams, &input.unit_hints, input.salvage_enabled, config, sink);
    if stage1.metrics.halt {
        let reasons = &stage1.metrics.halt_reasons;
        error!(?reasons, "stage 1 halted");
        return Err(HtdamError::Halted(
            stage1.metrics.halt_reasons.first().cloned().unwrap_or(crate::errors::HaltReason::ConfidenceFloorBreached {
                confidence: stage1.metrics.overall_confidence,
                floor: 0.0,
            }),
        ));
    }

    let stage2 = stage2::run_stage2(&stage1.canonical, stage1.metrics.overall_confidence, config, sink);

    let stage3 = stage3::run_stage3(
        &stage1.canonical,
        &stage2,
        input.approved_exclusion_windows.as_deref(),
        stage2.metrics.stage2_confidence,
        config,
        sink,
    );
    if stage3.metrics.halt {
        let reasons = &stage3.metrics.halt_reasons;
        error!(?reasons, "stage 3 halted");
        return Err(HtdamError::Halted(
            stage3.metrics.halt_reasons.first().cloned().unwrap_or(crate::errors::HaltReason::CoverageBelowMinimum {
                coverage_pct: 0.0,
                minimum_pct: config.grid.min_coverage_pct,
            }),
        ));
    }

    let stage4 = stage4::run_stage4(
        stage3.rows,
        stage3.metrics.stage3_confidence,
        input.external_baseline_ufoa,
        input.external_baseline_lift,
        config,
        sink,
    );

    let final_confidence = if config.confidence.use_minimum_rollup {
        stage4.metrics.stage4_confidence
    } else {
        weighted_rollup(
            stage1.metrics.overall_confidence,
            stage2.metrics.stage2_confidence,
            stage3.metrics.stage3_confidence,
            stage4.metrics.stage4_confidence,
            config.confidence.stage_weights,
        )
    };
    let quality_tier = QualityTier::from_confidence(final_confidence);

    info!(%quality_tier, final_confidence, "pipeline run complete");

    Ok(PipelineOutput {
        rows: stage4.rows,
        stage1_metrics: stage1.metrics,
        stage2_metrics: stage2.metrics,
        stage3_metrics: stage3.metrics,
        stage4_metrics: stage4.metrics,
        final_confidence,
        quality_tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use crate::types::RawPoint;

    fn perfect_input() -> PipelineInput {
        let mut streams = BTreeMap::new();
        let series = [
            (StreamTag::Chwst, 7.0),
            (StreamTag::Chwrt, 12.0),
            (StreamTag::Cdwrt, 28.0),
            (StreamTag::Flow, 0.1),
            (StreamTag::Power, 1.0),
        ];
        for (tag, value) in series {
            let points = (0..100).map(|i| RawPoint::new(i * 900_000_000, value)).collect();
            streams.insert(tag, RawStream::new(tag, points));
        }
        let mut unit_hints = BTreeMap::new();
        unit_hints.insert(StreamTag::Chwst, "C".to_string());
        unit_hints.insert(StreamTag::Chwrt, "C".to_string());
        unit_hints.insert(StreamTag::Cdwrt, "C".to_string());
        unit_hints.insert(StreamTag::Flow, "m3/s".to_string());
        unit_hints.insert(StreamTag::Power, "kW".to_string());
        PipelineInput { streams, unit_hints, ..Default::default() }
    }

    #[test]
    fn s1_perfect_series_yields_tier_a() {
        let config = HtdamConfig::default();
        let mut sink = NullSink;
        let output = run_pipeline(perfect_input(), &config, &mut sink).expect("pipeline should succeed");
        assert_eq!(output.quality_tier, QualityTier::TierA);
        assert_eq!(output.rows.len(), 100);
        for row in &output.rows {
            assert!((row.sync.confidence - 0.95).abs() < 1e-9);
            assert!((row.delta_t_chw.value().unwrap() - 5.0).abs() < 1e-9);
            assert!((row.lift.value().unwrap() - 21.0).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_mandatory_stream_is_a_precondition_error() {
        let mut input = perfect_input();
        input.streams.remove(&StreamTag::Cdwrt);
        let config = HtdamConfig::default();
        let mut sink = NullSink;
        let err = run_pipeline(input, &config, &mut sink).unwrap_err();
        assert!(matches!(err, HtdamError::Precondition(_)));
    }

    #[test]
    fn cop_outside_band_is_absent_s1_scenario() {
        let config = HtdamConfig::default();
        let mut sink = NullSink;
        let mut input = perfect_input();
        for point in input.streams.get_mut(&StreamTag::Flow).unwrap().points.iter_mut() {
            point.value = crate::types::Sample::present(0.05);
        }
        for point in input.streams.get_mut(&StreamTag::Power).unwrap().points.iter_mut() {
            point.value = crate::types::Sample::present(60.0);
        }
        let output = run_pipeline(input, &config, &mut sink).expect("pipeline should succeed");
        assert!(output.rows.iter().all(|r| r.cop.is_absent()));
        assert_eq!(output.quality_tier, QualityTier::TierA);
    }
}
