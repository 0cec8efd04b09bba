//! Stage 1 — Unit verification, canonicalization and per-row physics checks
//! (spec.md §4.1).

mod confidence;
mod physics;
mod salvage;
mod units;

pub use confidence::{
    compute_channel_confidence, compute_physics_confidence, compute_stage1_confidence,
    compute_stage1_penalty, compute_unit_confidence,
};
pub use physics::{validate_non_negative, validate_range, validate_relationships, JoinedTemps};
pub use salvage::{classify_operational_state, OperationalState, SalvageRow};
pub use units::{convert_from_canonical, convert_to_canonical, detect_unit, DetectedUnit, UnitDetection};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::HtdamConfig;
use crate::errors::{HaltReason, PreconditionError, Warning};
use crate::sink::MetricsSink;
use crate::types::{RawStream, Sample, StreamTag, TimestampUs};

/// Per-channel unit-conversion provenance, carried into the metrics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitConversionRecord {
    pub stream: StreamTag,
    pub source_unit: Option<&'static str>,
    pub target_unit: &'static str,
    pub conversion_applied: bool,
    pub detection_confidence: f64,
    pub was_inferred: bool,
}

/// Physics-violation summary for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicsViolationSummary {
    pub stream: StreamTag,
    pub violations_count: usize,
    pub total_count: usize,
    pub violations_pct: f64,
}

/// The Stage 1 metrics report (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage1Metrics {
    pub stage: &'static str,
    pub total_records: usize,
    pub unit_conversions: Vec<UnitConversionRecord>,
    pub physics_violations: Vec<PhysicsViolationSummary>,
    pub channel_confidences: BTreeMap<StreamTag, f64>,
    pub overall_confidence: f64,
    pub penalty: f64,
    pub final_score: f64,
    pub warnings: Vec<Warning>,
    pub halt_reasons: Vec<HaltReason>,
    pub halt: bool,
    pub salvaged: bool,
}

/// Stage 1's canonical (SI-unit) view: one stream per tag, converted and,
/// if salvage fired, filtered to ACTIVE rows only.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage1Output {
    pub canonical: BTreeMap<StreamTag, RawStream>,
    pub metrics: Stage1Metrics,
}

fn to_pairs(stream: &RawStream) -> Vec<(TimestampUs, Sample)> {
    stream.points.iter().map(|p| (p.timestamp_us, p.value)).collect()
}

/// Run Stage 1 over the raw per-stream input.
///
/// `hints` carries an optional unit-hint string per stream (e.g. from a
/// column name). `salvage_enabled` toggles the reversed-standby recovery
/// path (S6).
pub fn run_stage1(
    raw: &BTreeMap<StreamTag, RawStream>,
    hints: &BTreeMap<StreamTag, String>,
    salvage_enabled: bool,
    config: &HtdamConfig,
    sink: &mut dyn MetricsSink,
) -> Stage1Output {
    let mut warnings = Vec::new();
    let mut halt_reasons = Vec::new();

    for mandatory in StreamTag::MANDATORY {
        let empty = raw.get(&mandatory).map_or(true, RawStream::is_empty);
        if empty {
            let reason = PreconditionError::MissingMandatoryStream(mandatory);
            warn!(stream = %mandatory, "mandatory stream missing");
            sink.emit_error("STAGE1", &reason.to_string());
            return Stage1Output {
                canonical: BTreeMap::new(),
                metrics: Stage1Metrics {
                    stage: "UNITS",
                    total_records: 0,
                    unit_conversions: Vec::new(),
                    physics_violations: Vec::new(),
                    channel_confidences: BTreeMap::new(),
                    overall_confidence: 0.0,
                    penalty: -0.05,
                    final_score: 0.0,
                    warnings,
                    halt_reasons: vec![HaltReason::ConfidenceFloorBreached {
                        confidence: 0.0,
                        floor: 0.0,
                    }],
                    halt: true,
                    salvaged: false,
                },
            };
        }
    }

    let mut unit_conversions = Vec::new();
    let mut canonical: BTreeMap<StreamTag, RawStream> = BTreeMap::new();
    let mut channel_confidences = BTreeMap::new();

    for &tag in &StreamTag::ALL {
        let Some(stream) = raw.get(&tag) else { continue };
        let values: Vec<Sample> = stream.points.iter().map(|p| p.value).collect();
        let hint = hints.get(&tag).map(String::as_str);
        let detection = detect_unit(tag, &values, hint);

        let converted_values = match detection.unit {
            Some(u) => convert_to_canonical(&values, u),
            None => {
                let err = PreconditionError::UnitIndeterminate {
                    stream: tag,
                    reason: "no hint and value distribution matched no known range".into(),
                };
                warn!(stream = %tag, "{err}");
                values
            }
        };

        unit_conversions.push(UnitConversionRecord {
            stream: tag,
            source_unit: detection.unit.map(DetectedUnit::as_str),
            target_unit: canonical_unit_name(tag),
            conversion_applied: !matches!(
                detection.unit,
                Some(DetectedUnit::TempC | DetectedUnit::FlowM3s | DetectedUnit::PowerKw)
            ),
            detection_confidence: detection.detection_confidence,
            was_inferred: detection.was_inferred,
        });

        let unit_confidence = compute_unit_confidence(
            detection.unit.is_some(),
            detection.detection_confidence,
            detection.was_inferred,
            false,
        );

        canonical.insert(
            tag,
            RawStream::new(
                tag,
                stream
                    .points
                    .iter()
                    .zip(converted_values)
                    .map(|(p, v)| crate::types::RawPoint { timestamp_us: p.timestamp_us, value: v })
                    .collect(),
            ),
        );

        // physics_confidence is folded in once range checks run, below;
        // stash unit_confidence for now under the channel's slot.
        channel_confidences.insert(tag, unit_confidence);
    }

    let mut physics_violations = Vec::new();
    for &tag in &StreamTag::ALL {
        let Some(stream) = canonical.get(&tag) else { continue };
        let values: Vec<Sample> = stream.points.iter().map(|p| p.value).collect();
        let cfg = &config.physics;
        let violation = match tag {
            StreamTag::Chwst => validate_range(&values, cfg.chwst_range_c.0, cfg.chwst_range_c.1),
            StreamTag::Chwrt => validate_range(&values, cfg.chwrt_range_c.0, cfg.chwrt_range_c.1),
            StreamTag::Cdwrt => validate_range(&values, cfg.cdwrt_range_c.0, cfg.cdwrt_range_c.1),
            StreamTag::Flow | StreamTag::Power => validate_non_negative(&values),
        };

        if violation.violations_pct > cfg.halt_violation_pct && tag.is_temperature() {
            halt_reasons.push(HaltReason::PhysicsViolationRateExceeded {
                stream: tag,
                fraction: violation.violations_pct,
                threshold: cfg.halt_violation_pct,
            });
        }
        if !tag.is_temperature() && violation.violations_count > 0 {
            halt_reasons.push(HaltReason::NegativeValueDetected {
                stream: tag,
                count: violation.violations_count,
            });
        }

        let physics_conf = compute_physics_confidence(violation.violations_pct);
        channel_confidences
            .entry(tag)
            .and_modify(|c| *c = compute_channel_confidence(*c, physics_conf));

        physics_violations.push(PhysicsViolationSummary {
            stream: tag,
            violations_count: violation.violations_count,
            total_count: violation.total_count,
            violations_pct: violation.violations_pct,
        });
    }

    let mut salvaged = false;
    if let (Some(chwst), Some(chwrt), Some(cdwrt)) =
        (canonical.get(&StreamTag::Chwst), canonical.get(&StreamTag::Chwrt), canonical.get(&StreamTag::Cdwrt))
    {
        let joined = physics::join_on_timestamp(&to_pairs(chwst), &to_pairs(chwrt), &to_pairs(cdwrt));
        let rel = validate_relationships(&joined);

        let relationship_halts_now =
            rel.chwrt_lt_chwst_pct > config.physics.halt_violation_pct
                || rel.cdwrt_lte_chwst_pct > config.physics.halt_violation_pct;

        if relationship_halts_now {
            if rel.chwrt_lt_chwst_pct > config.physics.halt_violation_pct {
                halt_reasons.push(HaltReason::RelationshipViolationRateExceeded {
                    check: "CHWRT >= CHWST".into(),
                    fraction: rel.chwrt_lt_chwst_pct,
                    threshold: config.physics.halt_violation_pct,
                });
            }
            if rel.cdwrt_lte_chwst_pct > config.physics.halt_violation_pct {
                halt_reasons.push(HaltReason::RelationshipViolationRateExceeded {
                    check: "CDWRT > CHWST".into(),
                    fraction: rel.cdwrt_lte_chwst_pct,
                    threshold: config.physics.halt_violation_pct,
                });
            }

            let only_cause_is_reversed_chwrt = halt_reasons.len() == 1
                && rel.chwrt_lt_chwst_pct >= config.salvage.salvage_trigger_violation_pct;

            if salvage_enabled && only_cause_is_reversed_chwrt {
                let flow_pairs: BTreeMap<TimestampUs, Sample> = canonical
                    .get(&StreamTag::Flow)
                    .map(to_pairs)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let power_pairs: BTreeMap<TimestampUs, Sample> = canonical
                    .get(&StreamTag::Power)
                    .map(to_pairs)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();

                let rows: Vec<salvage::SalvageRow> = joined
                    .iter()
                    .map(|j| salvage::SalvageRow {
                        timestamp_us: j.timestamp_us,
                        chwst: j.chwst,
                        chwrt: j.chwrt,
                        flow: flow_pairs.get(&j.timestamp_us).copied().unwrap_or_else(Sample::absent),
                        power: power_pairs.get(&j.timestamp_us).copied().unwrap_or_else(Sample::absent),
                    })
                    .collect();

                let ratio = salvage::active_ratio(&rows, &config.salvage);
                if ratio >= config.salvage.min_active_ratio {
                    let active_timestamps: std::collections::BTreeSet<TimestampUs> = rows
                        .iter()
                        .filter(|r| {
                            salvage::classify_operational_state(r, &config.salvage)
                                == salvage::OperationalState::Active
                        })
                        .map(|r| r.timestamp_us)
                        .collect();

                    for stream in canonical.values_mut() {
                        stream.points.retain(|p| active_timestamps.contains(&p.timestamp_us));
                    }

                    if let (Some(chwst), Some(chwrt), Some(cdwrt)) = (
                        canonical.get(&StreamTag::Chwst),
                        canonical.get(&StreamTag::Chwrt),
                        canonical.get(&StreamTag::Cdwrt),
                    ) {
                        let rechecked_joined =
                            physics::join_on_timestamp(&to_pairs(chwst), &to_pairs(chwrt), &to_pairs(cdwrt));
                        let rechecked = validate_relationships(&rechecked_joined);
                        if rechecked.chwrt_lt_chwst_pct <= config.physics.halt_violation_pct
                            && rechecked.cdwrt_lte_chwst_pct <= config.physics.halt_violation_pct
                        {
                            halt_reasons.clear();
                            salvaged = true;
                            let w = Warning::new(
                                "STAGE1",
                                "SALVAGED_ACTIVE_ONLY",
                                "Filtered to ACTIVE due to suspected standby reversal",
                                0.0,
                            );
                            sink.emit_warning(&w);
                            warnings.push(w);
                            info!("stage1 salvage succeeded: filtered to ACTIVE rows");
                        }
                    }
                }
            }
        }
    }

    let total_records = canonical.values().map(RawStream::len).sum();
    let overall_confidence = compute_stage1_confidence(&channel_confidences);
    let penalty = compute_stage1_penalty(overall_confidence);
    let halt = !halt_reasons.is_empty();

    if halt {
        for reason in &halt_reasons {
            sink.emit_error("STAGE1", &reason.to_string());
        }
    }

    Stage1Output {
        canonical,
        metrics: Stage1Metrics {
            stage: "UNITS",
            total_records,
            unit_conversions,
            physics_violations,
            channel_confidences,
            overall_confidence,
            penalty,
            final_score: (overall_confidence + penalty).clamp(0.0, 1.0),
            warnings,
            halt_reasons,
            halt,
            salvaged,
        },
    }
}

fn canonical_unit_name(stream: StreamTag) -> &'static str {
    match stream {
        StreamTag::Chwst | StreamTag::Chwrt | StreamTag::Cdwrt => "C",
        StreamTag::Flow => "m3/s",
        StreamTag::Power => "kW",
    }
}
