//! Stage 2 — per-stream gap analysis and cross-stream exclusion-window
//! detection (spec.md §4.2).

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::{ExclusionConfig, GapConfig};
use crate::errors::Warning;
use crate::sink::MetricsSink;
use crate::types::{
    ExclusionStatus, ExclusionWindow, GapClass, GapSemantic, RawStream, Sample, StreamTag,
    TimestampUs,
};

/// Everything known about the interval immediately before sample index `i`
/// (`i >= 1`) in a stream's sorted sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalAnnotation {
    pub index: usize,
    pub start_us: TimestampUs,
    pub end_us: TimestampUs,
    pub gap_before_duration_s: f64,
    pub gap_before_class: GapClass,
    pub gap_before_semantic: GapSemantic,
    pub value_changed_relative_pct: f64,
}

/// Classify one inter-sample interval against the grid step.
#[must_use]
pub fn classify_interval(delta_t_s: f64, cfg: &GapConfig, grid_step_s: f64) -> GapClass {
    let normal_ceiling = cfg.normal_factor * grid_step_s;
    let minor_ceiling = cfg.minor_factor * grid_step_s;
    if delta_t_s <= normal_ceiling {
        GapClass::Normal
    } else if delta_t_s <= minor_ceiling {
        GapClass::MinorGap
    } else {
        GapClass::MajorGap
    }
}

/// Classify the semantic of a non-NORMAL interval from the values either
/// side of it. NORMAL intervals are always `NotApplicable` — callers should
/// only invoke this after `classify_interval` returns non-Normal.
#[must_use]
pub fn classify_semantic(prev: Sample, curr: Sample, cfg: &GapConfig) -> GapSemantic {
    let (Some(prev), Some(curr)) = (prev.value(), curr.value()) else {
        return GapSemantic::NotApplicable;
    };
    let abs_change = (curr - prev).abs();
    let rel_pct = abs_change / prev.abs().max(cfg.near_zero_epsilon) * 100.0;

    if abs_change > cfg.sensor_anomaly_abs_jump {
        GapSemantic::SensorAnomaly
    } else if rel_pct < cfg.cov_relative_tolerance_pct {
        GapSemantic::CovConstant
    } else {
        GapSemantic::CovMinor
    }
}

/// Run the full per-interval pass over one sorted stream.
#[must_use]
pub fn analyze_stream(stream: &RawStream, cfg: &GapConfig, grid_step_s: f64) -> Vec<IntervalAnnotation> {
    let mut out = Vec::with_capacity(stream.points.len().saturating_sub(1));
    for i in 1..stream.points.len() {
        let prev = &stream.points[i - 1];
        let curr = &stream.points[i];
        let delta_t_s = crate::types::micros_to_secs(curr.timestamp_us - prev.timestamp_us);
        let class = classify_interval(delta_t_s, cfg, grid_step_s);
        let semantic = if class == GapClass::Normal {
            GapSemantic::NotApplicable
        } else {
            classify_semantic(prev.value, curr.value, cfg)
        };
        let rel_pct = match (prev.value.value(), curr.value.value()) {
            (Some(p), Some(c)) => (c - p).abs() / p.abs().max(cfg.near_zero_epsilon) * 100.0,
            _ => 0.0,
        };
        out.push(IntervalAnnotation {
            index: i,
            start_us: prev.timestamp_us,
            end_us: curr.timestamp_us,
            gap_before_duration_s: delta_t_s,
            gap_before_class: class,
            gap_before_semantic: semantic,
            value_changed_relative_pct: rel_pct,
        });
    }
    out
}

#[must_use]
pub fn semantic_penalty(semantic: GapSemantic, cfg: &crate::config::ConfidenceConfig) -> f64 {
    match semantic {
        GapSemantic::CovConstant | GapSemantic::NotApplicable => 0.0,
        GapSemantic::CovMinor => cfg.gap_penalty_minor,
        GapSemantic::SensorAnomaly => cfg.gap_penalty_anomaly,
    }
}

/// One MAJOR_GAP interval tagged with its owning stream, for cross-stream
/// overlap detection.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TaggedInterval {
    stream: StreamTag,
    start_us: TimestampUs,
    end_us: TimestampUs,
}

fn overlap(a: &TaggedInterval, b: &TaggedInterval) -> Option<(TimestampUs, TimestampUs)> {
    let start = a.start_us.max(b.start_us);
    let end = a.end_us.min(b.end_us);
    if start < end {
        Some((start, end))
    } else {
        None
    }
}

/// Detect cross-stream exclusion-window candidates from every stream's
/// MAJOR_GAP intervals (spec.md §4.2).
#[must_use]
pub fn detect_exclusion_windows(
    major_gaps: &BTreeMap<StreamTag, Vec<IntervalAnnotation>>,
    cfg: &ExclusionConfig,
) -> Vec<ExclusionWindow> {
    let intervals: Vec<TaggedInterval> = major_gaps
        .iter()
        .flat_map(|(&stream, gaps)| {
            gaps.iter()
                .filter(|g| g.gap_before_class == GapClass::MajorGap)
                .map(move |g| TaggedInterval { stream, start_us: g.start_us, end_us: g.end_us })
        })
        .collect();

    let min_overlap_us = crate::types::secs_to_micros(cfg.min_overlap_hours * 3600.0);
    let mut candidates: Vec<(TimestampUs, TimestampUs, std::collections::BTreeSet<StreamTag>)> =
        Vec::new();

    for i in 0..intervals.len() {
        for j in (i + 1)..intervals.len() {
            let a = &intervals[i];
            let b = &intervals[j];
            if a.stream == b.stream {
                continue;
            }
            if let Some((start, end)) = overlap(a, b) {
                if end - start >= min_overlap_us {
                    let mut streams = std::collections::BTreeSet::new();
                    streams.insert(a.stream);
                    streams.insert(b.stream);
                    candidates.push((start, end, streams));
                }
            }
        }
    }

    candidates.sort_by_key(|c| c.0);

    let mut merged: Vec<(TimestampUs, TimestampUs, std::collections::BTreeSet<StreamTag>)> =
        Vec::new();
    for (start, end, streams) in candidates {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                last.2.extend(streams);
                continue;
            }
        }
        merged.push((start, end, streams));
    }

    merged
        .into_iter()
        .filter(|(_, _, streams)| streams.len() >= cfg.min_affecting_streams)
        .enumerate()
        .map(|(i, (start, end, streams))| ExclusionWindow {
            window_id: format!("EXW_{:03}", i + 1),
            start_us: start,
            end_us: end,
            duration_hours: crate::types::micros_to_secs(end - start) / 3600.0,
            affecting_streams: streams,
            status: ExclusionStatus::PendingApproval,
        })
        .collect()
}

/// Per-stream Stage 2 summary, for the metrics record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamGapSummary {
    pub stream: StreamTag,
    pub total_records: usize,
    pub normal_count: usize,
    pub minor_gap_count: usize,
    pub major_gap_count: usize,
    pub semantic_counts: BTreeMap<&'static str, usize>,
    pub stream_penalty: f64,
    pub stream_confidence: f64,
}

/// The Stage 2 metrics report (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage2Metrics {
    pub stage: &'static str,
    pub per_stream: Vec<StreamGapSummary>,
    pub exclusion_windows: Vec<ExclusionWindow>,
    pub aggregate_penalty: f64,
    pub stage2_confidence: f64,
    pub warnings: Vec<Warning>,
    pub human_approval_required: bool,
    pub halt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage2Output {
    pub intervals: BTreeMap<StreamTag, Vec<IntervalAnnotation>>,
    pub metrics: Stage2Metrics,
}

/// Run Stage 2 over Stage 1's canonical per-stream output.
pub fn run_stage2(
    canonical: &BTreeMap<StreamTag, RawStream>,
    stage1_confidence: f64,
    config: &crate::config::HtdamConfig,
    sink: &mut dyn MetricsSink,
) -> Stage2Output {
    let mut intervals: BTreeMap<StreamTag, Vec<IntervalAnnotation>> = BTreeMap::new();
    let mut major_gaps: BTreeMap<StreamTag, Vec<IntervalAnnotation>> = BTreeMap::new();
    let mut per_stream = Vec::new();
    let mut warnings = Vec::new();
    let mut aggregate_penalty = 0.0;

    for &tag in &StreamTag::ALL {
        let Some(stream) = canonical.get(&tag) else { continue };
        let annotated = analyze_stream(stream, &config.gap, config.grid.grid_step_seconds);

        let mut semantic_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut normal_count = 0;
        let mut minor_gap_count = 0;
        let mut major_gap_count = 0;
        let mut stream_penalty = 0.0;

        for interval in &annotated {
            match interval.gap_before_class {
                GapClass::Normal => normal_count += 1,
                GapClass::MinorGap => minor_gap_count += 1,
                GapClass::MajorGap => major_gap_count += 1,
            }
            if interval.gap_before_class != GapClass::Normal {
                *semantic_counts
                    .entry(semantic_name(interval.gap_before_semantic))
                    .or_insert(0) += 1;
                stream_penalty += semantic_penalty(interval.gap_before_semantic, &config.confidence);
            }
        }

        if major_gap_count > 0 {
            major_gaps.insert(
                tag,
                annotated
                    .iter()
                    .filter(|i| i.gap_before_class == GapClass::MajorGap)
                    .copied()
                    .collect(),
            );
        }

        if minor_gap_count + major_gap_count > 0 {
            let w = Warning::new(
                "STAGE2",
                "NON_NORMAL_INTERVALS",
                format!("{tag} has {minor_gap_count} minor and {major_gap_count} major gaps"),
                stream_penalty,
            );
            sink.emit_warning(&w);
            warnings.push(w);
        }

        aggregate_penalty += stream_penalty;
        per_stream.push(StreamGapSummary {
            stream: tag,
            total_records: stream.len(),
            normal_count,
            minor_gap_count,
            major_gap_count,
            semantic_counts,
            stream_penalty,
            stream_confidence: (stage1_confidence + stream_penalty).clamp(0.0, 1.0),
        });

        intervals.insert(tag, annotated);
    }

    let exclusion_windows = detect_exclusion_windows(&major_gaps, &config.exclusion);
    let human_approval_required = !exclusion_windows.is_empty();
    if human_approval_required {
        info!(count = exclusion_windows.len(), "exclusion-window candidates detected");
        let exclusion_penalty = config.confidence.gap_penalty_excluded * exclusion_windows.len() as f64;
        aggregate_penalty += exclusion_penalty;
        let w = Warning::new(
            "STAGE2",
            "EXCLUSION_WINDOWS_DETECTED",
            format!("{} exclusion window(s) pending row-level exclusion in Stage 3", exclusion_windows.len()),
            exclusion_penalty,
        );
        sink.emit_warning(&w);
        warnings.push(w);
    }

    let stage2_confidence = (stage1_confidence + aggregate_penalty).clamp(0.0, 1.0);

    Stage2Output {
        intervals,
        metrics: Stage2Metrics {
            stage: "GAPS",
            per_stream,
            exclusion_windows,
            aggregate_penalty,
            stage2_confidence,
            warnings,
            human_approval_required,
            halt: false,
        },
    }
}

fn semantic_name(semantic: GapSemantic) -> &'static str {
    match semantic {
        GapSemantic::CovConstant => "COV_CONSTANT",
        GapSemantic::CovMinor => "COV_MINOR",
        GapSemantic::SensorAnomaly => "SENSOR_ANOMALY",
        GapSemantic::NotApplicable => "N_A",
    }
}
