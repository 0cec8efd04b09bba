//! Stage 3 — uniform grid construction and two-pointer nearest-neighbor
//! alignment (spec.md §4.3). The alignment kernel is the algorithmic core
//! of the pipeline: O(N+M) per stream, no interpolation or averaging.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::config::HtdamConfig;
use crate::errors::{HaltReason, Warning};
use crate::sink::MetricsSink;
use crate::stage2::Stage2Output;
use crate::stats;
use crate::types::{
    AlignQuality, ExclusionWindow, GapSemantic, RawStream, RowGapType, Sample, StreamAlignment,
    StreamTag, SyncRow, TimestampUs,
};

/// Build the uniform master grid: `g[0]` is the grid-step ceiling of
/// `t_start`; subsequent points step by `grid_step_us` until exceeding
/// `t_end`.
#[must_use]
pub fn build_grid(t_start: TimestampUs, t_end: TimestampUs, grid_step_us: i64) -> Vec<TimestampUs> {
    if grid_step_us <= 0 || t_start > t_end {
        return Vec::new();
    }
    let g0 = t_start.div_euclid(grid_step_us) * grid_step_us;
    let g0 = if g0 < t_start { g0 + grid_step_us } else { g0 };

    let mut grid = Vec::new();
    let mut g = g0;
    while g <= t_end {
        grid.push(g);
        g += grid_step_us;
    }
    grid
}

/// Select the best-matching raw sample for one grid point given the
/// two-pointer candidate set. `j` is the index of the first raw sample with
/// `t_raw[j] >= g_k` (already advanced by the caller).
fn pick_candidate(
    points: &[(TimestampUs, Sample)],
    j: usize,
    g_k: TimestampUs,
) -> Option<(usize, i64)> {
    let after = if j < points.len() { Some(j) } else { None };
    let before = if j >= 1 { Some(j - 1) } else { None };

    match (before, after) {
        (Some(b), Some(a)) => {
            let d_before = (points[b].0 - g_k).abs();
            let d_after = (points[a].0 - g_k).abs();
            if d_before <= d_after {
                Some((b, d_before))
            } else {
                Some((a, d_after))
            }
        }
        (Some(b), None) => Some((b, (points[b].0 - g_k).abs())),
        (None, Some(a)) => Some((a, (points[a].0 - g_k).abs())),
        (None, None) => None,
    }
}

/// Two-pointer nearest-neighbor alignment of one sorted raw stream to the
/// grid. O(N+M): `j` only ever advances.
#[must_use]
pub fn align_stream(
    raw_sorted: &[(TimestampUs, Sample)],
    grid: &[TimestampUs],
    sync_tolerance_us: i64,
    exact_threshold_us: i64,
    close_threshold_us: i64,
    interp_threshold_us: i64,
) -> Vec<StreamAlignment> {
    // A raw point can carry a present timestamp but an absent value (spec.md
    // §3); such a point is never a valid alignment candidate, so it is
    // dropped up front rather than letting `pick_candidate` select it.
    let raw_sorted: Vec<(TimestampUs, Sample)> =
        raw_sorted.iter().copied().filter(|(_, v)| v.is_present()).collect();
    let raw_sorted = raw_sorted.as_slice();

    let mut out = Vec::with_capacity(grid.len());
    let mut j = 0usize;

    for &g_k in grid {
        while j < raw_sorted.len() && raw_sorted[j].0 < g_k {
            j += 1;
        }

        let Some((idx, distance_us)) = pick_candidate(raw_sorted, j, g_k) else {
            out.push(StreamAlignment::missing());
            continue;
        };

        if distance_us > sync_tolerance_us {
            out.push(StreamAlignment::missing());
            continue;
        }

        let quality = if distance_us < exact_threshold_us {
            AlignQuality::Exact
        } else if distance_us < close_threshold_us {
            AlignQuality::Close
        } else if distance_us <= interp_threshold_us {
            AlignQuality::Interp
        } else {
            AlignQuality::Missing
        };

        if quality == AlignQuality::Missing {
            out.push(StreamAlignment::missing());
        } else {
            out.push(StreamAlignment {
                value: raw_sorted[idx].1,
                quality,
                distance_us: Some(distance_us),
            });
        }
    }

    out
}

/// Find the Stage-2 semantic of the gap interval nearest `g_k` for one
/// stream, within `±grid_step_us`. Intervals are assumed sorted by
/// `start_us` (true of Stage 2's output, which walks a sorted stream).
fn nearest_semantic(
    intervals: &[crate::stage2::IntervalAnnotation],
    g_k: TimestampUs,
    grid_step_us: i64,
) -> GapSemantic {
    let lo = g_k - grid_step_us;
    let hi = g_k + grid_step_us;

    let mut best: Option<(i64, GapSemantic)> = None;
    for interval in intervals {
        if interval.start_us > hi {
            break;
        }
        if interval.end_us < lo {
            continue;
        }
        let center = (interval.start_us + interval.end_us) / 2;
        let distance = (center - g_k).abs();
        let better = match best {
            Some((best_d, _)) => distance < best_d,
            None => true,
        };
        if better {
            best = Some((distance, interval.gap_before_semantic));
        }
    }
    best.map_or(GapSemantic::NotApplicable, |(_, s)| s)
}

fn exclusion_at(windows: &[ExclusionWindow], g_k: TimestampUs, treat_pending_as_effective: bool) -> Option<&ExclusionWindow> {
    windows
        .iter()
        .find(|w| w.is_effective(treat_pending_as_effective) && w.contains(g_k))
}

/// Stage-3 per-stream alignment summary for the metrics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamAlignmentSummary {
    pub stream: StreamTag,
    pub total_raw_records: usize,
    pub exact_count: usize,
    pub close_count: usize,
    pub interp_count: usize,
    pub missing_count: usize,
    pub mean_align_distance_s: f64,
    pub max_align_distance_s: f64,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowClassificationCounts {
    pub valid: usize,
    pub cov_constant: usize,
    pub cov_minor: usize,
    pub sensor_anomaly: usize,
    pub excluded: usize,
    pub gap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JitterStats {
    pub interval_mean_s: f64,
    pub interval_std_s: f64,
    pub interval_cv_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage3Metrics {
    pub stage: &'static str,
    pub timestamp_start_us: TimestampUs,
    pub timestamp_end_us: TimestampUs,
    pub grid_points: usize,
    pub coverage_seconds: f64,
    pub per_stream_alignment: Vec<StreamAlignmentSummary>,
    pub row_classification: RowClassificationCounts,
    pub jitter: JitterStats,
    pub coverage_penalty: f64,
    pub jitter_penalty: f64,
    pub total_penalty: f64,
    pub stage3_confidence: f64,
    pub warnings: Vec<Warning>,
    pub halt_reasons: Vec<HaltReason>,
    pub halt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage3Output {
    pub rows: Vec<SyncRow>,
    pub metrics: Stage3Metrics,
}

fn coverage_penalty(coverage_pct: f64) -> f64 {
    if coverage_pct >= 95.0 {
        0.0
    } else if coverage_pct >= 90.0 {
        -0.02
    } else if coverage_pct >= 80.0 {
        -0.05
    } else {
        -0.10
    }
}

/// Run Stage 3: build the grid, align every stream, classify every row.
pub fn run_stage3(
    canonical: &BTreeMap<StreamTag, RawStream>,
    stage2: &Stage2Output,
    override_windows: Option<&[ExclusionWindow]>,
    stage2_confidence: f64,
    config: &HtdamConfig,
    sink: &mut dyn MetricsSink,
) -> Stage3Output {
    let mut warnings = Vec::new();
    let mut halt_reasons = Vec::new();

    for mandatory in StreamTag::MANDATORY {
        if canonical.get(&mandatory).map_or(true, RawStream::is_empty) {
            halt_reasons.push(HaltReason::CoverageBelowMinimum { coverage_pct: 0.0, minimum_pct: config.grid.min_coverage_pct });
        }
    }
    if !halt_reasons.is_empty() {
        return Stage3Output {
            rows: Vec::new(),
            metrics: empty_metrics(halt_reasons, warnings),
        };
    }

    let t_start = StreamTag::ALL
        .iter()
        .filter_map(|t| canonical.get(t).and_then(RawStream::first_timestamp))
        .min()
        .unwrap_or(0);
    let t_end = StreamTag::ALL
        .iter()
        .filter_map(|t| canonical.get(t).and_then(RawStream::last_timestamp))
        .max()
        .unwrap_or(0);

    if t_start >= t_end {
        halt_reasons.push(HaltReason::CoverageBelowMinimum { coverage_pct: 0.0, minimum_pct: config.grid.min_coverage_pct });
        return Stage3Output { rows: Vec::new(), metrics: empty_metrics(halt_reasons, warnings) };
    }

    let grid_step_us = crate::types::secs_to_micros(config.grid.grid_step_seconds);
    let sync_tolerance_us = crate::types::secs_to_micros(config.grid.sync_tolerance_seconds);
    let exact_us = crate::types::secs_to_micros(config.grid.exact_threshold_s);
    let close_us = crate::types::secs_to_micros(config.grid.close_threshold_s);
    let interp_us = crate::types::secs_to_micros(config.grid.interp_threshold_s);

    let grid = build_grid(t_start, t_end, grid_step_us);

    let windows: Vec<ExclusionWindow> = override_windows
        .map(<[ExclusionWindow]>::to_vec)
        .unwrap_or_else(|| stage2.metrics.exclusion_windows.clone());

    let mut alignments: BTreeMap<StreamTag, Vec<StreamAlignment>> = BTreeMap::new();
    let mut per_stream_alignment = Vec::new();

    for &tag in &StreamTag::ALL {
        let Some(stream) = canonical.get(&tag) else {
            per_stream_alignment.push(StreamAlignmentSummary {
                stream: tag,
                total_raw_records: 0,
                exact_count: 0,
                close_count: 0,
                interp_count: 0,
                missing_count: grid.len(),
                mean_align_distance_s: 0.0,
                max_align_distance_s: 0.0,
                status: "NOT_PROVIDED",
            });
            alignments.insert(tag, vec![StreamAlignment::missing(); grid.len()]);
            continue;
        };

        let pairs: Vec<(TimestampUs, Sample)> = stream.points.iter().map(|p| (p.timestamp_us, p.value)).collect();
        let aligned = align_stream(&pairs, &grid, sync_tolerance_us, exact_us, close_us, interp_us);

        let exact_count = aligned.iter().filter(|a| a.quality == AlignQuality::Exact).count();
        let close_count = aligned.iter().filter(|a| a.quality == AlignQuality::Close).count();
        let interp_count = aligned.iter().filter(|a| a.quality == AlignQuality::Interp).count();
        let missing_count = aligned.iter().filter(|a| a.quality == AlignQuality::Missing).count();

        let distances: Vec<f64> = aligned
            .iter()
            .filter_map(|a| a.distance_us.map(crate::types::micros_to_secs))
            .collect();
        let status = if missing_count == 0 {
            "OK"
        } else if missing_count < aligned.len() {
            "PARTIAL"
        } else {
            "NOT_PROVIDED"
        };

        per_stream_alignment.push(StreamAlignmentSummary {
            stream: tag,
            total_raw_records: stream.len(),
            exact_count,
            close_count,
            interp_count,
            missing_count,
            mean_align_distance_s: stats::mean(&distances),
            max_align_distance_s: distances.iter().copied().fold(0.0, f64::max),
            status,
        });

        alignments.insert(tag, aligned);
    }

    let treat_pending = config.exclusion.treat_pending_as_effective;
    let mut rows = Vec::with_capacity(grid.len());
    let mut counts = RowClassificationCounts { valid: 0, cov_constant: 0, cov_minor: 0, sensor_anomaly: 0, excluded: 0, gap: 0 };

    for (k, &g_k) in grid.iter().enumerate() {
        let mut streams = BTreeMap::new();
        for &tag in &StreamTag::ALL {
            streams.insert(tag, alignments[&tag][k]);
        }

        if let Some(window) = exclusion_at(&windows, g_k, treat_pending) {
            counts.excluded += 1;
            rows.push(SyncRow {
                timestamp_us: g_k,
                streams,
                gap_type: RowGapType::Excluded,
                confidence: 0.0,
                exclusion_window_id: Some(window.window_id.clone()),
            });
            continue;
        }

        let missing_mandatory = StreamTag::MANDATORY
            .iter()
            .find(|t| streams[*t].quality == AlignQuality::Missing);

        if let Some(&missing_stream) = missing_mandatory {
            let semantic = stage2
                .intervals
                .get(&missing_stream)
                .map_or(GapSemantic::NotApplicable, |intervals| {
                    nearest_semantic(intervals, g_k, grid_step_us)
                });
            let gap_type: RowGapType = semantic.into();
            match gap_type {
                RowGapType::CovConstant => counts.cov_constant += 1,
                RowGapType::CovMinor => counts.cov_minor += 1,
                RowGapType::SensorAnomaly => counts.sensor_anomaly += 1,
                _ => counts.gap += 1,
            }
            rows.push(SyncRow { timestamp_us: g_k, streams, gap_type, confidence: 0.0, exclusion_window_id: None });
            continue;
        }

        let confidence = StreamTag::MANDATORY
            .iter()
            .map(|t| streams[t].quality.confidence())
            .fold(f64::INFINITY, f64::min);
        counts.valid += 1;
        rows.push(SyncRow { timestamp_us: g_k, streams, gap_type: RowGapType::Valid, confidence, exclusion_window_id: None });
    }

    let total_rows = rows.len().max(1);
    let coverage_pct = counts.valid as f64 / total_rows as f64 * 100.0;
    if coverage_pct < config.grid.min_coverage_pct {
        halt_reasons.push(HaltReason::CoverageBelowMinimum { coverage_pct, minimum_pct: config.grid.min_coverage_pct });
        for reason in &halt_reasons {
            sink.emit_error("STAGE3", &reason.to_string());
        }
        return Stage3Output {
            rows,
            metrics: Stage3Metrics {
                stage: "SYNC",
                timestamp_start_us: t_start,
                timestamp_end_us: t_end,
                grid_points: grid.len(),
                coverage_seconds: crate::types::micros_to_secs(t_end - t_start),
                per_stream_alignment,
                row_classification: counts,
                jitter: JitterStats { interval_mean_s: 0.0, interval_std_s: 0.0, interval_cv_pct: 0.0 },
                coverage_penalty: 0.0,
                jitter_penalty: 0.0,
                total_penalty: 0.0,
                stage3_confidence: 0.0,
                warnings,
                halt_reasons,
                halt: true,
            },
        };
    }

    let grid_intervals: Vec<f64> = grid.windows(2).map(|w| crate::types::micros_to_secs(w[1] - w[0])).collect();
    let jitter = JitterStats {
        interval_mean_s: stats::mean(&grid_intervals),
        interval_std_s: stats::std_dev(&grid_intervals),
        interval_cv_pct: stats::coefficient_of_variation_pct(&grid_intervals),
    };

    let cov_penalty = coverage_penalty(coverage_pct);
    let jitter_penalty = if jitter.interval_cv_pct > config.grid.jitter_cv_tolerance_pct { -0.02 } else { 0.0 };
    let total_penalty = cov_penalty + jitter_penalty;
    let stage3_confidence = (stage2_confidence + total_penalty).clamp(0.0, 1.0);

    if jitter_penalty != 0.0 {
        warn!(cv_pct = jitter.interval_cv_pct, "grid interval CV exceeds tolerance");
        let w = Warning::new("STAGE3", "JITTER_CV_EXCEEDED", "grid interval CV exceeds tolerance", jitter_penalty);
        sink.emit_warning(&w);
        warnings.push(w);
    }

    Stage3Output {
        rows,
        metrics: Stage3Metrics {
            stage: "SYNC",
            timestamp_start_us: t_start,
            timestamp_end_us: t_end,
            grid_points: grid.len(),
            coverage_seconds: crate::types::micros_to_secs(t_end - t_start),
            per_stream_alignment,
            row_classification: counts,
            jitter,
            coverage_penalty: cov_penalty,
            jitter_penalty,
            total_penalty,
            stage3_confidence,
            warnings,
            halt_reasons: Vec::new(),
            halt: false,
        },
    }
}

fn empty_metrics(halt_reasons: Vec<HaltReason>, warnings: Vec<Warning>) -> Stage3Metrics {
    Stage3Metrics {
        stage: "SYNC",
        timestamp_start_us: 0,
        timestamp_end_us: 0,
        grid_points: 0,
        coverage_seconds: 0.0,
        per_stream_alignment: Vec::new(),
        row_classification: RowClassificationCounts { valid: 0, cov_constant: 0, cov_minor: 0, sensor_anomaly: 0, excluded: 0, gap: 0 },
        jitter: JitterStats { interval_mean_s: 0.0, interval_std_s: 0.0, interval_cv_pct: 0.0 },
        coverage_penalty: 0.0,
        jitter_penalty: 0.0,
        total_penalty: 0.0,
        stage3_confidence: 0.0,
        warnings,
        halt_reasons,
        halt: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_ceiling_rounds_up_to_boundary() {
        let grid_step_us = 900_000_000;
        let grid = build_grid(100_000_000, 2_000_000_000, grid_step_us);
        assert_eq!(grid[0], 900_000_000);
    }

    #[test]
    fn alignment_distance_boundaries_match_quality_bands() {
        let raw = vec![(0i64, Sample::present(7.0))];
        let grid = vec![60_000_000i64];
        let aligned = align_stream(&raw, &grid, 1_800_000_000, 60_000_000, 300_000_000, 1_800_000_000);
        assert_eq!(aligned[0].quality, AlignQuality::Close);
    }

    #[test]
    fn distance_exactly_at_interp_ceiling_is_interp() {
        let raw = vec![(0i64, Sample::present(7.0))];
        let grid = vec![1_800_000_000i64];
        let aligned = align_stream(&raw, &grid, 1_800_000_000, 60_000_000, 300_000_000, 1_800_000_000);
        assert_eq!(aligned[0].quality, AlignQuality::Interp);
    }

    #[test]
    fn two_pointer_never_regresses() {
        let raw: Vec<(i64, Sample)> = (0..10).map(|i| (i * 900_000_000, Sample::present(i as f64))).collect();
        let grid: Vec<i64> = (0..10).map(|i| i * 900_000_000).collect();
        let aligned = align_stream(&raw, &grid, 1_800_000_000, 60_000_000, 300_000_000, 1_800_000_000);
        for a in &aligned {
            assert_eq!(a.quality, AlignQuality::Exact);
        }
    }

    #[test]
    fn coverage_penalty_boundaries_match_spec() {
        assert_eq!(coverage_penalty(95.0), 0.0);
        assert_eq!(coverage_penalty(90.0), -0.02);
        assert_eq!(coverage_penalty(80.0), -0.05);
        assert_eq!(coverage_penalty(79.9), -0.10);
    }
}
