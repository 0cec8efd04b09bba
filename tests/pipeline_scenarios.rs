//! End-to-end pipeline scenarios (spec.md §8) exercised through the public
//! `run_pipeline` entry point and the Stage 1 salvage path.

use std::collections::BTreeMap;

use htdam::config::HtdamConfig;
use htdam::pipeline::{run_pipeline, PipelineInput, QualityTier};
use htdam::sink::NullSink;
use htdam::stage1;
use htdam::types::{ExclusionStatus, ExclusionWindow, RawPoint, RawStream, StreamTag};
use htdam::HtdamError;

fn hinted(streams: Vec<(StreamTag, f64, &str)>, count: usize, step_us: i64) -> PipelineInput {
    let mut map = BTreeMap::new();
    let mut unit_hints = BTreeMap::new();
    for (tag, value, unit) in streams {
        let points = (0..count).map(|i| RawPoint::new(i as i64 * step_us, value)).collect();
        map.insert(tag, RawStream::new(tag, points));
        unit_hints.insert(tag, unit.to_string());
    }
    PipelineInput { streams: map, unit_hints, ..Default::default() }
}

/// S1: perfect uniform series, COP outside [2,7] so it is recorded absent,
/// but the run is otherwise a clean TIER_A pass.
#[test]
fn s1_perfect_series_cop_absent_but_tier_a() {
    let input = hinted(
        vec![
            (StreamTag::Chwst, 7.0, "C"),
            (StreamTag::Chwrt, 12.0, "C"),
            (StreamTag::Cdwrt, 28.0, "C"),
            (StreamTag::Flow, 0.05, "m3/s"),
            (StreamTag::Power, 60.0, "kW"),
        ],
        100,
        900_000_000,
    );
    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let output = run_pipeline(input, &config, &mut sink).expect("pipeline should succeed");

    assert_eq!(output.quality_tier, QualityTier::TierA);
    assert!((output.final_confidence - 1.0).abs() < 1e-9);
    assert_eq!(output.rows.len(), 100);
    for row in &output.rows {
        assert!((row.delta_t_chw.value().unwrap() - 5.0).abs() < 1e-9);
        assert!((row.lift.value().unwrap() - 21.0).abs() < 1e-9);
        assert!((row.q_evap_kw.value().unwrap() - 1.0465).abs() < 1e-6);
        assert!(row.cop.is_absent());
        assert!((row.cop_carnot.value().unwrap() - 13.340476).abs() < 1e-5);
    }
}

/// S2: raising flow and power into a realistic band brings COP inside
/// [2, 7] and it is retained.
#[test]
fn s2_realistic_flow_and_power_yields_valid_cop() {
    let input = hinted(
        vec![
            (StreamTag::Chwst, 7.0, "C"),
            (StreamTag::Chwrt, 12.0, "C"),
            (StreamTag::Cdwrt, 28.0, "C"),
            (StreamTag::Flow, 0.1, "m3/s"),
            (StreamTag::Power, 1.0, "kW"),
        ],
        50,
        900_000_000,
    );
    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let output = run_pipeline(input, &config, &mut sink).expect("pipeline should succeed");

    for row in &output.rows {
        let cop = row.cop.value().expect("cop should be present in S2");
        assert!((2.0..=7.0).contains(&cop));
        assert!((cop - 2.093).abs() < 1e-6);
    }
}

/// S3: a Fahrenheit-hinted CHWST stream converts to the exact Celsius
/// values within 1e-9, with hint-derived detection confidence 0.95.
#[test]
fn s3_fahrenheit_hint_converts_to_celsius() {
    let mut raw = BTreeMap::new();
    let f_values = [44.6, 46.4, 48.2, 50.0, 51.8];
    let points: Vec<RawPoint> = f_values.iter().enumerate().map(|(i, v)| RawPoint::new(i as i64 * 900_000_000, *v)).collect();
    raw.insert(StreamTag::Chwst, RawStream::new(StreamTag::Chwst, points));

    let mut hints = BTreeMap::new();
    hints.insert(StreamTag::Chwst, "\u{b0}F".to_string());

    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let out = stage1::run_stage1(&raw, &hints, false, &config, &mut sink);

    let converted: Vec<f64> = out.canonical[&StreamTag::Chwst].points.iter().map(|p| p.value.value().unwrap()).collect();
    let expected = [7.0, 8.0, 9.0, 10.0, 11.0];
    for (c, e) in converted.iter().zip(expected.iter()) {
        assert!((c - e).abs() < 1e-9);
    }

    let record = out.metrics.unit_conversions.iter().find(|r| r.stream == StreamTag::Chwst).unwrap();
    assert!(record.conversion_applied);
    assert!((record.detection_confidence - 0.95).abs() < 1e-9);
}

/// S5: two mandatory streams with a 9.5h overlapping MAJOR_GAP form a
/// single exclusion window, and every grid row inside it is EXCLUDED with
/// confidence 0 regardless of alignment quality.
#[test]
fn s5_overlapping_major_gaps_exclude_rows() {
    let t0 = 0i64;
    let step = 900_000_000i64;

    // CHWST: samples at t0 and t0 + 36000s (10h gap), CHWRT: samples at
    // t0 + 1800s and t0 + 37800s (10h gap) — overlap is [1800s, 36000s] = 9.5h.
    let mut raw = BTreeMap::new();
    raw.insert(
        StreamTag::Chwst,
        RawStream::new(StreamTag::Chwst, vec![RawPoint::new(t0, 7.0), RawPoint::new(t0 + 36_000 * 1_000_000, 7.0)]),
    );
    raw.insert(
        StreamTag::Chwrt,
        RawStream::new(
            StreamTag::Chwrt,
            vec![RawPoint::new(t0 + 1_800 * 1_000_000, 12.0), RawPoint::new(t0 + 37_800 * 1_000_000, 12.0)],
        ),
    );
    raw.insert(
        StreamTag::Cdwrt,
        RawStream::new(StreamTag::Cdwrt, (0..42).map(|i| RawPoint::new(t0 + i * step, 28.0)).collect()),
    );

    let mut hints = BTreeMap::new();
    hints.insert(StreamTag::Chwst, "C".to_string());
    hints.insert(StreamTag::Chwrt, "C".to_string());
    hints.insert(StreamTag::Cdwrt, "C".to_string());

    let config = HtdamConfig::default();
    let mut sink = NullSink;

    let stage1 = stage1::run_stage1(&raw, &hints, false, &config, &mut sink);
    let stage2 = htdam::stage2::run_stage2(&stage1.canonical, stage1.metrics.overall_confidence, &config, &mut sink);

    assert_eq!(stage2.metrics.exclusion_windows.len(), 1);
    let window = &stage2.metrics.exclusion_windows[0];
    assert_eq!(window.window_id, "EXW_001");
    assert_eq!(window.affecting_streams.len(), 2);
    assert!((window.duration_hours - 9.5).abs() < 1e-6);

    let stage3 = htdam::stage3::run_stage3(&stage1.canonical, &stage2, None, stage2.metrics.stage2_confidence, &config, &mut sink);
    let excluded_rows: Vec<_> = stage3
        .rows
        .iter()
        .filter(|r| r.timestamp_us >= t0 + 1_800 * 1_000_000 && r.timestamp_us <= t0 + 36_000 * 1_000_000)
        .collect();
    assert!(!excluded_rows.is_empty());
    for row in excluded_rows {
        assert_eq!(row.gap_type, htdam::types::RowGapType::Excluded);
        assert_eq!(row.confidence, 0.0);
        assert_eq!(row.exclusion_window_id.as_deref(), Some("EXW_001"));
    }
}

/// An approved exclusion window (a caller override) takes precedence over
/// whatever Stage 2 detected on its own.
#[test]
fn approved_override_window_excludes_rows() {
    let step = 900_000_000i64;
    let mut input = hinted(
        vec![
            (StreamTag::Chwst, 7.0, "C"),
            (StreamTag::Chwrt, 12.0, "C"),
            (StreamTag::Cdwrt, 28.0, "C"),
        ],
        20,
        step,
    );
    input.approved_exclusion_windows = Some(vec![ExclusionWindow {
        window_id: "EXW_001".to_string(),
        start_us: 2 * step,
        end_us: 5 * step,
        duration_hours: 3.0 * step as f64 / 3_600_000_000.0,
        affecting_streams: [StreamTag::Chwst, StreamTag::Chwrt].into_iter().collect(),
        status: ExclusionStatus::Approved,
    }]);

    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let output = run_pipeline(input, &config, &mut sink).expect("pipeline should succeed");

    for row in &output.rows {
        if row.sync.timestamp_us >= 2 * step && row.sync.timestamp_us <= 5 * step {
            assert_eq!(row.sync.gap_type, htdam::types::RowGapType::Excluded);
            assert_eq!(row.sync.exclusion_window_id.as_deref(), Some("EXW_001"));
        }
    }
}

fn salvage_streams() -> BTreeMap<StreamTag, RawStream> {
    let step = 900_000_000i64;
    let mut raw = BTreeMap::new();
    // 7 rows look reversed (CHWST > CHWRT, a standby sensor swap); 3 rows
    // are genuinely ACTIVE (CHWRT - CHWST >= 0.5).
    let chwst: Vec<RawPoint> = (0..10)
        .map(|i| if i < 7 { RawPoint::new(i * step, 10.0) } else { RawPoint::new(i * step, 7.0) })
        .collect();
    let chwrt: Vec<RawPoint> = (0..10)
        .map(|i| if i < 7 { RawPoint::new(i * step, 8.0) } else { RawPoint::new(i * step, 12.0) })
        .collect();
    let cdwrt: Vec<RawPoint> = (0..10).map(|i| RawPoint::new(i * step, 28.0)).collect();
    let flow: Vec<RawPoint> = (0..10).map(|i| RawPoint::new(i * step, 0.05)).collect();
    let power: Vec<RawPoint> = (0..10).map(|i| RawPoint::new(i * step, 60.0)).collect();
    raw.insert(StreamTag::Chwst, RawStream::new(StreamTag::Chwst, chwst));
    raw.insert(StreamTag::Chwrt, RawStream::new(StreamTag::Chwrt, chwrt));
    raw.insert(StreamTag::Cdwrt, RawStream::new(StreamTag::Cdwrt, cdwrt));
    raw.insert(StreamTag::Flow, RawStream::new(StreamTag::Flow, flow));
    raw.insert(StreamTag::Power, RawStream::new(StreamTag::Power, power));
    raw
}

fn salvage_hints() -> BTreeMap<StreamTag, String> {
    let mut hints = BTreeMap::new();
    hints.insert(StreamTag::Chwst, "C".to_string());
    hints.insert(StreamTag::Chwrt, "C".to_string());
    hints.insert(StreamTag::Cdwrt, "C".to_string());
    hints.insert(StreamTag::Flow, "m3/s".to_string());
    hints.insert(StreamTag::Power, "kW".to_string());
    hints
}

/// S6: with salvage enabled, the reversed-standby rows are filtered out and
/// the run proceeds on the 30% genuinely ACTIVE rows.
#[test]
fn s6_salvage_recovers_reversed_standby() {
    let raw = salvage_streams();
    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let out = stage1::run_stage1(&raw, &salvage_hints(), true, &config, &mut sink);

    assert!(!out.metrics.halt);
    assert!(out.metrics.salvaged);
    assert_eq!(out.canonical[&StreamTag::Chwst].len(), 3);
}

/// S6: without salvage enabled, the same input HALTs on the relationship
/// check.
#[test]
fn s6_without_salvage_halts() {
    let raw = salvage_streams();
    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let out = stage1::run_stage1(&raw, &salvage_hints(), false, &config, &mut sink);

    assert!(out.metrics.halt);
    assert!(!out.metrics.salvaged);
}

/// Boundary: an explicitly empty mandatory stream is a precondition error,
/// not a silent zero-row result.
#[test]
fn boundary_empty_mandatory_stream_is_precondition_error() {
    let mut input = hinted(
        vec![(StreamTag::Chwst, 7.0, "C"), (StreamTag::Chwrt, 12.0, "C"), (StreamTag::Cdwrt, 28.0, "C")],
        10,
        900_000_000,
    );
    input.streams.insert(StreamTag::Chwst, RawStream::new(StreamTag::Chwst, Vec::new()));

    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let err = run_pipeline(input, &config, &mut sink).unwrap_err();
    assert!(matches!(err, HtdamError::Precondition(_)));
}

/// Boundary: a single-sample stream still produces at least one aligned
/// grid row rather than erroring.
#[test]
fn boundary_single_sample_stream_still_aligns() {
    let mut raw = BTreeMap::new();
    for (tag, value) in [(StreamTag::Chwst, 7.0), (StreamTag::Chwrt, 12.0), (StreamTag::Cdwrt, 28.0)] {
        raw.insert(tag, RawStream::new(tag, vec![RawPoint::new(0, value)]));
    }
    let hints = salvage_hints();
    let config = HtdamConfig::default();
    let mut sink = NullSink;

    let stage1 = stage1::run_stage1(&raw, &hints, false, &config, &mut sink);
    assert!(!stage1.metrics.halt);
    let stage2 = htdam::stage2::run_stage2(&stage1.canonical, stage1.metrics.overall_confidence, &config, &mut sink);
    for (_, intervals) in &stage2.intervals {
        assert!(intervals.is_empty(), "a single sample has no intervals to classify");
    }
    let stage3 = htdam::stage3::run_stage3(&stage1.canonical, &stage2, None, stage2.metrics.stage2_confidence, &config, &mut sink);
    assert!(!stage3.rows.is_empty());
}

#[test]
fn quality_report_serializes_to_json() {
    let input = hinted(
        vec![
            (StreamTag::Chwst, 7.0, "C"),
            (StreamTag::Chwrt, 12.0, "C"),
            (StreamTag::Cdwrt, 28.0, "C"),
        ],
        10,
        900_000_000,
    );
    let config = HtdamConfig::default();
    let mut sink = NullSink;
    let output = run_pipeline(input, &config, &mut sink).expect("pipeline should succeed");

    let report = output.to_json_report().expect("report should serialize");
    let parsed: serde_json::Value = serde_json::from_str(&report).expect("report should be valid JSON");
    assert!(parsed.get("rows").is_some());
    assert!(parsed.get("stage4_metrics").is_some());
    assert_eq!(parsed["quality_tier"], "TierA");
}
