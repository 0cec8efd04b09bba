//! Stage 4 — derived COP-ready metrics, hunting and fouling indicators
//! (spec.md §4.4).

use serde::Serialize;

use crate::config::{FoulingConfig, HtdamConfig, HuntingConfig};
use crate::errors::Warning;
use crate::sink::MetricsSink;
use crate::stats;
use crate::types::{DerivedRow, FoulingSeverity, HuntSeverity, Sample, StreamTag, SyncRow, TimestampUs};

const WATER_DENSITY_KG_M3: f64 = 1000.0;
const WATER_SPECIFIC_HEAT_KJ_KG_K: f64 = 4.186;
const KELVIN_OFFSET: f64 = 273.15;
const NEAR_ZERO_EPSILON: f64 = 1e-6;

#[must_use]
pub fn compute_delta_t(chwst: Sample, chwrt: Sample) -> Sample {
    chwrt.zip_with(chwst, |rt, st| rt - st).filter(|v| v >= 0.0)
}

#[must_use]
pub fn compute_lift(chwst: Sample, cdwrt: Sample) -> Sample {
    cdwrt.zip_with(chwst, |cd, st| cd - st).filter(|v| v > 0.0)
}

/// `q_evap_kw = flow_m3s · ρ · cp · delta_t / 1000 = flow · 4.186 · delta_t`.
#[must_use]
pub fn compute_load(flow_m3s: Sample, delta_t_chw: Sample) -> Sample {
    flow_m3s
        .zip_with(delta_t_chw, |flow, dt| {
            flow * WATER_DENSITY_KG_M3 * WATER_SPECIFIC_HEAT_KJ_KG_K * dt / 1000.0
        })
        .filter(|v| v >= 0.0)
}

#[must_use]
pub fn compute_q_confidence(row_confidence: f64, flow_align_confidence: f64, delta_t_chw: Sample, q_evap_kw: Sample) -> f64 {
    let Some(dt) = delta_t_chw.value() else { return 0.0 };
    if q_evap_kw.is_absent() {
        return 0.0;
    }
    let mut confidence = row_confidence.min(flow_align_confidence);
    if dt < 1.0 {
        confidence -= 0.10;
    } else if dt > 15.0 {
        confidence -= 0.05;
    }
    confidence.clamp(0.0, 1.0)
}

#[must_use]
pub fn compute_cop(q_evap_kw: Sample, power_kw: Sample, cop_range: (f64, f64)) -> Sample {
    let (Some(q), Some(p)) = (q_evap_kw.value(), power_kw.value()) else {
        return Sample::absent();
    };
    if p <= 0.0 {
        return Sample::absent();
    }
    let cop = q / p;
    Sample::present(cop).filter(|v| v >= cop_range.0 && v <= cop_range.1)
}

#[must_use]
pub fn compute_cop_confidence(q_confidence: f64, power_align_confidence: f64, cop: Sample) -> f64 {
    if cop.is_absent() {
        return 0.0;
    }
    q_confidence.min(power_align_confidence)
}

#[must_use]
pub fn compute_carnot_cop(chwst: Sample, lift: Sample) -> Sample {
    let (Some(t_evap_c), Some(l)) = (chwst.value(), lift.value()) else {
        return Sample::absent();
    };
    if l <= 0.0 {
        return Sample::absent();
    }
    Sample::present((t_evap_c + KELVIN_OFFSET) / l)
}

#[must_use]
pub fn compute_normalized_cop(cop: Sample, carnot: Sample) -> Sample {
    cop.zip_with(carnot, |c, k| c / k)
}

fn sign_reversals(values: &[f64]) -> usize {
    let signs: Vec<i8> = values
        .windows(2)
        .filter_map(|w| {
            let d = w[1] - w[0];
            if d > 0.0 {
                Some(1i8)
            } else if d < 0.0 {
                Some(-1i8)
            } else {
                None
            }
        })
        .collect();
    signs.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Sliding-window sign-reversal hunting detector on the CHWST series.
#[must_use]
pub fn compute_hunting(rows: &[SyncRow], cfg: &HuntingConfig) -> Vec<HuntSeverity> {
    let present: Vec<(TimestampUs, f64)> = rows
        .iter()
        .filter_map(|r| r.stream(StreamTag::Chwst).value.value().map(|v| (r.timestamp_us, v)))
        .collect();
    let half_window_us = crate::types::secs_to_micros(cfg.hunt_window_hours / 2.0 * 3600.0);

    rows.iter()
        .map(|row| {
            let lo = row.timestamp_us - half_window_us;
            let hi = row.timestamp_us + half_window_us;
            let start = present.partition_point(|&(t, _)| t < lo);
            let end = present.partition_point(|&(t, _)| t <= hi);
            let window: Vec<f64> = present[start..end].iter().map(|&(_, v)| v).collect();
            let reversals = sign_reversals(&window);
            if reversals < cfg.hunt_cycle_min_count {
                HuntSeverity::None
            } else {
                let cycles_per_hour = reversals as f64 / cfg.hunt_window_hours;
                if cycles_per_hour >= cfg.hunt_major_cycles_per_hour {
                    HuntSeverity::Major
                } else if cycles_per_hour >= cfg.hunt_minor_cycles_per_hour {
                    HuntSeverity::Minor
                } else {
                    HuntSeverity::None
                }
            }
        })
        .collect()
}

fn classify_fouling(pct: f64, minor_pct: f64, major_pct: f64) -> FoulingSeverity {
    if pct < minor_pct {
        FoulingSeverity::Clean
    } else if pct < major_pct {
        FoulingSeverity::MinorFouling
    } else {
        FoulingSeverity::MajorFouling
    }
}

/// Evaporator fouling: `UFOA = q_evap_kw / max(flow_m3s, ε)`, baseline from
/// the first `baseline_fraction` of non-absent UFOA values unless an
/// external baseline is supplied.
#[must_use]
pub fn compute_evap_fouling(
    q_evap_kw: &[Sample],
    flow_m3s: &[Sample],
    cfg: &FoulingConfig,
    external_baseline: Option<f64>,
) -> (Vec<Sample>, f64) {
    let ufoa: Vec<Sample> = q_evap_kw
        .iter()
        .zip(flow_m3s)
        .map(|(q, f)| q.zip_with(*f, |qv, fv| qv / fv.max(NEAR_ZERO_EPSILON)))
        .collect();

    let present_ufoa: Vec<f64> = ufoa.iter().filter_map(Sample::value).collect();
    let baseline = external_baseline.unwrap_or_else(|| {
        let take = ((present_ufoa.len() as f64) * cfg.baseline_fraction).ceil() as usize;
        stats::mean(&present_ufoa[..take.min(present_ufoa.len())])
    });

    let pct = ufoa
        .iter()
        .map(|u| u.map(|v| (1.0 - v / baseline.max(NEAR_ZERO_EPSILON)) * 100.0))
        .collect();
    (pct, baseline)
}

/// Condenser fouling: derived from lift vs. a baseline lift (median
/// non-absent lift unless an external baseline is supplied).
#[must_use]
pub fn compute_condenser_fouling(lift: &[Sample], external_baseline: Option<f64>) -> (Vec<Sample>, f64) {
    let present_lift: Vec<f64> = lift.iter().filter_map(Sample::value).collect();
    let baseline = external_baseline.unwrap_or_else(|| stats::median(&present_lift));

    let pct = lift
        .iter()
        .map(|l| l.map(|v| (v / baseline.max(NEAR_ZERO_EPSILON) - 1.0) * 100.0))
        .collect();
    (pct, baseline)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadAnalysis {
    pub rows_with_load: usize,
    pub mean_q_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopAnalysis {
    pub rows_with_cop: usize,
    pub rows_outside_range: usize,
    pub mean_cop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HuntAnalysis {
    pub minor_count: usize,
    pub major_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoulingAnalysis {
    pub evap_minor_count: usize,
    pub evap_major_count: usize,
    pub condenser_minor_count: usize,
    pub condenser_major_count: usize,
    pub baseline_ufoa: f64,
    pub baseline_lift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage4Metrics {
    pub stage: &'static str,
    pub load_analysis: LoadAnalysis,
    pub cop_analysis: CopAnalysis,
    pub hunt_analysis: HuntAnalysis,
    pub fouling_analysis: FoulingAnalysis,
    pub stage4_confidence: f64,
    pub warnings: Vec<Warning>,
    pub halt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage4Output {
    pub rows: Vec<DerivedRow>,
    pub metrics: Stage4Metrics,
}

/// Run Stage 4 over Stage 3's synchronized rows.
pub fn run_stage4(
    rows: Vec<SyncRow>,
    stage3_confidence: f64,
    external_baseline_ufoa: Option<f64>,
    external_baseline_lift: Option<f64>,
    config: &HtdamConfig,
    sink: &mut dyn MetricsSink,
) -> Stage4Output {
    let mut warnings = Vec::new();

    let delta_t: Vec<Sample> = rows
        .iter()
        .map(|r| compute_delta_t(r.stream(StreamTag::Chwst).value, r.stream(StreamTag::Chwrt).value))
        .collect();
    let lift: Vec<Sample> = rows
        .iter()
        .map(|r| compute_lift(r.stream(StreamTag::Chwst).value, r.stream(StreamTag::Cdwrt).value))
        .collect();
    let q_evap_kw: Vec<Sample> = rows
        .iter()
        .zip(&delta_t)
        .map(|(r, dt)| compute_load(r.stream(StreamTag::Flow).value, *dt))
        .collect();
    let q_confidence: Vec<f64> = rows
        .iter()
        .zip(&delta_t)
        .zip(&q_evap_kw)
        .map(|((r, dt), q)| {
            compute_q_confidence(r.confidence, r.stream(StreamTag::Flow).quality.confidence(), *dt, *q)
        })
        .collect();
    let cop_range = (config.confidence.cop_min, config.confidence.cop_max);
    let cop: Vec<Sample> = q_evap_kw
        .iter()
        .zip(&rows)
        .map(|(q, r)| compute_cop(*q, r.stream(StreamTag::Power).value, cop_range))
        .collect();
    let cop_confidence: Vec<f64> = q_confidence
        .iter()
        .zip(&rows)
        .zip(&cop)
        .map(|((qc, r), c)| compute_cop_confidence(*qc, r.stream(StreamTag::Power).quality.confidence(), *c))
        .collect();
    let carnot: Vec<Sample> = rows
        .iter()
        .zip(&lift)
        .map(|(r, l)| compute_carnot_cop(r.stream(StreamTag::Chwst).value, *l))
        .collect();
    let normalized: Vec<Sample> = cop.iter().zip(&carnot).map(|(c, k)| compute_normalized_cop(*c, *k)).collect();

    let hunt_severity = compute_hunting(&rows, &config.hunting);

    let flow_series: Vec<Sample> = rows.iter().map(|r| r.stream(StreamTag::Flow).value).collect();
    let (evap_pct, baseline_ufoa) = compute_evap_fouling(&q_evap_kw, &flow_series, &config.fouling, external_baseline_ufoa);
    let (condenser_pct, baseline_lift) = compute_condenser_fouling(&lift, external_baseline_lift);

    let evap_severity: Vec<FoulingSeverity> = evap_pct
        .iter()
        .map(|p| p.value().map_or(FoulingSeverity::Clean, |v| classify_fouling(v, config.fouling.fouling_evap_minor_pct, config.fouling.fouling_evap_major_pct)))
        .collect();
    let condenser_severity: Vec<FoulingSeverity> = condenser_pct
        .iter()
        .map(|p| p.value().map_or(FoulingSeverity::Clean, |v| classify_fouling(v, config.fouling.fouling_condenser_minor_pct, config.fouling.fouling_condenser_major_pct)))
        .collect();

    let mut major_hunt_rows = 0usize;
    let mut minor_hunt_rows = 0usize;
    let mut major_evap_fouling_rows = 0usize;
    let mut minor_evap_fouling_rows = 0usize;
    let mut major_condenser_fouling_rows = 0usize;
    let mut minor_condenser_fouling_rows = 0usize;
    let mut rows_with_load = 0usize;
    let mut rows_with_cop = 0usize;
    let mut rows_outside_cop_range = 0usize;

    let mut derived = Vec::with_capacity(rows.len());
    for (i, sync) in rows.into_iter().enumerate() {
        if q_evap_kw[i].is_present() {
            rows_with_load += 1;
        }
        if cop[i].is_present() {
            rows_with_cop += 1;
        } else if q_evap_kw[i].is_present() && sync.stream(StreamTag::Power).value.value().is_some_and(|p| p > 0.0) {
            rows_outside_cop_range += 1;
        }
        match hunt_severity[i] {
            HuntSeverity::Major => major_hunt_rows += 1,
            HuntSeverity::Minor => minor_hunt_rows += 1,
            HuntSeverity::None => {}
        }
        match evap_severity[i] {
            FoulingSeverity::MajorFouling => major_evap_fouling_rows += 1,
            FoulingSeverity::MinorFouling => minor_evap_fouling_rows += 1,
            FoulingSeverity::Clean => {}
        }
        match condenser_severity[i] {
            FoulingSeverity::MajorFouling => major_condenser_fouling_rows += 1,
            FoulingSeverity::MinorFouling => minor_condenser_fouling_rows += 1,
            FoulingSeverity::Clean => {}
        }

        let final_row_confidence = sync.confidence;
        derived.push(DerivedRow {
            sync,
            delta_t_chw: delta_t[i],
            lift: lift[i],
            q_evap_kw: q_evap_kw[i],
            q_confidence: q_confidence[i],
            cop: cop[i],
            cop_confidence: cop_confidence[i],
            cop_carnot: carnot[i],
            cop_normalized: normalized[i],
            hunt_flag: hunt_severity[i] != HuntSeverity::None,
            hunt_severity: hunt_severity[i],
            fouling_evap_pct: evap_pct[i],
            fouling_evap_severity: evap_severity[i],
            fouling_condenser_pct: condenser_pct[i],
            fouling_condenser_severity: condenser_severity[i],
            final_row_confidence,
        });
    }

    let _ = minor_hunt_rows;
    let _ = minor_evap_fouling_rows;
    let _ = minor_condenser_fouling_rows;

    let degradation = -0.02 * major_hunt_rows as f64 + -0.03 * major_evap_fouling_rows as f64;
    let stage4_confidence = (stage3_confidence + degradation).clamp(0.0, 1.0);

    if major_hunt_rows > 0 || major_evap_fouling_rows > 0 {
        let w = Warning::new(
            "STAGE4",
            "DEGRADATION_DETECTED",
            format!("{major_hunt_rows} rows with MAJOR hunting, {major_evap_fouling_rows} rows with MAJOR evaporator fouling"),
            degradation,
        );
        sink.emit_warning(&w);
        warnings.push(w);
    }

    let present_q: Vec<f64> = derived.iter().filter_map(|r| r.q_evap_kw.value()).collect();
    let present_cop: Vec<f64> = derived.iter().filter_map(|r| r.cop.value()).collect();

    Stage4Output {
        rows: derived,
        metrics: Stage4Metrics {
            stage: "SPOC",
            load_analysis: LoadAnalysis { rows_with_load, mean_q_kw: stats::mean(&present_q) },
            cop_analysis: CopAnalysis { rows_with_cop, rows_outside_range: rows_outside_cop_range, mean_cop: stats::mean(&present_cop) },
            hunt_analysis: HuntAnalysis { minor_count: minor_hunt_rows, major_count: major_hunt_rows },
            fouling_analysis: FoulingAnalysis {
                evap_minor_count: minor_evap_fouling_rows,
                evap_major_count: major_evap_fouling_rows,
                condenser_minor_count: minor_condenser_fouling_rows,
                condenser_major_count: major_condenser_fouling_rows,
                baseline_ufoa,
                baseline_lift,
            },
            stage4_confidence,
            warnings,
            halt: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_t_negative_becomes_absent() {
        assert_eq!(compute_delta_t(Sample::present(12.0), Sample::present(7.0)), Sample::absent());
        assert_eq!(compute_delta_t(Sample::present(7.0), Sample::present(12.0)), Sample::present(5.0));
    }

    #[test]
    fn load_identity_matches_flow_times_cp_times_delta_t() {
        let q = compute_load(Sample::present(0.05), Sample::present(5.0));
        assert!((q.value().unwrap() - 1.0465).abs() < 1e-6);
    }

    #[test]
    fn cop_outside_range_is_absent_not_clamped() {
        let cop = compute_cop(Sample::present(1.0465), Sample::present(60.0), (2.0, 7.0));
        assert!(cop.is_absent());
        let cop2 = compute_cop(Sample::present(2.093), Sample::present(1.0), (2.0, 7.0));
        assert_eq!(cop2, Sample::present(2.093));
    }

    #[test]
    fn carnot_cop_uses_kelvin_offset() {
        let carnot = compute_carnot_cop(Sample::present(7.0), Sample::present(21.0));
        assert!((carnot.value().unwrap() - 13.340476).abs() < 1e-5);
    }

    #[test]
    fn constant_series_never_hunts() {
        let rows: Vec<SyncRow> = (0..200)
            .map(|i| {
                let mut streams = std::collections::BTreeMap::new();
                streams.insert(
                    StreamTag::Chwst,
                    crate::types::StreamAlignment { value: Sample::present(7.0), quality: crate::types::AlignQuality::Exact, distance_us: Some(0) },
                );
                SyncRow { timestamp_us: i * 900_000_000, streams, gap_type: crate::types::RowGapType::Valid, confidence: 0.95, exclusion_window_id: None }
            })
            .collect();
        let severities = compute_hunting(&rows, &HuntingConfig::default());
        assert!(severities.iter().all(|s| *s == HuntSeverity::None));
    }
}
