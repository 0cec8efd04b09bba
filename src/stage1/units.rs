//! Source-unit detection and conversion to canonical SI units (°C, m³/s, kW).

use crate::stats::percentile;
use crate::types::{Sample, StreamTag};

/// A recognized source unit. Closed set — every detectable/convertible unit
/// a channel can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedUnit {
    TempC,
    TempF,
    TempK,
    FlowM3s,
    FlowLs,
    FlowM3h,
    FlowGpm,
    PowerKw,
    PowerW,
    PowerMw,
}

impl DetectedUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DetectedUnit::TempC => "C",
            DetectedUnit::TempF => "F",
            DetectedUnit::TempK => "K",
            DetectedUnit::FlowM3s => "m3/s",
            DetectedUnit::FlowLs => "L/s",
            DetectedUnit::FlowM3h => "m3/h",
            DetectedUnit::FlowGpm => "GPM",
            DetectedUnit::PowerKw => "kW",
            DetectedUnit::PowerW => "W",
            DetectedUnit::PowerMw => "MW",
        }
    }

    /// Parse an explicit hint string (from a column name or external
    /// metadata) into a unit recognized for `stream`'s category. Returns
    /// `None` if the hint doesn't parse for this category.
    #[must_use]
    pub fn from_hint(stream: StreamTag, hint: &str) -> Option<Self> {
        let normalized = hint.trim().to_uppercase().replace('°', "");
        if stream.is_temperature() {
            return match normalized.as_str() {
                "C" | "CELSIUS" | "DEGC" => Some(DetectedUnit::TempC),
                "F" | "FAHRENHEIT" | "DEGF" => Some(DetectedUnit::TempF),
                "K" | "KELVIN" => Some(DetectedUnit::TempK),
                _ => None,
            };
        }
        match stream {
            StreamTag::Flow => match normalized.as_str() {
                "M3/S" | "M3S" => Some(DetectedUnit::FlowM3s),
                "L/S" | "LS" | "LPS" => Some(DetectedUnit::FlowLs),
                "M3/H" | "M3H" => Some(DetectedUnit::FlowM3h),
                "GPM" => Some(DetectedUnit::FlowGpm),
                _ => None,
            },
            StreamTag::Power => match normalized.as_str() {
                "KW" => Some(DetectedUnit::PowerKw),
                "W" | "WATT" => Some(DetectedUnit::PowerW),
                "MW" | "MEGAWATT" => Some(DetectedUnit::PowerMw),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Temperature range bands used by the percentile heuristic (°C-equivalent).
const TEMP_C_RANGE: (f64, f64) = (3.0, 45.0);
const TEMP_F_RANGE: (f64, f64) = (37.0, 113.0);
const TEMP_K_RANGE: (f64, f64) = (276.0, 318.0);

const FLOW_M3S_MAX: f64 = 5.0;
const FLOW_LS_MAX: f64 = 5000.0;
const FLOW_M3H_MAX: f64 = 18000.0;
const FLOW_GPM_MAX: f64 = 80000.0;

const POWER_W_LOWER_THRESHOLD: f64 = 1000.0;
const POWER_MW_UPPER_THRESHOLD: f64 = 10.0;

const CONFIDENCE_HINT: f64 = 0.95;
const CONFIDENCE_MATCHED: f64 = 0.80;
const CONFIDENCE_WIDEST: f64 = 0.70;

/// Outcome of unit detection for one stream: the detected unit (if any),
/// its confidence, and whether it came from a hint (`was_inferred = false`)
/// or was inferred from the value distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDetection {
    pub unit: Option<DetectedUnit>,
    pub detection_confidence: f64,
    pub was_inferred: bool,
}

/// Detect the source unit of `stream` from its present values, preferring
/// an explicit `hint` when one parses.
#[must_use]
pub fn detect_unit(stream: StreamTag, values: &[Sample], hint: Option<&str>) -> UnitDetection {
    if let Some(hint_str) = hint {
        if let Some(unit) = DetectedUnit::from_hint(stream, hint_str) {
            return UnitDetection {
                unit: Some(unit),
                detection_confidence: CONFIDENCE_HINT,
                was_inferred: false,
            };
        }
    }

    let present: Vec<f64> = values.iter().filter_map(Sample::value).collect();
    if present.is_empty() {
        return UnitDetection {
            unit: None,
            detection_confidence: 0.0,
            was_inferred: true,
        };
    }

    let detection = if stream.is_temperature() {
        detect_temperature_unit(&present)
    } else if stream == StreamTag::Flow {
        detect_flow_unit(&present)
    } else {
        detect_power_unit(&present)
    };

    UnitDetection {
        unit: detection.0,
        detection_confidence: detection.1,
        was_inferred: true,
    }
}

fn detect_temperature_unit(values: &[f64]) -> (Option<DetectedUnit>, f64) {
    let p995 = percentile(values, 99.5);
    let p05 = percentile(values, 0.5);
    let in_range = |(lo, hi): (f64, f64)| lo <= p05 && p05 <= hi && lo <= p995 && p995 <= hi;

    if in_range(TEMP_C_RANGE) {
        (Some(DetectedUnit::TempC), CONFIDENCE_MATCHED)
    } else if in_range(TEMP_F_RANGE) {
        (Some(DetectedUnit::TempF), CONFIDENCE_MATCHED)
    } else if in_range(TEMP_K_RANGE) {
        (Some(DetectedUnit::TempK), CONFIDENCE_MATCHED)
    } else {
        (None, 0.0)
    }
}

fn detect_flow_unit(values: &[f64]) -> (Option<DetectedUnit>, f64) {
    let p995 = percentile(values, 99.5);
    if p995 < FLOW_M3S_MAX {
        (Some(DetectedUnit::FlowM3s), CONFIDENCE_MATCHED)
    } else if p995 < FLOW_LS_MAX {
        (Some(DetectedUnit::FlowLs), CONFIDENCE_MATCHED)
    } else if p995 < FLOW_M3H_MAX {
        (Some(DetectedUnit::FlowM3h), CONFIDENCE_MATCHED)
    } else if p995 < FLOW_GPM_MAX {
        (Some(DetectedUnit::FlowGpm), CONFIDENCE_WIDEST)
    } else {
        (None, 0.0)
    }
}

fn detect_power_unit(values: &[f64]) -> (Option<DetectedUnit>, f64) {
    let p995 = percentile(values, 99.5);
    let p05 = percentile(values, 5.0);
    if p05 > POWER_W_LOWER_THRESHOLD {
        (Some(DetectedUnit::PowerW), CONFIDENCE_MATCHED)
    } else if p995 < POWER_MW_UPPER_THRESHOLD {
        (Some(DetectedUnit::PowerMw), CONFIDENCE_WIDEST)
    } else {
        (Some(DetectedUnit::PowerKw), CONFIDENCE_MATCHED)
    }
}

/// Convert a full stream of samples from `unit` to the channel's canonical
/// SI unit. Absent samples stay absent.
#[must_use]
pub fn convert_to_canonical(values: &[Sample], unit: DetectedUnit) -> Vec<Sample> {
    match unit {
        DetectedUnit::TempC => values.to_vec(),
        DetectedUnit::TempF => values.iter().map(|s| s.map(|v| (v - 32.0) * 5.0 / 9.0)).collect(),
        DetectedUnit::TempK => values.iter().map(|s| s.map(|v| v - 273.15)).collect(),
        DetectedUnit::FlowM3s => values.to_vec(),
        DetectedUnit::FlowLs => values.iter().map(|s| s.map(|v| v * 1e-3)).collect(),
        DetectedUnit::FlowGpm => values.iter().map(|s| s.map(|v| v * 6.309_02e-5)).collect(),
        DetectedUnit::FlowM3h => values.iter().map(|s| s.map(|v| v / 3600.0)).collect(),
        DetectedUnit::PowerKw => values.to_vec(),
        DetectedUnit::PowerW => values.iter().map(|s| s.map(|v| v * 1e-3)).collect(),
        DetectedUnit::PowerMw => values.iter().map(|s| s.map(|v| v * 1000.0)).collect(),
    }
}

/// Convert a single canonical value back to `unit` — the inverse of
/// [`convert_to_canonical`], used by the unit-conversion round-trip
/// property test.
#[must_use]
pub fn convert_from_canonical(value: f64, unit: DetectedUnit) -> f64 {
    match unit {
        DetectedUnit::TempC | DetectedUnit::FlowM3s | DetectedUnit::PowerKw => value,
        DetectedUnit::TempF => value * 9.0 / 5.0 + 32.0,
        DetectedUnit::TempK => value + 273.15,
        DetectedUnit::FlowLs => value / 1e-3,
        DetectedUnit::FlowGpm => value / 6.309_02e-5,
        DetectedUnit::FlowM3h => value * 3600.0,
        DetectedUnit::PowerW => value / 1e-3,
        DetectedUnit::PowerMw => value / 1000.0,
    }
}
