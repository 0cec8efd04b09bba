//! Built-in default values, one function per config field so `serde(default
//! = "...")` can reference them individually. Grouped by subsystem.

// ============================================================================
// Grid / alignment
// ============================================================================

pub fn grid_step_seconds() -> f64 {
    900.0
}

pub fn sync_tolerance_seconds() -> f64 {
    1800.0
}

pub fn exact_threshold_s() -> f64 {
    60.0
}

pub fn close_threshold_s() -> f64 {
    300.0
}

/// Inclusive per the Open Questions resolution in DESIGN.md.
pub fn interp_threshold_s() -> f64 {
    1800.0
}

pub fn jitter_cv_tolerance_pct() -> f64 {
    5.0
}

pub fn min_coverage_pct() -> f64 {
    50.0
}

// ============================================================================
// Gap classification
// ============================================================================

pub fn normal_factor() -> f64 {
    1.5
}

pub fn minor_factor() -> f64 {
    4.0
}

pub fn cov_relative_tolerance_pct() -> f64 {
    0.5
}

pub fn sensor_anomaly_abs_jump() -> f64 {
    5.0
}

/// Denominator guard for the COV relative-change calculation; small enough
/// that any non-negligible absolute change against a near-zero baseline
/// pushes `rel_pct` past the COV tolerance into SENSOR_ANOMALY territory.
pub fn near_zero_epsilon() -> f64 {
    1e-6
}

// ============================================================================
// Physics ranges (canonical SI units)
// ============================================================================

pub fn chwst_range() -> (f64, f64) {
    (3.0, 20.0)
}

pub fn chwrt_range() -> (f64, f64) {
    (5.0, 30.0)
}

pub fn cdwrt_range() -> (f64, f64) {
    (15.0, 45.0)
}

pub fn halt_violation_pct() -> f64 {
    1.0
}

// ============================================================================
// Salvage (reversed-standby recovery)
// ============================================================================

pub fn active_delta_t_threshold() -> f64 {
    0.5
}

pub fn min_active_ratio() -> f64 {
    0.10
}

pub fn off_flow_threshold() -> f64 {
    1e-6
}

pub fn off_power_threshold() -> f64 {
    1e-3
}

pub fn salvage_halt_violation_pct() -> f64 {
    50.0
}

// ============================================================================
// Exclusion windows
// ============================================================================

pub fn min_affecting_streams() -> usize {
    2
}

pub fn min_overlap_hours() -> f64 {
    8.0
}

/// Open Questions: the source alternates between halting on pending
/// approval and treating it as effective; this crate adopts "effective".
pub fn treat_pending_as_effective() -> bool {
    true
}

// ============================================================================
// Confidence
// ============================================================================

pub fn gap_penalty_minor() -> f64 {
    -0.02
}

pub fn gap_penalty_anomaly() -> f64 {
    -0.05
}

pub fn gap_penalty_excluded() -> f64 {
    -0.03
}

pub fn cop_min() -> f64 {
    2.0
}

pub fn cop_max() -> f64 {
    7.0
}

pub fn use_minimum_rollup() -> bool {
    true
}

/// Weighted-rollup alternative (Stage1, Stage2, Stage3, Stage4), used only
/// when `use_minimum_rollup` is false.
pub fn stage_weights() -> [f64; 4] {
    [0.10, 0.15, 0.25, 0.50]
}

// ============================================================================
// Hunting
// ============================================================================

pub fn hunt_window_hours() -> f64 {
    24.0
}

pub fn hunt_cycle_min_count() -> usize {
    3
}

pub fn hunt_minor_cycles_per_hour() -> f64 {
    0.2
}

pub fn hunt_major_cycles_per_hour() -> f64 {
    1.0
}

// ============================================================================
// Fouling
// ============================================================================

pub fn baseline_fraction() -> f64 {
    0.20
}

pub fn fouling_evap_minor_pct() -> f64 {
    10.0
}

pub fn fouling_evap_major_pct() -> f64 {
    25.0
}

pub fn fouling_condenser_minor_pct() -> f64 {
    5.0
}

pub fn fouling_condenser_major_pct() -> f64 {
    15.0
}
