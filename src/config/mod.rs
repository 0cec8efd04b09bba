//! Pipeline configuration
//!
//! Every tunable named in the data model is a field here, loaded from TOML
//! with built-in defaults matching the documented values. Unlike a live
//! service, the pipeline entry point also accepts a config by value — there
//! is no forced global — but a `OnceLock`-backed global is still provided
//! for collaborators (a CLI, a report assembler) that want one process-wide
//! configuration without threading it through every call.

pub mod defaults;

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

static HTDAM_CONFIG: OnceLock<HtdamConfig> = OnceLock::new();

/// Initialize the global configuration. Must be called at most once;
/// subsequent calls are ignored with a warning.
pub fn init(config: HtdamConfig) {
    if HTDAM_CONFIG.set(config).is_err() {
        warn!("config::init() called more than once — ignoring");
    }
}

/// Get the global configuration.
///
/// Panics if `init()` has not been called — a missing config is a startup
/// bug, not a recoverable condition.
pub fn get() -> &'static HtdamConfig {
    HTDAM_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}

#[must_use]
pub fn is_initialized() -> bool {
    HTDAM_CONFIG.get().is_some()
}

/// Root configuration record (data model, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtdamConfig {
    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub gap: GapConfig,

    #[serde(default)]
    pub physics: PhysicsConfig,

    #[serde(default)]
    pub salvage: SalvageConfig,

    #[serde(default)]
    pub exclusion: ExclusionConfig,

    #[serde(default)]
    pub confidence: ConfidenceConfig,

    #[serde(default)]
    pub hunting: HuntingConfig,

    #[serde(default)]
    pub fouling: FoulingConfig,
}

impl Default for HtdamConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            gap: GapConfig::default(),
            physics: PhysicsConfig::default(),
            salvage: SalvageConfig::default(),
            exclusion: ExclusionConfig::default(),
            confidence: ConfidenceConfig::default(),
            hunting: HuntingConfig::default(),
            fouling: FoulingConfig::default(),
        }
    }
}

impl HtdamConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HTDAM_CONFIG` environment variable
    /// 2. `./htdam.toml` in the current working directory
    /// 3. Built-in defaults
    #[must_use]
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("HTDAM_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "loaded config from HTDAM_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "failed to load config from HTDAM_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "HTDAM_CONFIG points to a non-existent file, falling back");
            }
        }

        let local = PathBuf::from("htdam.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("loaded config from ./htdam.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "failed to load ./htdam.toml, using defaults");
                }
            }
        }

        info!("no htdam.toml found — using built-in defaults");
        Self::default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field sanity checks. A malformed configuration (negative
    /// grid step, non-increasing quality thresholds) is fatal before any
    /// stage runs (spec §7: configuration error).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.grid_step_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "grid.grid_step_seconds".into(),
                message: "must be positive".into(),
            });
        }
        if self.grid.sync_tolerance_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "grid.sync_tolerance_seconds".into(),
                message: "must be positive".into(),
            });
        }
        let a = &self.grid;
        if !(a.exact_threshold_s < a.close_threshold_s && a.close_threshold_s <= a.interp_threshold_s)
        {
            return Err(ConfigError::InvalidValue {
                field: "grid".into(),
                message: "alignment-quality thresholds must satisfy exact < close <= interp"
                    .into(),
            });
        }
        let g = &self.gap;
        if !(g.normal_factor < g.minor_factor) {
            return Err(ConfigError::InvalidValue {
                field: "gap".into(),
                message: "normal_factor must be less than minor_factor".into(),
            });
        }
        if self.exclusion.min_affecting_streams < 2 {
            return Err(ConfigError::InvalidValue {
                field: "exclusion.min_affecting_streams".into(),
                message: "must be at least 2".into(),
            });
        }
        Ok(())
    }
}

/// Grid construction and alignment-quality thresholds (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "defaults::grid_step_seconds")]
    pub grid_step_seconds: f64,

    #[serde(default = "defaults::sync_tolerance_seconds")]
    pub sync_tolerance_seconds: f64,

    #[serde(default = "defaults::exact_threshold_s")]
    pub exact_threshold_s: f64,

    #[serde(default = "defaults::close_threshold_s")]
    pub close_threshold_s: f64,

    #[serde(default = "defaults::interp_threshold_s")]
    pub interp_threshold_s: f64,

    #[serde(default = "defaults::jitter_cv_tolerance_pct")]
    pub jitter_cv_tolerance_pct: f64,

    #[serde(default = "defaults::min_coverage_pct")]
    pub min_coverage_pct: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            grid_step_seconds: defaults::grid_step_seconds(),
            sync_tolerance_seconds: defaults::sync_tolerance_seconds(),
            exact_threshold_s: defaults::exact_threshold_s(),
            close_threshold_s: defaults::close_threshold_s(),
            interp_threshold_s: defaults::interp_threshold_s(),
            jitter_cv_tolerance_pct: defaults::jitter_cv_tolerance_pct(),
            min_coverage_pct: defaults::min_coverage_pct(),
        }
    }
}

/// Inter-sample interval classification and semantic-change thresholds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    #[serde(default = "defaults::normal_factor")]
    pub normal_factor: f64,

    #[serde(default = "defaults::minor_factor")]
    pub minor_factor: f64,

    #[serde(default = "defaults::cov_relative_tolerance_pct")]
    pub cov_relative_tolerance_pct: f64,

    #[serde(default = "defaults::sensor_anomaly_abs_jump")]
    pub sensor_anomaly_abs_jump: f64,

    #[serde(default = "defaults::near_zero_epsilon")]
    pub near_zero_epsilon: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            normal_factor: defaults::normal_factor(),
            minor_factor: defaults::minor_factor(),
            cov_relative_tolerance_pct: defaults::cov_relative_tolerance_pct(),
            sensor_anomaly_abs_jump: defaults::sensor_anomaly_abs_jump(),
            near_zero_epsilon: defaults::near_zero_epsilon(),
        }
    }
}

/// Per-channel physical range and relationship-check bounds (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default = "defaults::chwst_range")]
    pub chwst_range_c: (f64, f64),

    #[serde(default = "defaults::chwrt_range")]
    pub chwrt_range_c: (f64, f64),

    #[serde(default = "defaults::cdwrt_range")]
    pub cdwrt_range_c: (f64, f64),

    #[serde(default = "defaults::halt_violation_pct")]
    pub halt_violation_pct: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            chwst_range_c: defaults::chwst_range(),
            chwrt_range_c: defaults::chwrt_range(),
            cdwrt_range_c: defaults::cdwrt_range(),
            halt_violation_pct: defaults::halt_violation_pct(),
        }
    }
}

/// Reversed-standby salvage thresholds (§4.1 salvage rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalvageConfig {
    #[serde(default = "defaults::active_delta_t_threshold")]
    pub active_delta_t_threshold_c: f64,

    #[serde(default = "defaults::min_active_ratio")]
    pub min_active_ratio: f64,

    #[serde(default = "defaults::off_flow_threshold")]
    pub off_flow_threshold_m3s: f64,

    #[serde(default = "defaults::off_power_threshold")]
    pub off_power_threshold_kw: f64,

    #[serde(default = "defaults::salvage_halt_violation_pct")]
    pub salvage_trigger_violation_pct: f64,
}

impl Default for SalvageConfig {
    fn default() -> Self {
        Self {
            active_delta_t_threshold_c: defaults::active_delta_t_threshold(),
            min_active_ratio: defaults::min_active_ratio(),
            off_flow_threshold_m3s: defaults::off_flow_threshold(),
            off_power_threshold_kw: defaults::off_power_threshold(),
            salvage_trigger_violation_pct: defaults::salvage_halt_violation_pct(),
        }
    }
}

/// Multi-stream exclusion-window detection thresholds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionConfig {
    #[serde(default = "defaults::min_affecting_streams")]
    pub min_affecting_streams: usize,

    #[serde(default = "defaults::min_overlap_hours")]
    pub min_overlap_hours: f64,

    #[serde(default = "defaults::treat_pending_as_effective")]
    pub treat_pending_as_effective: bool,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            min_affecting_streams: defaults::min_affecting_streams(),
            min_overlap_hours: defaults::min_overlap_hours(),
            treat_pending_as_effective: defaults::treat_pending_as_effective(),
        }
    }
}

/// Confidence-penalty constants shared by all four stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "defaults::gap_penalty_minor")]
    pub gap_penalty_minor: f64,

    #[serde(default = "defaults::gap_penalty_anomaly")]
    pub gap_penalty_anomaly: f64,

    #[serde(default = "defaults::gap_penalty_excluded")]
    pub gap_penalty_excluded: f64,

    #[serde(default = "defaults::cop_min")]
    pub cop_min: f64,

    #[serde(default = "defaults::cop_max")]
    pub cop_max: f64,

    /// Final confidence roll-up rule: `true` uses the minimum-of-stages
    /// rule (default), `false` uses the weighted sum in `stage_weights`.
    #[serde(default = "defaults::use_minimum_rollup")]
    pub use_minimum_rollup: bool,

    #[serde(default = "defaults::stage_weights")]
    pub stage_weights: [f64; 4],
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            gap_penalty_minor: defaults::gap_penalty_minor(),
            gap_penalty_anomaly: defaults::gap_penalty_anomaly(),
            gap_penalty_excluded: defaults::gap_penalty_excluded(),
            cop_min: defaults::cop_min(),
            cop_max: defaults::cop_max(),
            use_minimum_rollup: defaults::use_minimum_rollup(),
            stage_weights: defaults::stage_weights(),
        }
    }
}

/// Sliding-window hunting-detection parameters (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntingConfig {
    #[serde(default = "defaults::hunt_window_hours")]
    pub hunt_window_hours: f64,

    #[serde(default = "defaults::hunt_cycle_min_count")]
    pub hunt_cycle_min_count: usize,

    #[serde(default = "defaults::hunt_minor_cycles_per_hour")]
    pub hunt_minor_cycles_per_hour: f64,

    #[serde(default = "defaults::hunt_major_cycles_per_hour")]
    pub hunt_major_cycles_per_hour: f64,
}

impl Default for HuntingConfig {
    fn default() -> Self {
        Self {
            hunt_window_hours: defaults::hunt_window_hours(),
            hunt_cycle_min_count: defaults::hunt_cycle_min_count(),
            hunt_minor_cycles_per_hour: defaults::hunt_minor_cycles_per_hour(),
            hunt_major_cycles_per_hour: defaults::hunt_major_cycles_per_hour(),
        }
    }
}

/// Evaporator/condenser fouling-severity thresholds (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoulingConfig {
    #[serde(default = "defaults::baseline_fraction")]
    pub baseline_fraction: f64,

    #[serde(default = "defaults::fouling_evap_minor_pct")]
    pub fouling_evap_minor_pct: f64,

    #[serde(default = "defaults::fouling_evap_major_pct")]
    pub fouling_evap_major_pct: f64,

    #[serde(default = "defaults::fouling_condenser_minor_pct")]
    pub fouling_condenser_minor_pct: f64,

    #[serde(default = "defaults::fouling_condenser_major_pct")]
    pub fouling_condenser_major_pct: f64,
}

impl Default for FoulingConfig {
    fn default() -> Self {
        Self {
            baseline_fraction: defaults::baseline_fraction(),
            fouling_evap_minor_pct: defaults::fouling_evap_minor_pct(),
            fouling_evap_major_pct: defaults::fouling_evap_major_pct(),
            fouling_condenser_minor_pct: defaults::fouling_condenser_minor_pct(),
            fouling_condenser_major_pct: defaults::fouling_condenser_major_pct(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(HtdamConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_grid_step_rejected() {
        let mut cfg = HtdamConfig::default();
        cfg.grid.grid_step_seconds = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn misordered_quality_thresholds_rejected() {
        let mut cfg = HtdamConfig::default();
        cfg.grid.close_threshold_s = cfg.grid.exact_threshold_s;
        assert!(cfg.validate().is_err());
    }
}
