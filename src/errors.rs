//! Error and warning types surfaced by the pipeline (spec.md §7).

use crate::types::StreamTag;
use serde::Serialize;
use thiserror::Error;

/// Configuration load/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("config field {field} has invalid value: {message}")]
    InvalidValue { field: String, message: String },
}

/// Input preconditions the pipeline refuses to run without (spec.md §7: "the
/// pipeline HALTs rather than producing a misleading report").
#[derive(Debug, Error, PartialEq, Clone)]
pub enum PreconditionError {
    #[error("mandatory stream {0} has no samples")]
    MissingMandatoryStream(StreamTag),

    #[error("stream {stream} spans {span_hours:.1}h, below the minimum {minimum_hours:.1}h")]
    InsufficientSpan {
        stream: StreamTag,
        span_hours: f64,
        minimum_hours: f64,
    },

    #[error("{stream} unit could not be determined: {reason}")]
    UnitIndeterminate { stream: StreamTag, reason: String },

    #[error("grid step {grid_step_s}s is not positive")]
    InvalidGridStep { grid_step_s: f64 },
}

/// A pipeline-halting condition detected mid-run (spec.md §4.1, HALT rules).
#[derive(Debug, Error, PartialEq, Clone, Serialize)]
pub enum HaltReason {
    #[error("{fraction:.1}% of {stream} samples violate physical range limits, exceeding the {threshold:.1}% halt threshold")]
    PhysicsViolationRateExceeded {
        stream: StreamTag,
        fraction: f64,
        threshold: f64,
    },

    #[error("relationship check {check} failed on {fraction:.1}% of joined rows, exceeding the {threshold:.1}% halt threshold")]
    RelationshipViolationRateExceeded {
        check: String,
        fraction: f64,
        threshold: f64,
    },

    #[error("overall confidence {confidence:.3} fell below the minimum publishable floor {floor:.3}")]
    ConfidenceFloorBreached { confidence: f64, floor: f64 },

    #[error("{stream} has {count} negative sample(s), which is never physically valid")]
    NegativeValueDetected { stream: StreamTag, count: usize },

    #[error("coverage {coverage_pct:.1}% fell below the minimum {minimum_pct:.1}%")]
    CoverageBelowMinimum { coverage_pct: f64, minimum_pct: f64 },
}

/// A non-halting quality degradation recorded in the Stage 1-4 metrics
/// reports and rolled into the final confidence score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub stage: &'static str,
    pub code: String,
    pub message: String,
    pub penalty: f64,
}

impl Warning {
    #[must_use]
    pub fn new(stage: &'static str, code: impl Into<String>, message: impl Into<String>, penalty: f64) -> Self {
        Self {
            stage,
            code: code.into(),
            message: message.into(),
            penalty,
        }
    }
}

/// A quality-gate violation that does not halt the run but is surfaced to
/// the caller alongside the output (e.g. a stream missing for an otherwise
/// viable row).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{0}")]
pub struct QualityViolation(pub String);

/// The top-level error type returned by [`crate::pipeline::run_pipeline`].
#[derive(Debug, Error)]
pub enum HtdamError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("pipeline halted: {0}")]
    Halted(#[from] HaltReason),

    #[error("unexpected internal fault: {0}")]
    Unexpected(String),
}
