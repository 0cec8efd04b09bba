//! HTDAM — HVAC telemetry data-assimilation pipeline.
//!
//! A deterministic, single-threaded, four-stage batch pipeline that takes
//! raw per-signal BMS time series and produces a uniformly sampled,
//! gap-annotated, physics-validated row table plus a structured quality
//! report and a final scalar confidence. See `SPEC_FULL.md` for the
//! complete module-by-module design.

pub mod config;
pub mod errors;
pub mod pipeline;
pub mod sink;
pub mod stage1;
pub mod stage2;
pub mod stage3;
pub mod stage4;
pub mod stats;
pub mod types;

pub use errors::HtdamError;
pub use pipeline::{run_pipeline, PipelineInput, PipelineOutput, QualityTier};
