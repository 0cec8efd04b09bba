//! The side-effecting capability boundary each stage is injected with
//! (Design Notes §9: "hook/pure-function split ... reuse the spirit").
//!
//! A stage never performs logging or I/O itself beyond `tracing` events; it
//! calls into this trait for anything a caller might want to observe or
//! collect. [`NullSink`] lets every stage run headless in tests.

use crate::errors::Warning;

/// Observability hooks a stage calls into while it runs. Implementations
/// are free to forward to a report assembler, a metrics backend, or
/// nowhere at all.
pub trait MetricsSink {
    /// A non-halting quality degradation was recorded.
    fn emit_warning(&mut self, warning: &Warning) {
        let _ = warning;
    }

    /// A halting condition was detected in `stage`.
    fn emit_error(&mut self, stage: &str, message: &str) {
        let _ = (stage, message);
    }

    /// A scalar metric worth tracking outside the returned report (e.g. for
    /// a dashboard), keyed by a dotted path like `"stage3.coverage_pct"`.
    fn record_metric(&mut self, key: &str, value: f64) {
        let _ = (key, value);
    }
}

/// No-op sink for pure unit testing and for callers with no observability
/// needs.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_does_nothing() {
        let mut sink = NullSink;
        sink.emit_warning(&Warning::new("STAGE1", "X", "test", 0.0));
        sink.emit_error("STAGE1", "test");
        sink.record_metric("x", 1.0);
    }
}
