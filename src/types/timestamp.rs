//! Instant representation: microseconds since the Unix epoch.
//!
//! Integer microsecond arithmetic is used instead of floating-point epoch
//! seconds (as the original Python prototype used) so that grid-ceiling and
//! interval arithmetic in Stage 3 is exact — see SPEC_FULL.md §3.

/// Microseconds since the Unix epoch. Monotonic increasing within a stream.
pub type TimestampUs = i64;

/// One million microseconds per second.
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// Convert a duration in seconds (as used throughout the spec's prose) to
/// microseconds, rounding toward the nearest microsecond.
#[must_use]
pub fn secs_to_micros(seconds: f64) -> i64 {
    (seconds * MICROS_PER_SEC as f64).round() as i64
}

/// Convert a microsecond duration back to seconds for reporting.
#[must_use]
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SEC as f64
}
