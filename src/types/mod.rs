//! Core data model shared across all four stages.

mod exclusion;
mod gap;
mod quality;
mod raw;
mod row;
mod sample;
mod stream;
mod timestamp;

pub use exclusion::{ExclusionStatus, ExclusionWindow};
pub use gap::{GapClass, GapSemantic, RowGapType};
pub use quality::AlignQuality;
pub use raw::{RawPoint, RawStream};
pub use row::{DerivedRow, FoulingSeverity, HuntSeverity, StreamAlignment, SyncRow};
pub use sample::Sample;
pub use stream::StreamTag;
pub use timestamp::{micros_to_secs, secs_to_micros, TimestampUs, MICROS_PER_SEC};
