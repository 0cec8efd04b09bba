//! The closed set of telemetry stream tags the pipeline recognizes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BMS-measured signal tag. Closed set per spec.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StreamTag {
    /// Chilled-water supply temperature (°C canonical).
    Chwst,
    /// Chilled-water return temperature (°C canonical).
    Chwrt,
    /// Condenser-water return temperature (°C canonical).
    Cdwrt,
    /// Chilled-water volumetric flow (m³/s canonical).
    Flow,
    /// Electrical power (kW canonical).
    Power,
}

impl StreamTag {
    /// All five recognized streams, in the canonical row order (spec.md §3).
    pub const ALL: [StreamTag; 5] = [
        StreamTag::Chwst,
        StreamTag::Chwrt,
        StreamTag::Cdwrt,
        StreamTag::Flow,
        StreamTag::Power,
    ];

    /// The three streams required for a row to be VALID.
    pub const MANDATORY: [StreamTag; 3] = [StreamTag::Chwst, StreamTag::Chwrt, StreamTag::Cdwrt];

    /// Streams required for load/COP derivation but not for row validity.
    pub const OPTIONAL: [StreamTag; 2] = [StreamTag::Flow, StreamTag::Power];

    #[must_use]
    pub fn is_mandatory(self) -> bool {
        Self::MANDATORY.contains(&self)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTag::Chwst => "CHWST",
            StreamTag::Chwrt => "CHWRT",
            StreamTag::Cdwrt => "CDWRT",
            StreamTag::Flow => "FLOW",
            StreamTag::Power => "POWER",
        }
    }

    /// Is this a temperature channel (as opposed to flow/power)?
    #[must_use]
    pub fn is_temperature(self) -> bool {
        matches!(self, StreamTag::Chwst | StreamTag::Chwrt | StreamTag::Cdwrt)
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_set_matches_spec() {
        for s in StreamTag::MANDATORY {
            assert!(s.is_mandatory());
        }
        for s in StreamTag::OPTIONAL {
            assert!(!s.is_mandatory());
        }
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(StreamTag::Chwst.to_string(), "CHWST");
    }
}
