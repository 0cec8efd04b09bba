//! Reversed-standby salvage: classify joined rows by operational state and
//! filter to ACTIVE when the only HALT cause looks like a sensor swap
//! during standby.

use crate::config::SalvageConfig;
use crate::types::{Sample, TimestampUs};

/// Operational-state classification for one joined (timestamp, chwst,
/// chwrt, flow, power) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    Active,
    Standby,
    Off,
}

/// A row with everything `classify_operational_state` needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalvageRow {
    pub timestamp_us: TimestampUs,
    pub chwst: f64,
    pub chwrt: f64,
    pub flow: Sample,
    pub power: Sample,
}

/// Classify a row: ACTIVE takes precedence over OFF when delta-T clears the
/// threshold; otherwise OFF when flow and power are both present and
/// near-zero; otherwise STANDBY.
#[must_use]
pub fn classify_operational_state(row: &SalvageRow, cfg: &SalvageConfig) -> OperationalState {
    let delta_t = row.chwrt - row.chwst;
    let is_active = delta_t >= cfg.active_delta_t_threshold_c;

    let is_off = match (row.flow.value(), row.power.value()) {
        (Some(flow), Some(power)) => {
            flow <= cfg.off_flow_threshold_m3s && power <= cfg.off_power_threshold_kw
        }
        _ => false,
    };

    if is_active {
        OperationalState::Active
    } else if is_off {
        OperationalState::Off
    } else {
        OperationalState::Standby
    }
}

/// Keep only the rows classified ACTIVE.
#[must_use]
pub fn filter_to_active<'a>(
    rows: &'a [SalvageRow],
    cfg: &SalvageConfig,
) -> Vec<&'a SalvageRow> {
    rows.iter()
        .filter(|r| classify_operational_state(r, cfg) == OperationalState::Active)
        .collect()
}

/// Fraction of rows classified ACTIVE.
#[must_use]
pub fn active_ratio(rows: &[SalvageRow], cfg: &SalvageConfig) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let active = rows
        .iter()
        .filter(|r| classify_operational_state(r, cfg) == OperationalState::Active)
        .count();
    active as f64 / rows.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SalvageConfig {
        SalvageConfig {
            active_delta_t_threshold_c: 0.5,
            min_active_ratio: 0.10,
            off_flow_threshold_m3s: 1e-6,
            off_power_threshold_kw: 1e-3,
            salvage_trigger_violation_pct: 50.0,
        }
    }

    #[test]
    fn active_takes_precedence_over_off() {
        let row = SalvageRow {
            timestamp_us: 0,
            chwst: 7.0,
            chwrt: 12.0,
            flow: Sample::present(0.0),
            power: Sample::present(0.0),
        };
        assert_eq!(classify_operational_state(&row, &cfg()), OperationalState::Active);
    }

    #[test]
    fn off_requires_both_flow_and_power_near_zero() {
        let row = SalvageRow {
            timestamp_us: 0,
            chwst: 10.0,
            chwrt: 10.1,
            flow: Sample::present(0.0),
            power: Sample::present(0.0),
        };
        assert_eq!(classify_operational_state(&row, &cfg()), OperationalState::Off);
    }

    #[test]
    fn missing_flow_or_power_prevents_off_classification() {
        let row = SalvageRow {
            timestamp_us: 0,
            chwst: 10.0,
            chwrt: 10.1,
            flow: Sample::absent(),
            power: Sample::present(0.0),
        };
        assert_eq!(classify_operational_state(&row, &cfg()), OperationalState::Standby);
    }
}
