use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The most recent instantaneous BMS reading.
///
/// Every field is optional: the engine must never treat a missing reading as
/// zero. Units are documented per-field since the wire format is a flat
/// JSON object with no unit suffixes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Overall pack voltage, volts.
    pub voltage: Option<f64>,
    /// Pack current, amps. Positive = charging, negative = discharging.
    pub current: Option<f64>,
    /// Instantaneous power, watts.
    pub power: Option<f64>,
    /// State of charge, 0-100.
    pub soc: Option<f64>,
    /// Remaining capacity, amp-hours.
    pub remaining_capacity_ah: Option<f64>,
    /// Full (rated-at-last-calibration) capacity, amp-hours.
    pub full_capacity_ah: Option<f64>,
    /// Per-cell voltages, ordered by cell index.
    pub cell_voltages: Option<Vec<f64>>,
    /// Max-min cell voltage spread, volts.
    pub cell_voltage_diff: Option<f64>,
    /// Pack temperature, degrees Celsius.
    pub temperature_c: Option<f64>,
    /// MOSFET/switch temperature, degrees Celsius.
    pub mos_temperature_c: Option<f64>,
    /// Lifetime full charge/discharge cycle count.
    pub cycle_count: Option<u32>,
    /// Chemistry tag, e.g. "LiFePO4".
    pub chemistry: Option<String>,
    /// When this reading was taken.
    pub timestamp: Option<DateTime<Utc>>,
    /// Active alert tags at the time of the reading.
    pub alerts: Vec<String>,
}

impl Snapshot {
    pub fn is_discharging(&self, threshold_a: f64) -> bool {
        self.current.is_some_and(|i| i < -threshold_a)
    }

    pub fn is_charging(&self, threshold_a: f64) -> bool {
        self.current.is_some_and(|i| i > threshold_a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_has_no_sentinels() {
        let s = Snapshot::default();
        assert!(s.voltage.is_none());
        assert!(s.soc.is_none());
        assert!(s.alerts.is_empty());
    }

    #[test]
    fn charging_and_discharging_thresholds() {
        let mut s = Snapshot::default();
        s.current = Some(-12.0);
        assert!(s.is_discharging(0.5));
        assert!(!s.is_charging(0.5));

        s.current = Some(3.0);
        assert!(s.is_charging(0.5));
        assert!(!s.is_discharging(0.5));
    }
}
