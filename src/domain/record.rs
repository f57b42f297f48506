use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;
use super::weather::WeatherObservation;

/// A single persisted telemetry row: one snapshot at one point in time for
/// one system, optionally joined with the weather observed at that moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRecord {
    pub system_id: String,
    pub timestamp: DateTime<Utc>,
    pub analysis: Snapshot,
    pub weather: Option<WeatherObservation>,
    pub alerts: Vec<String>,
}

impl HistoricalRecord {
    /// Hours between this record and the next one, or `None` if either
    /// timestamp is missing an ordering relationship can't be established.
    pub fn hours_since(&self, earlier: &HistoricalRecord) -> f64 {
        (self.timestamp - earlier.timestamp).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// A Δt between two adjacent records, clamped to the integrable window
/// `(0, 2h]` per the energy-integration invariant. Deltas outside this
/// window are dropped by callers rather than silently clamped to the
/// boundary, since a multi-hour gap is a real discontinuity in the data.
pub fn clamped_delta_hours(dt_hours: f64) -> Option<f64> {
    if dt_hours > 0.0 && dt_hours <= 2.0 {
        Some(dt_hours)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_at(ts: DateTime<Utc>) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot::default(),
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn clamp_drops_out_of_range_deltas() {
        assert_eq!(clamped_delta_hours(0.0), None);
        assert_eq!(clamped_delta_hours(2.0), Some(2.0));
        assert_eq!(clamped_delta_hours(2.0001), None);
        assert_eq!(clamped_delta_hours(-1.0), None);
    }

    #[test]
    fn hours_since_computes_positive_gap() {
        let t0 = Utc::now();
        let a = record_at(t0);
        let b = record_at(t0 + Duration::minutes(90));
        assert!((b.hours_since(&a) - 1.5).abs() < 1e-9);
    }
}
