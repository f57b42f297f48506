use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use super::stats::{mean, std_dev};
use crate::domain::HistoricalRecord;

const MIN_RECORDS: usize = 50;
const OUTLIER_SIGMA: f64 = 3.0;
const RAPID_SOC_DELTA_PCT: f64 = 20.0;
const RAPID_SOC_WINDOW_HOURS: f64 = 1.0;
const TEMP_CRITICAL_LOW: f64 = 0.0;
const TEMP_CRITICAL_HIGH: f64 = 45.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub field: String,
    pub value: f64,
    pub severity: Severity,
    pub description: String,
}

fn collect_field<'a>(
    records: &'a [HistoricalRecord],
    extract: impl Fn(&'a HistoricalRecord) -> Option<f64>,
) -> Vec<(DateTime<Utc>, f64)> {
    records
        .iter()
        .filter_map(|r| extract(r).map(|v| (r.timestamp, v)))
        .collect()
}

fn statistical_outliers(
    field: &str,
    points: &[(DateTime<Utc>, f64)],
    severity_for: impl Fn(f64) -> Severity,
) -> Vec<Anomaly> {
    if points.len() < 2 {
        return Vec::new();
    }
    let values: Vec<f64> = points.iter().map(|p| p.1).collect();
    let m = mean(&values);
    let sd = std_dev(&values);
    if sd.abs() < 1e-9 {
        return Vec::new();
    }
    points
        .iter()
        .filter(|(_, v)| ((v - m) / sd).abs() > OUTLIER_SIGMA)
        .map(|(ts, v)| Anomaly {
            timestamp: *ts,
            field: field.to_string(),
            value: *v,
            severity: severity_for(*v),
            description: format!("{field} reading {v:.2} is more than {OUTLIER_SIGMA} standard deviations from the window mean ({m:.2})"),
        })
        .collect()
}

fn temperature_severity(value: f64) -> Severity {
    if value < TEMP_CRITICAL_LOW || value > TEMP_CRITICAL_HIGH {
        Severity::Critical
    } else {
        Severity::Medium
    }
}

pub fn analyze(records: &[HistoricalRecord]) -> AnalysisOutcome<Vec<Anomaly>> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "anomaly detection needs at least 50 points",
    ) {
        return insufficient;
    }

    let mut anomalies = Vec::new();

    let voltage_points = collect_field(records, |r| r.analysis.voltage);
    anomalies.extend(statistical_outliers("voltage", &voltage_points, |_| Severity::High));

    let current_points = collect_field(records, |r| r.analysis.current);
    anomalies.extend(statistical_outliers("current", &current_points, |_| Severity::Medium));

    let temp_points = collect_field(records, |r| r.analysis.temperature_c);
    anomalies.extend(statistical_outliers("temperature_c", &temp_points, temperature_severity));

    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (Some(soc_a), Some(soc_b)) = (a.analysis.soc, b.analysis.soc) else {
            continue;
        };
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        if dt_hours <= 0.0 || dt_hours >= RAPID_SOC_WINDOW_HOURS {
            continue;
        }
        let delta = (soc_b - soc_a).abs();
        if delta > RAPID_SOC_DELTA_PCT {
            anomalies.push(Anomaly {
                timestamp: b.timestamp,
                field: "soc".to_string(),
                value: soc_b,
                severity: Severity::High,
                description: format!(
                    "state of charge moved {delta:.1}% in {dt_hours:.2}h, faster than expected for normal use"
                ),
            });
        }
    }

    anomalies.sort_by_key(|a| a.timestamp);
    AnalysisOutcome::Ok(anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::Duration;

    fn record(ts: DateTime<Utc>, voltage: f64, soc: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                voltage: Some(voltage),
                soc: Some(soc),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn insufficient_data_below_50_points() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..10).map(|i| record(t0 + Duration::hours(i), 52.0, 50.0)).collect();
        assert!(matches!(
            analyze(&records),
            AnalysisOutcome::InsufficientData { minimum_required: 50, actual: 10, .. }
        ));
    }

    #[test]
    fn detects_voltage_outlier() {
        let t0 = Utc::now();
        let mut records: Vec<_> = (0..60).map(|i| record(t0 + Duration::hours(i), 52.0, 50.0)).collect();
        records[30] = record(t0 + Duration::hours(30), 90.0, 50.0);
        let outcome = analyze(&records);
        match outcome {
            AnalysisOutcome::Ok(anomalies) => {
                assert!(anomalies.iter().any(|a| a.field == "voltage" && a.severity == Severity::High));
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn detects_rapid_soc_change() {
        let t0 = Utc::now();
        let mut records: Vec<_> = (0..60).map(|i| record(t0 + Duration::hours(i), 52.0, 50.0)).collect();
        records[31] = record(t0 + Duration::hours(30) + Duration::minutes(30), 52.0, 20.0);
        let outcome = analyze(&records);
        match outcome {
            AnalysisOutcome::Ok(anomalies) => {
                assert!(anomalies.iter().any(|a| a.field == "soc" && a.severity == Severity::High));
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
