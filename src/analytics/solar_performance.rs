use chrono::Timelike;
use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use crate::domain::{clamped_delta_hours, HistoricalRecord, SystemProfile};

const MIN_RECORDS: usize = 24;
const CHARGE_THRESHOLD_A: f64 = 0.5;
const DAY_START_HOUR: u32 = 6;
const DAY_END_HOUR: u32 = 18;
const EXPECTED_SUN_HOURS: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SolarRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolarPerformance {
    pub expected_daily_wh: f64,
    pub actual_avg_daily_wh: f64,
    pub performance_ratio_pct: f64,
    pub rating: SolarRating,
}

fn is_daytime(hour: u32) -> bool {
    hour >= DAY_START_HOUR && hour < DAY_END_HOUR
}

pub fn analyze(
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<SolarPerformance> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "solar performance needs at least 24 records",
    ) {
        return insufficient;
    }

    let Some(max_solar_current) = profile.and_then(|p| p.max_solar_charge_current) else {
        return AnalysisOutcome::insufficient(
            1,
            0,
            "system has no configured solar charge capacity",
        );
    };
    let nominal_voltage = profile.map(|p| p.nominal_voltage).unwrap_or(0.0);

    let mut total_solar_wh = 0.0;
    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let Some(dt) = clamped_delta_hours(dt_hours) else {
            continue;
        };
        let current = a.analysis.current.unwrap_or(0.0);
        if current <= CHARGE_THRESHOLD_A || !is_daytime(a.timestamp.hour()) {
            continue;
        }
        let watts = a
            .analysis
            .power
            .unwrap_or(current * a.analysis.voltage.unwrap_or(nominal_voltage));
        total_solar_wh += watts.abs() * dt;
    }

    let span_hours = (records.last().unwrap().timestamp - records.first().unwrap().timestamp)
        .num_milliseconds() as f64
        / 3_600_000.0;
    let days_span = (span_hours / 24.0).max(1.0 / 24.0);

    let actual_avg_daily_wh = total_solar_wh / days_span;
    let expected_daily_wh = max_solar_current * nominal_voltage * EXPECTED_SUN_HOURS;

    let performance_ratio_pct = if expected_daily_wh.abs() > 1e-6 {
        actual_avg_daily_wh / expected_daily_wh * 100.0
    } else {
        0.0
    };

    let rating = if performance_ratio_pct >= 80.0 {
        SolarRating::Excellent
    } else if performance_ratio_pct >= 60.0 {
        SolarRating::Good
    } else if performance_ratio_pct >= 40.0 {
        SolarRating::Fair
    } else {
        SolarRating::Poor
    };

    AnalysisOutcome::Ok(SolarPerformance {
        expected_daily_wh,
        actual_avg_daily_wh,
        performance_ratio_pct,
        rating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoLocation, Snapshot};
    use chrono::{Duration, Utc};

    fn profile() -> SystemProfile {
        SystemProfile {
            id: "sys-1".into(),
            name: "Test".into(),
            chemistry: Some("LiFePO4".into()),
            nominal_voltage: 48.0,
            rated_capacity_ah: 200.0,
            max_solar_charge_current: Some(40.0),
            max_generator_charge_current: None,
            location: None::<GeoLocation>,
            associated_devices: vec![],
        }
    }

    fn record(ts: chrono::DateTime<Utc>, current: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                current: Some(current),
                voltage: Some(48.0),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn missing_solar_capacity_is_insufficient() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..30)
            .map(|i| record(t0 + Duration::hours(i), 10.0))
            .collect();
        assert!(matches!(
            analyze(&records, None),
            AnalysisOutcome::InsufficientData { .. }
        ));
    }

    #[test]
    fn full_expected_output_yields_excellent_rating() {
        let base = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let mut records = Vec::new();
        for day in 0..3 {
            for hour in 0..24 {
                let ts = base + Duration::days(day) + Duration::hours(hour);
                let current = if (6..18).contains(&hour) { 40.0 } else { 0.0 };
                records.push(record(ts, current));
            }
        }
        let profile = profile();
        let outcome = analyze(&records, Some(&profile));
        match outcome {
            AnalysisOutcome::Ok(perf) => {
                assert!(perf.performance_ratio_pct >= 80.0);
                assert_eq!(perf.rating, SolarRating::Excellent);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
