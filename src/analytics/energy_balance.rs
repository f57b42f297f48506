use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::outcome::AnalysisOutcome;
use crate::domain::{clamped_delta_hours, HistoricalRecord, SystemProfile};

const MIN_RECORDS: usize = 48;
const DEFICIT_TOLERANCE: f64 = 0.10;
const DATA_QUALITY_FLOOR_PCT: f64 = 60.0;

/// Per-day generation/consumption totals, used both by [`analyze`] and by
/// the `calculate_energy_budget` tool's worst-case/emergency percentile
/// scenarios.
pub fn daily_energy_totals(records: &[HistoricalRecord]) -> Vec<(NaiveDate, f64, f64)> {
    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let Some(dt) = clamped_delta_hours(dt_hours) else {
            continue;
        };
        let watts = power_watts(a);
        let entry = by_day.entry(a.timestamp.date_naive()).or_insert((0.0, 0.0));
        if watts > 0.0 {
            entry.0 += watts * dt;
        } else if watts < 0.0 {
            entry.1 += watts.abs() * dt;
        }
    }
    by_day.into_iter().map(|(day, (gen, cons))| (day, gen, cons)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyBalance {
    pub total_generation_wh: f64,
    pub total_consumption_wh: f64,
    pub avg_daily_generation_wh: f64,
    pub avg_daily_consumption_wh: f64,
    pub solar_sufficiency_pct: f64,
    pub battery_autonomy_hours: Option<f64>,
    pub data_quality_pct: f64,
    pub deficit_detected: bool,
}

fn power_watts(record: &HistoricalRecord) -> f64 {
    record.analysis.power.unwrap_or_else(|| {
        record.analysis.current.unwrap_or(0.0) * record.analysis.voltage.unwrap_or(0.0)
    })
}

pub fn analyze(
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<EnergyBalance> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "energy balance needs at least 48 records",
    ) {
        return insufficient;
    }

    let mut total_generation_wh = 0.0;
    let mut total_consumption_wh = 0.0;

    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let Some(dt) = clamped_delta_hours(dt_hours) else {
            continue;
        };
        let watts = power_watts(a);
        if watts > 0.0 {
            total_generation_wh += watts * dt;
        } else if watts < 0.0 {
            total_consumption_wh += watts.abs() * dt;
        }
    }

    let span_hours = (records.last().unwrap().timestamp - records.first().unwrap().timestamp)
        .num_milliseconds() as f64
        / 3_600_000.0;
    let days_span = (span_hours / 24.0).max(1.0 / 24.0);

    let avg_daily_generation_wh = total_generation_wh / days_span;
    let avg_daily_consumption_wh = total_consumption_wh / days_span;

    let solar_sufficiency_pct = if avg_daily_consumption_wh.abs() > 1e-6 {
        (avg_daily_generation_wh / avg_daily_consumption_wh * 100.0).min(100.0)
    } else {
        100.0
    };

    let avg_load_watts = if days_span > 0.0 {
        avg_daily_consumption_wh / 24.0
    } else {
        0.0
    };

    let latest = records.last().unwrap();
    let battery_autonomy_hours = match (profile, latest.analysis.soc) {
        (Some(p), Some(soc)) if avg_load_watts > 1e-6 => {
            let usable_wh = p.rated_capacity_ah * p.nominal_voltage * (soc / 100.0) * 0.8;
            Some(usable_wh / avg_load_watts)
        }
        _ => None,
    };

    let samples_per_day = records.len() as f64 / days_span;
    let data_quality_pct = (samples_per_day / 24.0 * 100.0).min(100.0);

    let deficit_detected = data_quality_pct >= DATA_QUALITY_FLOOR_PCT
        && avg_daily_consumption_wh > avg_daily_generation_wh * (1.0 + DEFICIT_TOLERANCE);

    AnalysisOutcome::Ok(EnergyBalance {
        total_generation_wh,
        total_consumption_wh,
        avg_daily_generation_wh,
        avg_daily_consumption_wh,
        solar_sufficiency_pct,
        battery_autonomy_hours,
        data_quality_pct,
        deficit_detected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::{Duration, Utc};

    fn record(ts: chrono::DateTime<Utc>, watts: f64, soc: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                power: Some(watts),
                current: Some(watts / 48.0),
                voltage: Some(48.0),
                soc: Some(soc),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    fn hourly_records(n: usize, watts_fn: impl Fn(usize) -> f64) -> Vec<HistoricalRecord> {
        let t0 = Utc::now() - Duration::hours(n as i64);
        (0..n)
            .map(|i| record(t0 + Duration::hours(i as i64), watts_fn(i), 70.0))
            .collect()
    }

    #[test]
    fn insufficient_data_below_48_records() {
        let records = hourly_records(10, |_| 100.0);
        assert!(matches!(
            analyze(&records, None),
            AnalysisOutcome::InsufficientData { minimum_required: 48, actual: 10, .. }
        ));
    }

    #[test]
    fn deficit_suppressed_under_sparse_data() {
        // 48 records spread over many days -> low samples-per-day -> data quality < 60%.
        let t0 = Utc::now() - Duration::days(96);
        let records: Vec<_> = (0..48)
            .map(|i| record(t0 + Duration::days(2 * i as i64), -500.0, 50.0))
            .collect();
        let outcome = analyze(&records, None);
        match outcome {
            AnalysisOutcome::Ok(balance) => {
                assert!(balance.data_quality_pct < 60.0);
                assert!(!balance.deficit_detected);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn deficit_detected_with_good_data_quality() {
        let records = hourly_records(72, |_| -200.0);
        let outcome = analyze(&records, None);
        match outcome {
            AnalysisOutcome::Ok(balance) => {
                assert!(balance.data_quality_pct >= 60.0);
                assert!(balance.deficit_detected);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
