use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use crate::domain::HistoricalRecord;

const MIN_RECORDS: usize = 72;
const CURRENT_THRESHOLD_A: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Charging,
    Discharging,
    Idle,
}

fn flow_state(record: &HistoricalRecord) -> FlowState {
    match record.analysis.current {
        Some(i) if i > CURRENT_THRESHOLD_A => FlowState::Charging,
        Some(i) if i < -CURRENT_THRESHOLD_A => FlowState::Discharging,
        _ => FlowState::Idle,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageIntensity {
    Light,
    Moderate,
    Heavy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsagePatterns {
    pub cycle_count: usize,
    pub avg_discharge_depth_pct: f64,
    pub avg_discharge_duration_hours: f64,
    pub deepest_discharge_pct: f64,
    pub cycles_per_day: f64,
    pub pattern: UsageIntensity,
}

struct DischargeRun {
    depth_pct: f64,
    duration_hours: f64,
}

pub fn analyze(records: &[HistoricalRecord]) -> AnalysisOutcome<UsagePatterns> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "usage pattern analysis needs at least 72 records",
    ) {
        return insufficient;
    }

    let mut runs: Vec<DischargeRun> = Vec::new();
    let mut run_start_idx: Option<usize> = None;

    for (idx, record) in records.iter().enumerate() {
        match flow_state(record) {
            FlowState::Discharging => {
                if run_start_idx.is_none() {
                    run_start_idx = Some(idx);
                }
            }
            _ => {
                if let Some(start) = run_start_idx.take() {
                    if let Some(run) = close_run(records, start, idx - 1) {
                        runs.push(run);
                    }
                }
            }
        }
    }
    if let Some(start) = run_start_idx {
        if let Some(run) = close_run(records, start, records.len() - 1) {
            runs.push(run);
        }
    }

    let span_hours = (records.last().unwrap().timestamp - records.first().unwrap().timestamp)
        .num_milliseconds() as f64
        / 3_600_000.0;
    let days_span = (span_hours / 24.0).max(1.0 / 24.0);

    let cycle_count = runs.len();
    let avg_discharge_depth_pct = if cycle_count > 0 {
        runs.iter().map(|r| r.depth_pct).sum::<f64>() / cycle_count as f64
    } else {
        0.0
    };
    let avg_discharge_duration_hours = if cycle_count > 0 {
        runs.iter().map(|r| r.duration_hours).sum::<f64>() / cycle_count as f64
    } else {
        0.0
    };
    let deepest_discharge_pct = runs.iter().map(|r| r.depth_pct).fold(0.0, f64::max);
    let cycles_per_day = cycle_count as f64 / days_span;

    let pattern = if cycles_per_day > 3.0 || avg_discharge_depth_pct > 50.0 {
        UsageIntensity::Heavy
    } else if cycles_per_day > 1.5 || avg_discharge_depth_pct > 25.0 {
        UsageIntensity::Moderate
    } else {
        UsageIntensity::Light
    };

    AnalysisOutcome::Ok(UsagePatterns {
        cycle_count,
        avg_discharge_depth_pct,
        avg_discharge_duration_hours,
        deepest_discharge_pct,
        cycles_per_day,
        pattern,
    })
}

fn close_run(records: &[HistoricalRecord], start: usize, end: usize) -> Option<DischargeRun> {
    if end <= start {
        return None;
    }
    let soc_start = records[start].analysis.soc?;
    let soc_end = records[end].analysis.soc?;
    let duration_hours = (records[end].timestamp - records[start].timestamp).num_milliseconds() as f64
        / 3_600_000.0;
    Some(DischargeRun {
        depth_pct: (soc_start - soc_end).max(0.0),
        duration_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::{Duration, Utc};

    fn record(ts: chrono::DateTime<Utc>, current: f64, soc: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                current: Some(current),
                soc: Some(soc),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn insufficient_data_below_72_records() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..10).map(|i| record(t0 + Duration::hours(i), -2.0, 50.0)).collect();
        assert!(matches!(
            analyze(&records),
            AnalysisOutcome::InsufficientData { minimum_required: 72, actual: 10, .. }
        ));
    }

    #[test]
    fn detects_alternating_charge_discharge_cycles() {
        let t0 = Utc::now();
        let mut records = Vec::new();
        let mut soc = 90.0;
        for day in 0..4 {
            for hour in 0..24 {
                let ts = t0 + Duration::days(day) + Duration::hours(hour);
                let discharging = hour < 12;
                if discharging {
                    soc -= 2.0;
                    records.push(record(ts, -3.0, soc));
                } else {
                    soc += 2.0;
                    records.push(record(ts, 3.0, soc.min(95.0)));
                }
            }
        }
        let outcome = analyze(&records);
        match outcome {
            AnalysisOutcome::Ok(patterns) => {
                assert!(patterns.cycle_count >= 3);
                assert!(patterns.deepest_discharge_pct > 0.0);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
