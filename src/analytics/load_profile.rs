use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use crate::domain::HistoricalRecord;

const MIN_RECORDS: usize = 24;
const DISCHARGE_THRESHOLD_A: f64 = 0.5;
const NIGHT_HOURS: [u32; 12] = [18, 19, 20, 21, 22, 23, 0, 1, 2, 3, 4, 5];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoadInterpretation {
    NightHeavy,
    DayHeavy,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadProfile {
    /// Average discharge watts for each hour-of-day bucket, 0 if unsampled.
    pub hourly_avg_watts: [f64; 24],
    /// Average discharge watts for each weekday (Mon=0..Sun=6), 0 if unsampled.
    pub weekday_avg_watts: [f64; 7],
    pub day_avg_watts: f64,
    pub night_avg_watts: f64,
    pub baseload_watts: f64,
    pub peak_hour: u32,
    pub interpretation: LoadInterpretation,
}

fn discharge_watts(record: &HistoricalRecord) -> Option<f64> {
    let current = record.analysis.current?;
    if current >= -DISCHARGE_THRESHOLD_A {
        return None;
    }
    let watts = record
        .analysis
        .power
        .unwrap_or_else(|| current * record.analysis.voltage.unwrap_or(0.0));
    Some(watts.abs())
}

pub fn analyze(records: &[HistoricalRecord]) -> AnalysisOutcome<LoadProfile> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "load profile needs at least 24 records",
    ) {
        return insufficient;
    }

    let mut hour_sum = [0.0f64; 24];
    let mut hour_count = [0u32; 24];
    let mut weekday_sum = [0.0f64; 7];
    let mut weekday_count = [0u32; 7];

    for record in records {
        let Some(watts) = discharge_watts(record) else {
            continue;
        };
        let hour = record.timestamp.hour() as usize;
        hour_sum[hour] += watts;
        hour_count[hour] += 1;

        let weekday = record.timestamp.weekday().num_days_from_monday() as usize;
        weekday_sum[weekday] += watts;
        weekday_count[weekday] += 1;
    }

    let mut hourly_avg_watts = [0.0f64; 24];
    for h in 0..24 {
        if hour_count[h] > 0 {
            hourly_avg_watts[h] = hour_sum[h] / hour_count[h] as f64;
        }
    }

    let mut weekday_avg_watts = [0.0f64; 7];
    for d in 0..7 {
        if weekday_count[d] > 0 {
            weekday_avg_watts[d] = weekday_sum[d] / weekday_count[d] as f64;
        }
    }

    let (night_total, night_n) = NIGHT_HOURS.iter().fold((0.0, 0u32), |(sum, n), &h| {
        if hour_count[h as usize] > 0 {
            (sum + hourly_avg_watts[h as usize], n + 1)
        } else {
            (sum, n)
        }
    });
    let day_hours: Vec<u32> = (0..24).filter(|h| !NIGHT_HOURS.contains(h)).collect();
    let (day_total, day_n) = day_hours.iter().fold((0.0, 0u32), |(sum, n), &h| {
        if hour_count[h as usize] > 0 {
            (sum + hourly_avg_watts[h as usize], n + 1)
        } else {
            (sum, n)
        }
    });

    let night_avg_watts = if night_n > 0 { night_total / night_n as f64 } else { 0.0 };
    let day_avg_watts = if day_n > 0 { day_total / day_n as f64 } else { 0.0 };

    let baseload_watts = hourly_avg_watts
        .iter()
        .copied()
        .filter(|w| *w > 0.0)
        .fold(f64::INFINITY, f64::min);
    let baseload_watts = if baseload_watts.is_finite() { baseload_watts } else { 0.0 };

    let peak_hour = (0..24)
        .max_by(|&a, &b| hourly_avg_watts[a].total_cmp(&hourly_avg_watts[b]))
        .unwrap_or(0) as u32;

    let interpretation = if night_avg_watts > day_avg_watts * 1.5 {
        LoadInterpretation::NightHeavy
    } else if day_avg_watts > night_avg_watts * 1.5 {
        LoadInterpretation::DayHeavy
    } else {
        LoadInterpretation::Balanced
    };

    AnalysisOutcome::Ok(LoadProfile {
        hourly_avg_watts,
        weekday_avg_watts,
        day_avg_watts,
        night_avg_watts,
        baseload_watts,
        peak_hour,
        interpretation,
    })
}
