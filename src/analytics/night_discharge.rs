use chrono::Timelike;
use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use crate::domain::{clamped_delta_hours, HistoricalRecord, SystemProfile};

const MIN_RECORDS: usize = 24;
const DISCHARGE_THRESHOLD_A: f64 = 0.5;
const CHARGE_THRESHOLD_A: f64 = 0.5;
const NIGHT_FRACTION_THRESHOLD: f64 = 0.5;
const SOLAR_VARIANCE_TOLERANCE: f64 = 0.15;
const DAY_START_HOUR: u32 = 6;
const DAY_END_HOUR: u32 = 18;

fn is_night_hour(hour: u32) -> bool {
    hour >= 18 || hour < 6
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightDischargeSummary {
    pub total_ah: f64,
    pub total_hours: f64,
    pub avg_current_a: f64,
    pub ampere_weighted_avg_power_w: f64,
    pub run_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolarVariance {
    pub expected_solar_ah: f64,
    pub observed_charging_ah: f64,
    pub within_tolerance: bool,
    pub daytime_load_ah: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightDischargeReport {
    pub night_discharge: Option<NightDischargeSummary>,
    pub solar_variance: Option<SolarVariance>,
}

struct RunAccumulator {
    ah: f64,
    hours: f64,
    current_weighted_power: f64,
    current_weight: f64,
    night_samples: usize,
    total_samples: usize,
}

fn night_discharge(records: &[HistoricalRecord]) -> Option<NightDischargeSummary> {
    let mut runs: Vec<RunAccumulator> = Vec::new();
    let mut current_run: Option<RunAccumulator> = None;

    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let current = a.analysis.current.unwrap_or(0.0);
        if current >= -DISCHARGE_THRESHOLD_A {
            if let Some(run) = current_run.take() {
                runs.push(run);
            }
            continue;
        }
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let Some(dt) = clamped_delta_hours(dt_hours) else {
            continue;
        };
        let power = a.analysis.power.unwrap_or(current * a.analysis.voltage.unwrap_or(0.0));
        let run = current_run.get_or_insert_with(|| RunAccumulator {
            ah: 0.0,
            hours: 0.0,
            current_weighted_power: 0.0,
            current_weight: 0.0,
            night_samples: 0,
            total_samples: 0,
        });
        run.ah += current.abs() * dt;
        run.hours += dt;
        run.current_weighted_power += power.abs() * current.abs();
        run.current_weight += current.abs();
        run.total_samples += 1;
        if is_night_hour(a.timestamp.hour()) {
            run.night_samples += 1;
        }
    }
    if let Some(run) = current_run.take() {
        runs.push(run);
    }

    let night_runs: Vec<RunAccumulator> = runs
        .into_iter()
        .filter(|r| {
            r.total_samples > 0
                && (r.night_samples as f64 / r.total_samples as f64) >= NIGHT_FRACTION_THRESHOLD
        })
        .collect();

    if night_runs.is_empty() {
        return None;
    }

    let total_ah: f64 = night_runs.iter().map(|r| r.ah).sum();
    let total_hours: f64 = night_runs.iter().map(|r| r.hours).sum();
    let current_weight_total: f64 = night_runs.iter().map(|r| r.current_weight).sum();
    let power_weighted_total: f64 = night_runs.iter().map(|r| r.current_weighted_power).sum();

    Some(NightDischargeSummary {
        total_ah,
        total_hours,
        avg_current_a: if total_hours > 0.0 { total_ah / total_hours } else { 0.0 },
        ampere_weighted_avg_power_w: if current_weight_total > 0.0 {
            power_weighted_total / current_weight_total
        } else {
            0.0
        },
        run_count: night_runs.len(),
    })
}

fn solar_variance(records: &[HistoricalRecord], profile: Option<&SystemProfile>) -> Option<SolarVariance> {
    let max_solar_current = profile.and_then(|p| p.max_solar_charge_current)?;

    let mut observed_charging_ah = 0.0;
    let mut expected_solar_ah_total = 0.0;
    let mut expected_days = 0u32;
    let mut seen_days = std::collections::HashSet::new();

    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let dt_hours = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let Some(dt) = clamped_delta_hours(dt_hours) else {
            continue;
        };
        let hour = a.timestamp.hour();
        let current = a.analysis.current.unwrap_or(0.0);
        if current > CHARGE_THRESHOLD_A && (DAY_START_HOUR..DAY_END_HOUR).contains(&hour) {
            observed_charging_ah += current * dt;
        }
        if let Some(weather) = &a.weather {
            let day = a.timestamp.date_naive();
            if seen_days.insert(day) {
                expected_solar_ah_total += max_solar_current * weather.modeled_sun_hours();
                expected_days += 1;
            }
        }
    }

    if expected_days == 0 {
        return None;
    }

    let expected_solar_ah = expected_solar_ah_total;
    let within_tolerance = if expected_solar_ah.abs() > 1e-6 {
        ((observed_charging_ah - expected_solar_ah) / expected_solar_ah).abs() <= SOLAR_VARIANCE_TOLERANCE
    } else {
        true
    };
    let daytime_load_ah = expected_solar_ah - observed_charging_ah;

    Some(SolarVariance {
        expected_solar_ah,
        observed_charging_ah,
        within_tolerance,
        daytime_load_ah,
    })
}

pub fn analyze(
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<NightDischargeReport> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "night discharge and solar variance analysis needs at least 24 records",
    ) {
        return insufficient;
    }

    AnalysisOutcome::Ok(NightDischargeReport {
        night_discharge: night_discharge(records),
        solar_variance: solar_variance(records, profile),
    })
}
