use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::outcome::AnalysisOutcome;
use crate::domain::HistoricalRecord;

const MIN_RECORDS: usize = 24;
const CHARGE_THRESHOLD_A: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherImpact {
    pub clear_day_avg_charge_current_a: Option<f64>,
    pub overcast_day_avg_charge_current_a: Option<f64>,
    pub reduction_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SkyCondition {
    Clear,
    Overcast,
}

pub fn analyze(records: &[HistoricalRecord]) -> AnalysisOutcome<WeatherImpact> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "weather impact analysis needs at least 24 records",
    ) {
        return insufficient;
    }

    let mut by_day_condition: HashMap<(NaiveDate, SkyCondition), Vec<f64>> = HashMap::new();

    for record in records {
        let Some(current) = record.analysis.current else {
            continue;
        };
        if current <= CHARGE_THRESHOLD_A {
            continue;
        }
        let Some(weather) = &record.weather else {
            continue;
        };
        let condition = if weather.is_clear() {
            SkyCondition::Clear
        } else if weather.is_overcast() {
            SkyCondition::Overcast
        } else {
            continue;
        };
        let day = record.timestamp.date_naive();
        by_day_condition.entry((day, condition)).or_default().push(current);
    }

    let daily_avg = |condition: SkyCondition| -> Vec<f64> {
        by_day_condition
            .iter()
            .filter(|((_, c), _)| *c == condition)
            .map(|(_, values)| values.iter().sum::<f64>() / values.len() as f64)
            .collect()
    };

    let clear_days = daily_avg(SkyCondition::Clear);
    let overcast_days = daily_avg(SkyCondition::Overcast);

    let clear_day_avg_charge_current_a = (!clear_days.is_empty())
        .then(|| clear_days.iter().sum::<f64>() / clear_days.len() as f64);
    let overcast_day_avg_charge_current_a = (!overcast_days.is_empty())
        .then(|| overcast_days.iter().sum::<f64>() / overcast_days.len() as f64);

    let reduction_pct = match (clear_day_avg_charge_current_a, overcast_day_avg_charge_current_a) {
        (Some(clear), Some(overcast)) if clear.abs() > 1e-6 => {
            Some(((clear - overcast) / clear * 100.0).max(0.0))
        }
        _ => None,
    };

    AnalysisOutcome::Ok(WeatherImpact {
        clear_day_avg_charge_current_a,
        overcast_day_avg_charge_current_a,
        reduction_pct,
    })
}
