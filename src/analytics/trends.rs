use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use super::stats::{confidence_tier, linear_regression, ConfidenceTier};
use crate::domain::HistoricalRecord;

const MIN_RECORDS: usize = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendMetric {
    pub slope_per_day: f64,
    pub r2: f64,
    pub confidence: ConfidenceTier,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trends {
    pub soc: Option<TrendMetric>,
    pub voltage: Option<TrendMetric>,
    pub current: Option<TrendMetric>,
}

fn fit(xs_days: &[f64], ys: &[f64], stable_epsilon: f64) -> Option<TrendMetric> {
    let reg = linear_regression(xs_days, ys)?;
    let direction = if reg.slope.abs() < stable_epsilon {
        TrendDirection::Stable
    } else if reg.slope > 0.0 {
        TrendDirection::Rising
    } else {
        TrendDirection::Falling
    };
    Some(TrendMetric {
        slope_per_day: reg.slope,
        r2: reg.r2,
        confidence: confidence_tier(reg.r2),
        direction,
    })
}

pub fn analyze(records: &[HistoricalRecord]) -> AnalysisOutcome<Trends> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "trend analysis needs at least 30 points",
    ) {
        return insufficient;
    }

    let t0 = records[0].timestamp;
    let xs_days: Vec<f64> = records
        .iter()
        .map(|r| (r.timestamp - t0).num_milliseconds() as f64 / 86_400_000.0)
        .collect();

    let soc_points: Vec<(f64, f64)> = records
        .iter()
        .zip(xs_days.iter())
        .filter_map(|(r, x)| r.analysis.soc.map(|v| (*x, v)))
        .collect();
    let voltage_points: Vec<(f64, f64)> = records
        .iter()
        .zip(xs_days.iter())
        .filter_map(|(r, x)| r.analysis.voltage.map(|v| (*x, v)))
        .collect();
    let current_points: Vec<(f64, f64)> = records
        .iter()
        .zip(xs_days.iter())
        .filter_map(|(r, x)| r.analysis.current.map(|v| (*x, v)))
        .collect();

    let split = |points: &[(f64, f64)]| -> (Vec<f64>, Vec<f64>) {
        (points.iter().map(|p| p.0).collect(), points.iter().map(|p| p.1).collect())
    };

    let (soc_x, soc_y) = split(&soc_points);
    let (volt_x, volt_y) = split(&voltage_points);
    let (cur_x, cur_y) = split(&current_points);

    AnalysisOutcome::Ok(Trends {
        soc: fit(&soc_x, &soc_y, 0.5),
        voltage: fit(&volt_x, &volt_y, 0.05),
        current: fit(&cur_x, &cur_y, 0.05),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::{Duration, Utc};

    fn record(ts: chrono::DateTime<Utc>, soc: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                soc: Some(soc),
                voltage: Some(52.0),
                current: Some(0.0),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn insufficient_data_below_30_points() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..10).map(|i| record(t0 + Duration::hours(i), 50.0)).collect();
        assert!(matches!(
            analyze(&records),
            AnalysisOutcome::InsufficientData { minimum_required: 30, actual: 10, .. }
        ));
    }

    #[test]
    fn detects_falling_soc_trend() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..40)
            .map(|i| record(t0 + Duration::days(i), 90.0 - i as f64))
            .collect();
        let outcome = analyze(&records);
        match outcome {
            AnalysisOutcome::Ok(trends) => {
                let soc = trends.soc.expect("soc trend present");
                assert_eq!(soc.direction, TrendDirection::Falling);
                assert_eq!(soc.confidence, ConfidenceTier::High);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
