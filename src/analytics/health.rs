use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use crate::domain::{HistoricalRecord, SystemProfile};

const MIN_RECORDS: usize = 1;
const MIN_RETENTION_SAMPLES: usize = 10;
const HIGH_SOC_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImbalanceRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureStatus {
    Optimal,
    Acceptable,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleLifeStatus {
    Healthy,
    Aging,
    EndOfLife,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatteryHealth {
    pub imbalance_mv: Option<f64>,
    pub imbalance_rating: Option<ImbalanceRating>,
    pub avg_temperature_c: Option<f64>,
    pub temperature_status: Option<TemperatureStatus>,
    pub capacity_retention_pct: Option<f64>,
    pub cycle_life_status: Option<CycleLifeStatus>,
    pub cycles_used: Option<u32>,
    pub expected_cycles: Option<u32>,
    pub score: u32,
    pub recommendation: String,
}

fn imbalance_rating(mv: f64) -> ImbalanceRating {
    if mv <= 30.0 {
        ImbalanceRating::Excellent
    } else if mv <= 50.0 {
        ImbalanceRating::Good
    } else if mv <= 100.0 {
        ImbalanceRating::Fair
    } else {
        ImbalanceRating::Poor
    }
}

fn temperature_status(avg: f64) -> TemperatureStatus {
    if avg < 0.0 || avg > 45.0 {
        TemperatureStatus::Critical
    } else if (15.0..=25.0).contains(&avg) {
        TemperatureStatus::Optimal
    } else {
        TemperatureStatus::Acceptable
    }
}

fn cycle_life_status(cycles_used: u32, expected_cycles: u32) -> CycleLifeStatus {
    let ratio = cycles_used as f64 / expected_cycles.max(1) as f64;
    if ratio >= 0.9 {
        CycleLifeStatus::EndOfLife
    } else if ratio >= 0.7 {
        CycleLifeStatus::Aging
    } else {
        CycleLifeStatus::Healthy
    }
}

pub fn analyze(
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<BatteryHealth> {
    if let Some(insufficient) =
        AnalysisOutcome::require(records.len(), MIN_RECORDS, "battery health needs at least one record")
    {
        return insufficient;
    }

    let latest_with_cells = records
        .iter()
        .rev()
        .find(|r| r.analysis.cell_voltages.as_ref().is_some_and(|c| !c.is_empty()));
    let imbalance_mv = latest_with_cells.and_then(|r| {
        let cells = r.analysis.cell_voltages.as_ref()?;
        let max = cells.iter().cloned().fold(f64::MIN, f64::max);
        let min = cells.iter().cloned().fold(f64::MAX, f64::min);
        Some((max - min) * 1000.0)
    });
    let imbalance_rating = imbalance_mv.map(imbalance_rating);

    let temps: Vec<f64> = records.iter().filter_map(|r| r.analysis.temperature_c).collect();
    let avg_temperature_c = if temps.is_empty() {
        None
    } else {
        Some(temps.iter().sum::<f64>() / temps.len() as f64)
    };
    let temperature_status = avg_temperature_c.map(temperature_status);

    let retention_samples: Vec<f64> = records
        .iter()
        .filter(|r| r.analysis.soc.is_some_and(|s| s >= HIGH_SOC_THRESHOLD))
        .filter_map(|r| {
            let remaining = r.analysis.remaining_capacity_ah?;
            let full = r.analysis.full_capacity_ah?;
            if full.abs() < 1e-6 {
                None
            } else {
                Some(remaining / full * 100.0)
            }
        })
        .collect();
    let capacity_retention_pct = if retention_samples.len() >= MIN_RETENTION_SAMPLES {
        Some(retention_samples.iter().sum::<f64>() / retention_samples.len() as f64)
    } else {
        None
    };

    let cycles_used = records.iter().rev().find_map(|r| r.analysis.cycle_count);
    let expected_cycles = profile.map(|p| p.expected_cycle_life());
    let cycle_life_status = match (cycles_used, expected_cycles) {
        (Some(used), Some(expected)) => Some(cycle_life_status(used, expected)),
        _ => None,
    };

    let mut score: i32 = 100;
    match imbalance_rating {
        Some(ImbalanceRating::Fair) => score -= 10,
        Some(ImbalanceRating::Poor) => score -= 25,
        _ => {}
    }
    match temperature_status {
        Some(TemperatureStatus::Critical) => score -= 30,
        Some(TemperatureStatus::Acceptable) => score -= 10,
        _ => {}
    }
    if let Some(retention) = capacity_retention_pct {
        if retention < HIGH_SOC_THRESHOLD {
            score -= 20;
        }
    }
    match cycle_life_status {
        Some(CycleLifeStatus::EndOfLife) => score -= 20,
        Some(CycleLifeStatus::Aging) => score -= 10,
        _ => {}
    }
    let score = score.clamp(0, 100) as u32;

    let recommendation = if score >= 85 {
        "Battery is in good health; continue routine monitoring.".to_string()
    } else if score >= 60 {
        "Battery shows early signs of wear; schedule a closer inspection within the next service window."
            .to_string()
    } else {
        "Battery health is degraded; plan for service life assessment and possible replacement.".to_string()
    };

    AnalysisOutcome::Ok(BatteryHealth {
        imbalance_mv,
        imbalance_rating,
        avg_temperature_c,
        temperature_status,
        capacity_retention_pct,
        cycle_life_status,
        cycles_used,
        expected_cycles,
        score,
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::Utc;

    fn record(cell_voltages: Option<Vec<f64>>, temp: Option<f64>, soc: Option<f64>) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: Utc::now(),
            analysis: Snapshot {
                cell_voltages,
                temperature_c: temp,
                soc,
                remaining_capacity_ah: Some(95.0),
                full_capacity_ah: Some(100.0),
                cycle_count: Some(500),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn imbalance_thresholds_match_spec() {
        assert_eq!(imbalance_rating(29.0), ImbalanceRating::Excellent);
        assert_eq!(imbalance_rating(30.0), ImbalanceRating::Excellent);
        assert_eq!(imbalance_rating(50.0), ImbalanceRating::Good);
        assert_eq!(imbalance_rating(100.0), ImbalanceRating::Fair);
        assert_eq!(imbalance_rating(101.0), ImbalanceRating::Poor);
    }

    #[test]
    fn temperature_status_thresholds() {
        assert_eq!(temperature_status(20.0), TemperatureStatus::Optimal);
        assert_eq!(temperature_status(30.0), TemperatureStatus::Acceptable);
        assert_eq!(temperature_status(-1.0), TemperatureStatus::Critical);
        assert_eq!(temperature_status(46.0), TemperatureStatus::Critical);
    }

    #[test]
    fn healthy_battery_scores_high() {
        let records = vec![record(Some(vec![3.30, 3.31, 3.29]), Some(20.0), Some(90.0))];
        let outcome = analyze(&records, None);
        match outcome {
            AnalysisOutcome::Ok(health) => {
                assert_eq!(health.imbalance_rating, Some(ImbalanceRating::Excellent));
                assert!(health.score >= 85);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
