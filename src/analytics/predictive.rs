//! Predictive capacity and service life modeling. These functions are pure:
//! they never touch the telemetry store directly. Caching the result behind
//! a `CachedModel` with a 24h TTL is the context assembler's job, not the
//! kernel's - keeps these functions trivially testable and composable with
//! `tokio::join!`.

use serde::{Deserialize, Serialize};

use super::outcome::AnalysisOutcome;
use super::stats::{confidence_tier, linear_regression, ConfidenceTier};
use crate::domain::{HistoricalRecord, SystemProfile};

const MIN_RECORDS: usize = 30;
const CAPACITY_RETENTION_THRESHOLD: f64 = 0.8;
const WEIBULL_SHAPE: f64 = 2.5;
const WEIBULL_SCALE_FACTOR: f64 = 1.2;

const WEIGHT_EXPONENTIAL: f64 = 0.40;
const WEIGHT_LINEAR: f64 = 0.35;
const WEIGHT_CYCLE_BASED: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubModel {
    pub days_to_threshold: f64,
    pub confidence: ConfidenceTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureProbability {
    pub at_30_days: f64,
    pub at_90_days: f64,
    pub at_365_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServiceLifeOutlook {
    Comfortable,
    PlanReplacement,
    ReplaceSoon,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictiveModel {
    pub exponential_model: Option<SubModel>,
    pub linear_model: Option<SubModel>,
    pub cycle_based_model: Option<SubModel>,
    pub ensemble_days_to_threshold: Option<f64>,
    pub failure_probability: Option<FailureProbability>,
    pub service_life_outlook: ServiceLifeOutlook,
}

fn capacity_points(records: &[HistoricalRecord]) -> Vec<(f64, f64)> {
    let t0 = records.first().map(|r| r.timestamp);
    let Some(t0) = t0 else { return Vec::new() };
    records
        .iter()
        .filter_map(|r| {
            let cap = r.analysis.full_capacity_ah?;
            let day = (r.timestamp - t0).num_milliseconds() as f64 / 86_400_000.0;
            Some((day, cap))
        })
        .collect()
}

fn linear_submodel(points: &[(f64, f64)], threshold: f64) -> Option<SubModel> {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let reg = linear_regression(&xs, &ys)?;
    if reg.slope >= 0.0 {
        return None;
    }
    let day = (threshold - reg.intercept) / reg.slope;
    if day <= 0.0 {
        return None;
    }
    Some(SubModel {
        days_to_threshold: day,
        confidence: confidence_tier(reg.r2),
    })
}

fn exponential_submodel(points: &[(f64, f64)], threshold: f64) -> Option<SubModel> {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points
        .iter()
        .filter(|p| p.1 > 0.0)
        .map(|p| p.1.ln())
        .collect();
    if ys.len() != xs.len() {
        return None;
    }
    let reg = linear_regression(&xs, &ys)?;
    if reg.slope >= 0.0 || threshold <= 0.0 {
        return None;
    }
    let day = (threshold.ln() - reg.intercept) / reg.slope;
    if day <= 0.0 {
        return None;
    }
    Some(SubModel {
        days_to_threshold: day,
        confidence: confidence_tier(reg.r2),
    })
}

fn cycle_based_submodel(records: &[HistoricalRecord], profile: &SystemProfile) -> Option<SubModel> {
    let cycles_used = records.iter().rev().find_map(|r| r.analysis.cycle_count)? as f64;
    let expected_cycles = profile.expected_cycle_life() as f64;
    let remaining_cycles = expected_cycles - cycles_used;
    if remaining_cycles <= 0.0 {
        return Some(SubModel {
            days_to_threshold: 0.0,
            confidence: ConfidenceTier::Low,
        });
    }
    let span_days = (records.last()?.timestamp - records.first()?.timestamp).num_milliseconds() as f64
        / 86_400_000.0;
    if span_days <= 0.0 {
        return None;
    }
    let cycles_per_day = cycles_used / span_days;
    if cycles_per_day <= 1e-9 {
        return None;
    }
    Some(SubModel {
        days_to_threshold: remaining_cycles / cycles_per_day,
        confidence: ConfidenceTier::Medium,
    })
}

fn weibull_cdf(day: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 1.0;
    }
    1.0 - (-(day / scale).powf(WEIBULL_SHAPE)).exp()
}

fn service_life_outlook(days_to_threshold: f64) -> ServiceLifeOutlook {
    if days_to_threshold > 365.0 {
        ServiceLifeOutlook::Comfortable
    } else if days_to_threshold > 90.0 {
        ServiceLifeOutlook::PlanReplacement
    } else {
        ServiceLifeOutlook::ReplaceSoon
    }
}

pub fn analyze(
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<PredictiveModel> {
    if let Some(insufficient) = AnalysisOutcome::require(
        records.len(),
        MIN_RECORDS,
        "service life prediction needs at least 30 points with capacity readings",
    ) {
        return insufficient;
    }

    let points = capacity_points(records);
    let threshold = profile
        .map(|p| p.rated_capacity_ah * CAPACITY_RETENTION_THRESHOLD)
        .or_else(|| {
            points
                .iter()
                .map(|p| p.1)
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
                .map(|max_cap| max_cap * CAPACITY_RETENTION_THRESHOLD)
        });

    let Some(threshold) = threshold else {
        return AnalysisOutcome::insufficient(
            1,
            0,
            "no capacity readings available to project service life",
        );
    };

    let linear_model = if points.len() >= 2 {
        linear_submodel(&points, threshold)
    } else {
        None
    };
    let exponential_model = if points.len() >= 2 {
        exponential_submodel(&points, threshold)
    } else {
        None
    };
    let cycle_based_model = profile.and_then(|p| cycle_based_submodel(records, p));

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    if let Some(m) = &exponential_model {
        weighted_sum += m.days_to_threshold * WEIGHT_EXPONENTIAL;
        weight_total += WEIGHT_EXPONENTIAL;
    }
    if let Some(m) = &linear_model {
        weighted_sum += m.days_to_threshold * WEIGHT_LINEAR;
        weight_total += WEIGHT_LINEAR;
    }
    if let Some(m) = &cycle_based_model {
        weighted_sum += m.days_to_threshold * WEIGHT_CYCLE_BASED;
        weight_total += WEIGHT_CYCLE_BASED;
    }

    let ensemble_days_to_threshold = (weight_total > 0.0).then(|| weighted_sum / weight_total);

    let failure_probability = ensemble_days_to_threshold.map(|days| {
        let scale = WEIBULL_SCALE_FACTOR * days;
        FailureProbability {
            at_30_days: weibull_cdf(30.0, scale),
            at_90_days: weibull_cdf(90.0, scale),
            at_365_days: weibull_cdf(365.0, scale),
        }
    });

    let service_life_outlook = ensemble_days_to_threshold
        .map(service_life_outlook)
        .unwrap_or(ServiceLifeOutlook::Comfortable);

    AnalysisOutcome::Ok(PredictiveModel {
        exponential_model,
        linear_model,
        cycle_based_model,
        ensemble_days_to_threshold,
        failure_probability,
        service_life_outlook,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::{Duration, Utc};

    fn record(ts: chrono::DateTime<Utc>, full_capacity_ah: f64, cycle_count: u32) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                full_capacity_ah: Some(full_capacity_ah),
                cycle_count: Some(cycle_count),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[test]
    fn insufficient_data_below_30_points() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..5).map(|i| record(t0 + Duration::days(i), 100.0, 10)).collect();
        assert!(matches!(
            analyze(&records, None),
            AnalysisOutcome::InsufficientData { minimum_required: 30, actual: 5, .. }
        ));
    }

    #[test]
    fn declining_capacity_yields_finite_projection() {
        let t0 = Utc::now();
        let records: Vec<_> = (0..40)
            .map(|i| record(t0 + Duration::days(i), 100.0 - i as f64 * 0.1, 10 + i as u32))
            .collect();
        let outcome = analyze(&records, None);
        match outcome {
            AnalysisOutcome::Ok(model) => {
                assert!(model.linear_model.is_some());
                let days = model.ensemble_days_to_threshold.expect("ensemble estimate");
                assert!(days > 0.0);
                let probs = model.failure_probability.expect("failure probability");
                assert!(probs.at_30_days <= probs.at_90_days);
                assert!(probs.at_90_days <= probs.at_365_days);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn failure_probability_is_monotonic_in_time() {
        let scale = 500.0;
        assert!(weibull_cdf(30.0, scale) < weibull_cdf(90.0, scale));
        assert!(weibull_cdf(90.0, scale) < weibull_cdf(365.0, scale));
    }

    proptest::proptest! {
        /// Fitting `exponential_submodel` against `C0 * exp(-k*t)` plus small
        /// noise recovers `k` (the negated log-linear slope) within 10% once
        /// n >= 10 points are sampled.
        #[test]
        fn exponential_fit_recovers_decay_rate(
            c0 in 50.0f64..500.0,
            k in 0.0005f64..0.01,
            n in 10usize..60,
            noise_seed in 0u64..10_000,
        ) {
            let points: Vec<(f64, f64)> = (0..n)
                .map(|i| {
                    let t = i as f64;
                    // deterministic, bounded "noise" derived from the seed and index
                    let jitter = (((noise_seed.wrapping_add(i as u64)) % 11) as f64 - 5.0) * 1e-4;
                    (t, c0 * (-k * t).exp() * (1.0 + jitter))
                })
                .collect();
            // threshold must sit under the whole decaying series for the model to be defined
            let threshold = points.last().unwrap().1 * 0.5;
            if let Some(model) = exponential_submodel(&points, threshold) {
                // recovered k from slope: slope = -k, so days_to_threshold implies a
                // consistent fit; re-derive slope directly to compare against k.
                let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
                let ys: Vec<f64> = points.iter().map(|p| p.1.ln()).collect();
                let reg = linear_regression(&xs, &ys).unwrap();
                let recovered_k = -reg.slope;
                let rel_error = (recovered_k - k).abs() / k;
                prop_assert!(rel_error < 0.10, "recovered_k={recovered_k} k={k} rel_error={rel_error}");
                let _ = model;
            }
        }
    }
}
