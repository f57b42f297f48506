//! The Context Assembler: a time-budgeted gatherer that fans out to the
//! store and the analytics kernel to build a `ContextBundle` the Prompt
//! Builder renders into the initial prompt.

use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{
    self,
    anomalies::Anomaly,
    energy_balance::{self, EnergyBalance},
    health::BatteryHealth,
    load_profile::LoadProfile,
    night_discharge::{NightDischargeReport, SolarVariance},
    outcome::AnalysisOutcome,
    predictive::PredictiveModel,
    solar_performance::SolarPerformance,
    stats::percentile,
    trends::Trends,
    usage_patterns::UsagePatterns,
    weather_impact::WeatherImpact,
};
use crate::domain::{BatteryFacts, EngineMode, HistoricalRecord, Snapshot, SystemProfile, WeatherObservation};
use crate::error::StoreError;
use crate::store::{Projection, TelemetryStore};
use crate::tools::WeatherProvider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub label: String,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextMeta {
    pub steps: Vec<StepReport>,
    pub duration_ms: u64,
    pub max_ms: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitialSummary {
    pub record_count: usize,
    pub span_days: f64,
    pub avg_soc: Option<f64>,
    pub min_soc: Option<f64>,
    pub max_soc: Option<f64>,
    pub avg_voltage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsBundle {
    pub load_profile: AnalysisOutcome<LoadProfile>,
    pub energy_balance: AnalysisOutcome<EnergyBalance>,
    pub solar_performance: AnalysisOutcome<SolarPerformance>,
    pub health: AnalysisOutcome<BatteryHealth>,
    pub usage_patterns: AnalysisOutcome<UsagePatterns>,
    pub trends: AnalysisOutcome<Trends>,
    pub anomalies: AnalysisOutcome<Vec<Anomaly>>,
    pub weather_impact: AnalysisOutcome<WeatherImpact>,
    pub predictive: AnalysisOutcome<PredictiveModel>,
    pub night_discharge: AnalysisOutcome<NightDischargeReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsagePatternsSection {
    pub daily: AnalysisOutcome<LoadProfile>,
    pub anomalies: AnalysisOutcome<Vec<Anomaly>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorstCaseBudget {
    pub worst_case_generation_wh: f64,
    pub worst_case_consumption_wh: f64,
    pub solar_sufficiency_pct: f64,
    pub days_sampled: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyBudgets {
    pub current: AnalysisOutcome<EnergyBalance>,
    pub worst_case: Option<WorstCaseBudget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predictions {
    pub capacity: AnalysisOutcome<PredictiveModel>,
    pub lifetime: AnalysisOutcome<PredictiveModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayRollup {
    pub date: NaiveDate,
    pub avg_soc: Option<f64>,
    pub avg_voltage: Option<f64>,
    pub hourly_avg_watts: [Option<f64>; 24],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContextBundle {
    pub system_profile: Option<SystemProfile>,
    pub battery_facts: Option<BatteryFacts>,
    pub initial_summary: Option<InitialSummary>,
    pub analytics: Option<AnalyticsBundle>,
    pub usage_patterns: Option<UsagePatternsSection>,
    pub energy_budgets: Option<EnergyBudgets>,
    pub predictions: Option<Predictions>,
    pub weather: Option<WeatherObservation>,
    pub night_discharge: Option<AnalysisOutcome<NightDischargeReport>>,
    pub solar_variance: Option<SolarVariance>,
    pub daily_rollup_90d: Vec<DayRollup>,
    pub recent_snapshots: Vec<HistoricalRecord>,
    pub meta: Option<ContextMeta>,
}

pub struct Budget {
    pub max_ms: u64,
}

impl Budget {
    pub fn for_mode(mode: EngineMode) -> Self {
        Self::from_config(mode, &crate::config::ContextConfig::default())
    }

    pub fn from_config(mode: EngineMode, config: &crate::config::ContextConfig) -> Self {
        let max_ms = match mode {
            EngineMode::Sync => config.sync_budget_ms,
            EngineMode::Background => config.background_budget_ms,
        };
        Self { max_ms }
    }
}

struct StepRunner {
    steps: Vec<StepReport>,
    start: Instant,
    max: Duration,
    truncated: bool,
}

impl StepRunner {
    fn new(max: Duration) -> Self {
        Self {
            steps: Vec::new(),
            start: Instant::now(),
            max,
            truncated: false,
        }
    }

    fn budget_exceeded(&self) -> bool {
        self.start.elapsed() > self.max
    }

    async fn run<T, F, Fut>(&mut self, label: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        if self.budget_exceeded() {
            self.truncated = true;
            return None;
        }
        let step_started = Instant::now();
        let outcome = f().await;
        let duration_ms = step_started.elapsed().as_millis() as u64;
        let (success, error, value) = match outcome {
            Ok(value) => (true, None, Some(value)),
            Err(message) => (false, Some(message), None),
        };
        self.steps.push(StepReport {
            label: label.to_string(),
            duration_ms,
            success,
            error,
        });
        value
    }
}

fn summarize(records: &[HistoricalRecord]) -> InitialSummary {
    let socs: Vec<f64> = records.iter().filter_map(|r| r.analysis.soc).collect();
    let voltages: Vec<f64> = records.iter().filter_map(|r| r.analysis.voltage).collect();
    let span_days = records
        .first()
        .zip(records.last())
        .map(|(a, b)| (b.timestamp - a.timestamp).num_milliseconds() as f64 / 86_400_000.0)
        .unwrap_or(0.0);
    InitialSummary {
        record_count: records.len(),
        span_days,
        avg_soc: (!socs.is_empty()).then(|| socs.iter().sum::<f64>() / socs.len() as f64),
        min_soc: socs.iter().cloned().reduce(f64::min),
        max_soc: socs.iter().cloned().reduce(f64::max),
        avg_voltage: (!voltages.is_empty()).then(|| voltages.iter().sum::<f64>() / voltages.len() as f64),
    }
}

fn rollup_90d(records: &[HistoricalRecord]) -> Vec<DayRollup> {
    use std::collections::BTreeMap;
    use chrono::Timelike;

    struct DayAccum {
        soc_sum: f64,
        soc_n: usize,
        volt_sum: f64,
        volt_n: usize,
        hour_sum: [f64; 24],
        hour_n: [usize; 24],
    }

    let mut by_day: BTreeMap<NaiveDate, DayAccum> = BTreeMap::new();
    for record in records {
        let day = record.timestamp.date_naive();
        let accum = by_day.entry(day).or_insert_with(|| DayAccum {
            soc_sum: 0.0,
            soc_n: 0,
            volt_sum: 0.0,
            volt_n: 0,
            hour_sum: [0.0; 24],
            hour_n: [0; 24],
        });
        if let Some(soc) = record.analysis.soc {
            accum.soc_sum += soc;
            accum.soc_n += 1;
        }
        if let Some(voltage) = record.analysis.voltage {
            accum.volt_sum += voltage;
            accum.volt_n += 1;
        }
        if let Some(power) = record.analysis.power {
            let hour = record.timestamp.hour() as usize;
            accum.hour_sum[hour] += power;
            accum.hour_n[hour] += 1;
        }
    }

    by_day
        .into_iter()
        .map(|(date, accum)| {
            let mut hourly_avg_watts = [None; 24];
            for h in 0..24 {
                if accum.hour_n[h] > 0 {
                    hourly_avg_watts[h] = Some(accum.hour_sum[h] / accum.hour_n[h] as f64);
                }
            }
            DayRollup {
                date,
                avg_soc: (accum.soc_n > 0).then(|| accum.soc_sum / accum.soc_n as f64),
                avg_voltage: (accum.volt_n > 0).then(|| accum.volt_sum / accum.volt_n as f64),
                hourly_avg_watts,
            }
        })
        .collect()
}

fn worst_case_budget(records: &[HistoricalRecord]) -> Option<WorstCaseBudget> {
    let daily = energy_balance::daily_energy_totals(records);
    if daily.is_empty() {
        return None;
    }
    let generation: Vec<f64> = daily.iter().map(|(_, g, _)| *g).collect();
    let consumption: Vec<f64> = daily.iter().map(|(_, _, c)| *c).collect();
    let worst_case_generation_wh = percentile(&generation, 10.0);
    let worst_case_consumption_wh = percentile(&consumption, 90.0);
    let solar_sufficiency_pct = if worst_case_consumption_wh.abs() > 1e-6 {
        (worst_case_generation_wh / worst_case_consumption_wh * 100.0).min(100.0)
    } else {
        100.0
    };
    Some(WorstCaseBudget {
        worst_case_generation_wh,
        worst_case_consumption_wh,
        solar_sufficiency_pct,
        days_sampled: daily.len(),
    })
}

const PREDICTIVE_MODEL_CACHE_KIND: &str = "predictive_model";
const PREDICTIVE_MODEL_CACHE_TTL_HOURS: i64 = 24;

/// `analytics::predictive::analyze` is a pure function with no notion of
/// caching; this wraps it with the 24h cached-model lookup/store the
/// telemetry store exposes, since recomputing the regression on every call
/// is wasted work between snapshots.
async fn predictive_with_cache(
    store: &dyn TelemetryStore,
    system_id: &str,
    records: &[HistoricalRecord],
    profile: Option<&SystemProfile>,
) -> AnalysisOutcome<PredictiveModel> {
    if let Ok(Some(cached)) = store.cached_model(system_id, PREDICTIVE_MODEL_CACHE_KIND).await {
        if let Ok(outcome) = serde_json::from_value::<AnalysisOutcome<PredictiveModel>>(cached.value) {
            return outcome;
        }
    }

    let outcome = analytics::predictive::analyze(records, profile);
    if let Ok(value) = serde_json::to_value(&outcome) {
        let now = Utc::now();
        let _ = store
            .put_cached_model(
                system_id,
                crate::store::CachedModel {
                    kind: PREDICTIVE_MODEL_CACHE_KIND.to_string(),
                    value,
                    computed_at: now,
                    expires_at: now + chrono::Duration::hours(PREDICTIVE_MODEL_CACHE_TTL_HOURS),
                },
            )
            .await;
    }
    outcome
}

/// Assembles a `ContextBundle` within `budget.max_ms`. In `EngineMode::Sync`
/// only the lean step list runs (system profile, 7-day summary, 24 recent
/// snapshots, battery facts, night discharge, solar variance); background
/// mode runs the full analytics suite concurrently via `tokio::join!`.
pub async fn assemble_context(
    system_id: &str,
    snapshot: &Snapshot,
    store: &dyn TelemetryStore,
    weather: Option<&dyn WeatherProvider>,
    mode: EngineMode,
    budget: Budget,
) -> ContextBundle {
    let mut runner = StepRunner::new(Duration::from_millis(budget.max_ms));
    let mut bundle = ContextBundle::default();

    let profile = runner
        .run("system_profile", || async {
            store.system(system_id).await.map_err(|e: StoreError| e.to_string())
        })
        .await
        .flatten();
    bundle.system_profile = profile.clone();

    let now = Utc::now();
    let seven_day_records = runner
        .run("seven_day_summary", || async {
            store
                .records(system_id, now - chrono::Duration::days(7), now, Projection::Full)
                .await
                .map_err(|e| e.to_string())
        })
        .await;
    if let Some(records) = &seven_day_records {
        bundle.initial_summary = Some(summarize(records));
    }

    let recent = runner
        .run("recent_snapshots", || async {
            store.recent_snapshots(system_id, 24).await.map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_default();
    bundle.recent_snapshots = recent;

    bundle.battery_facts = Some(BatteryFacts::from_profile_and_snapshot(profile.as_ref(), snapshot));

    let ninety_day_records = runner
        .run("ninety_day_window", || async {
            store
                .records(system_id, now - chrono::Duration::days(90), now, Projection::Full)
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_default();

    let night_discharge_outcome = runner
        .run("night_discharge_and_solar_variance", || async {
            Ok::<_, String>(analytics::night_discharge::analyze(&ninety_day_records, profile.as_ref()))
        })
        .await;
    bundle.solar_variance = night_discharge_outcome
        .as_ref()
        .and_then(|o| o.ok())
        .and_then(|r| r.solar_variance.clone());
    bundle.night_discharge = night_discharge_outcome;

    if mode == EngineMode::Sync {
        bundle.meta = Some(ContextMeta {
            steps: runner.steps,
            duration_ms: runner.start.elapsed().as_millis() as u64,
            max_ms: budget.max_ms,
            truncated: runner.truncated,
        });
        return bundle;
    }

    let records_for_analytics = ninety_day_records.clone();
    let analytics_bundle = runner
        .run("analytics_suite", || {
            let records = records_for_analytics.clone();
            let profile = profile.clone();
            async move {
                let (load_profile, energy_balance, solar_performance, health) = tokio::join!(
                    async { analytics::load_profile::analyze(&records) },
                    async { analytics::energy_balance::analyze(&records, profile.as_ref()) },
                    async { analytics::solar_performance::analyze(&records, profile.as_ref()) },
                    async { analytics::health::analyze(&records, profile.as_ref()) },
                );
                let (usage_patterns, trends, anomalies, weather_impact) = tokio::join!(
                    async { analytics::usage_patterns::analyze(&records) },
                    async { analytics::trends::analyze(&records) },
                    async { analytics::anomalies::analyze(&records) },
                    async { analytics::weather_impact::analyze(&records) },
                );
                let (predictive, night_discharge) = tokio::join!(
                    predictive_with_cache(store, system_id, &records, profile.as_ref()),
                    async { analytics::night_discharge::analyze(&records, profile.as_ref()) },
                );
                Ok::<_, String>(AnalyticsBundle {
                    load_profile,
                    energy_balance,
                    solar_performance,
                    health,
                    usage_patterns,
                    trends,
                    anomalies,
                    weather_impact,
                    predictive,
                    night_discharge,
                })
            }
        })
        .await;

    if let Some(analytics_bundle) = analytics_bundle {
        bundle.usage_patterns = Some(UsagePatternsSection {
            daily: analytics_bundle.load_profile.clone(),
            anomalies: analytics_bundle.anomalies.clone(),
        });
        bundle.energy_budgets = Some(EnergyBudgets {
            current: analytics_bundle.energy_balance.clone(),
            worst_case: worst_case_budget(&ninety_day_records),
        });
        bundle.predictions = Some(Predictions {
            capacity: analytics_bundle.predictive.clone(),
            lifetime: analytics_bundle.predictive.clone(),
        });
        bundle.daily_rollup_90d = rollup_90d(&ninety_day_records);
        bundle.analytics = Some(analytics_bundle);
    }

    if let Some(provider) = weather {
        if let Some(location) = profile.as_ref().and_then(|p| p.location.as_ref()) {
            bundle.weather = runner
                .run("weather", || async {
                    Ok::<_, String>(provider.current(location.latitude, location.longitude).await)
                })
                .await
                .flatten();
        }
    }

    bundle.meta = Some(ContextMeta {
        steps: runner.steps,
        duration_ms: runner.start.elapsed().as_millis() as u64,
        max_ms: budget.max_ms,
        truncated: runner.truncated,
    });

    bundle
}
