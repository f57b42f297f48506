use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::alert_events::group_alert_events;
use super::catalog::canonical_tool_name;
use crate::analytics::{
    self,
    energy_balance::{self, EnergyBalance},
    outcome::AnalysisOutcome,
    stats::percentile,
};
use crate::domain::{HistoricalRecord, SystemProfile, WeatherObservation};
use crate::error::ToolError;
use crate::store::{Projection, TelemetryStore};

/// A narrow stand-in for the weather/irradiance collaborator that sits
/// outside this crate's scope. Production wiring supplies a real
/// implementation; tests use an in-memory one.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, lat: f64, lon: f64) -> Option<WeatherObservation>;
    async fn historical(&self, lat: f64, lon: f64, timestamp: DateTime<Utc>) -> Option<WeatherObservation>;
}

/// A provider that never has data, used when the engine is wired without a
/// real weather collaborator. Tools that need it degrade to an explicit
/// error rather than panicking.
pub struct NoWeatherProvider;

#[async_trait]
impl WeatherProvider for NoWeatherProvider {
    async fn current(&self, _lat: f64, _lon: f64) -> Option<WeatherObservation> {
        None
    }
    async fn historical(&self, _lat: f64, _lon: f64, _timestamp: DateTime<Utc>) -> Option<WeatherObservation> {
        None
    }
}

/// Result of dispatching a tool call. Never a thrown error: invocation
/// failures are reported as `Err` values for the conversation runner to
/// append into history, per the executor's "never throw into F" contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResult {
    Ok(Value),
    Err { error: bool, tool: String, message: String },
}

impl ToolResult {
    fn err(tool: &str, message: impl Into<String>) -> Self {
        Self::Err {
            error: true,
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

pub struct ToolInvocationOutcome {
    pub result: ToolResult,
    pub duration_ms: u64,
}

pub struct ToolContext<'a> {
    pub store: &'a dyn TelemetryStore,
    pub weather: &'a dyn WeatherProvider,
    pub default_system_id: &'a str,
}

fn get_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters {
            tool: key.to_string(),
            message: format!("missing or non-string parameter `{key}`"),
        })
}

fn get_str_or<'a>(params: &'a Value, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn get_f64(params: &Value, key: &str) -> Result<f64, ToolError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ToolError::InvalidParameters {
            tool: key.to_string(),
            message: format!("missing or non-numeric parameter `{key}`"),
        })
}

fn get_usize_or(params: &Value, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ToolError::InvalidParameters {
            tool: "timestamp".to_string(),
            message: format!("`{raw}` is not a valid ISO-8601 timestamp: {e}"),
        })
}

fn parse_range(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ToolError> {
    let from = parse_timestamp(start)?;
    let to = parse_timestamp(end)?;
    if from >= to {
        return Err(ToolError::InvalidParameters {
            tool: "time_range".to_string(),
            message: "time_range_start must be before time_range_end".to_string(),
        });
    }
    Ok((from, to))
}

/// Splits a `"start/end"` range string (used by `analyze_usage_patterns`
/// and `calculate_energy_budget`).
fn parse_slash_range(raw: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ToolError> {
    let (start, end) = raw.split_once('/').ok_or_else(|| ToolError::InvalidParameters {
        tool: "timeRange".to_string(),
        message: format!("`{raw}` must be formatted as \"start/end\""),
    })?;
    parse_range(start, end)
}

fn metric_value(snapshot: &crate::domain::Snapshot, metric: &str) -> Option<f64> {
    match metric {
        "voltage" => snapshot.voltage,
        "current" => snapshot.current,
        "power" => snapshot.power,
        "soc" => snapshot.soc,
        "capacity" => snapshot.remaining_capacity_ah,
        "temperature" => snapshot.temperature_c,
        "cell_voltage_difference" => snapshot.cell_voltage_diff,
        _ => None,
    }
}

const STRIDE_SAMPLE_TARGET: usize = 500;

fn stride_sample<T: Clone>(items: &[T], target: usize) -> Vec<T> {
    if items.len() <= target {
        return items.to_vec();
    }
    let stride = (items.len() as f64 / target as f64).ceil() as usize;
    let mut indices: Vec<usize> = (0..items.len()).step_by(stride.max(1)).collect();
    let last_idx = items.len() - 1;
    if indices.last() != Some(&last_idx) {
        indices.push(last_idx);
    }
    indices.into_iter().map(|i| items[i].clone()).collect()
}

async fn request_bms_data(
    params: &Value,
    ctx: &ToolContext<'_>,
) -> Result<Value, ToolError> {
    let system_id = get_str_or(params, "systemId", ctx.default_system_id);
    let metric = get_str(params, "metric")?;
    let start = get_str(params, "time_range_start")?;
    let end = get_str(params, "time_range_end")?;
    let granularity = get_str_or(params, "granularity", "raw");
    let (from, to) = parse_range(start, end)?;

    let records = ctx
        .store
        .records(system_id, from, to, Projection::Full)
        .await?;

    if granularity == "raw" {
        let sampled = stride_sample(&records, STRIDE_SAMPLE_TARGET);
        let note = (sampled.len() < records.len())
            .then(|| format!("stride-sampled {} of {} points, last point preserved", sampled.len(), records.len()));
        let points: Vec<Value> = sampled
            .iter()
            .map(|r| {
                if metric == "all" {
                    json!({ "timestamp": r.timestamp, "snapshot": r.analysis })
                } else {
                    json!({ "timestamp": r.timestamp, "value": metric_value(&r.analysis, metric) })
                }
            })
            .collect();
        return Ok(json!({ "metric": metric, "granularity": "raw", "data": points, "note": note }));
    }

    use std::collections::BTreeMap;
    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in &records {
        let Some(value) = metric_value(&record.analysis, metric) else {
            continue;
        };
        let day: NaiveDate = record.timestamp.date_naive();
        let key = if granularity == "hourly_avg" {
            format!("{day}T{:02}:00", record.timestamp.format("%H"))
        } else {
            day.to_string()
        };
        buckets.entry(key).or_default().push(value);
    }
    let bucketed: Vec<Value> = buckets
        .into_iter()
        .map(|(key, values)| {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            let min = values.iter().cloned().fold(f64::MAX, f64::min);
            let max = values.iter().cloned().fold(f64::MIN, f64::max);
            json!({ "bucket": key, "avg": avg, "min": min, "max": max, "samples": values.len() })
        })
        .collect();
    Ok(json!({ "metric": metric, "granularity": granularity, "buckets": bucketed }))
}

async fn get_system_analytics(params: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let system_id = get_str_or(params, "systemId", ctx.default_system_id);
    let lookback_days = get_usize_or(params, "lookbackDays", 60) as i64;
    let to = Utc::now();
    let from = to - chrono::Duration::days(lookback_days);
    let records = ctx.store.records(system_id, from, to, Projection::Full).await?;

    let powers: Vec<f64> = records
        .iter()
        .filter_map(|r| r.analysis.power.or_else(|| {
            Some(r.analysis.current? * r.analysis.voltage?)
        }))
        .collect();
    let baseline = percentile(&powers, 50.0);
    let events = group_alert_events(&records);

    Ok(json!({
        "lookbackDays": lookback_days,
        "sampleCount": records.len(),
        "performanceBaselineWatts": baseline,
        "alertEvents": events,
    }))
}

async fn get_weather_data(params: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let lat = get_f64(params, "lat")?;
    let lon = get_f64(params, "lon")?;
    let kind = get_str(params, "type")?;
    let observation = if kind == "historical" {
        let ts = get_str(params, "timestamp")?;
        ctx.weather.historical(lat, lon, parse_timestamp(ts)?).await
    } else {
        ctx.weather.current(lat, lon).await
    };
    match observation {
        Some(obs) => Ok(json!(obs)),
        None => Err(ToolError::Downstream(crate::error::StoreError::Transient(
            "no weather observation available for this location".to_string(),
        ))),
    }
}

const PEAK_SUN_HOURS: f64 = 5.0;
const PANEL_DERATE: f64 = 0.75;

async fn get_solar_estimate(params: &Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let panel_watts = get_f64(params, "panelWatts")?;
    let start = get_str(params, "startDate")?;
    let end = get_str(params, "endDate")?;
    let (from, to) = parse_range(start, end)?;
    let days = ((to - from).num_milliseconds() as f64 / 86_400_000.0).max(1.0);
    let expected_daily_wh = panel_watts * PEAK_SUN_HOURS * PANEL_DERATE;
    Ok(json!({
        "days": days,
        "expectedDailyWh": expected_daily_wh,
        "expectedTotalWh": expected_daily_wh * days,
    }))
}

async fn predict_battery_trends(params: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let system_id = get_str_or(params, "systemId", ctx.default_system_id);
    let metric = get_str(params, "metric")?;
    let forecast_days = get_usize_or(params, "forecastDays", 30);
    let profile = ctx.store.system(system_id).await?;
    let records = ctx.store.recent_snapshots(system_id, 2000).await?;
    let mut ordered = records;
    ordered.reverse();

    let outcome = analytics::predictive::analyze(&ordered, profile.as_ref());
    Ok(json!({ "metric": metric, "forecastDays": forecast_days, "model": outcome }))
}

async fn analyze_usage_patterns(params: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let system_id = get_str_or(params, "systemId", ctx.default_system_id);
    let pattern_type = get_str(params, "patternType")?;
    let time_range = get_str(params, "timeRange")?;
    let (from, to) = parse_slash_range(time_range)?;
    let records = ctx.store.records(system_id, from, to, Projection::Full).await?;

    let value = match pattern_type {
        "daily" => json!(analytics::load_profile::analyze(&records)),
        "anomalies" => json!(analytics::anomalies::analyze(&records)),
        other => {
            return Err(ToolError::InvalidParameters {
                tool: "patternType".to_string(),
                message: format!("unknown pattern type `{other}`"),
            })
        }
    };
    Ok(value)
}

async fn calculate_energy_budget(params: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
    let system_id = get_str_or(params, "systemId", ctx.default_system_id);
    let scenario = get_str(params, "scenario")?;
    let timeframe = get_str(params, "timeframe")?;
    let (from, to) = parse_slash_range(timeframe)?;
    let profile = ctx.store.system(system_id).await?;
    let records = ctx.store.records(system_id, from, to, Projection::Full).await?;

    if scenario == "current" {
        return Ok(json!(energy_balance::analyze(&records, profile.as_ref())));
    }

    let daily = energy_balance::daily_energy_totals(&records);
    if daily.is_empty() {
        return Ok(json!(AnalysisOutcome::<EnergyBalance>::insufficient(
            1,
            0,
            "no integrable intervals in timeframe",
        )));
    }
    let generation: Vec<f64> = daily.iter().map(|(_, g, _)| *g).collect();
    let consumption: Vec<f64> = daily.iter().map(|(_, _, c)| *c).collect();

    let (gen_pct, cons_pct, margin) = if scenario == "emergency" {
        (5.0, 95.0, 1.2)
    } else {
        (10.0, 90.0, 1.0)
    };
    let worst_generation_wh = percentile(&generation, gen_pct);
    let worst_consumption_wh = percentile(&consumption, cons_pct) * margin;
    let solar_sufficiency_pct = if worst_consumption_wh.abs() > 1e-6 {
        (worst_generation_wh / worst_consumption_wh * 100.0).min(100.0)
    } else {
        100.0
    };

    Ok(json!({
        "scenario": scenario,
        "worstCaseGenerationWh": worst_generation_wh,
        "worstCaseConsumptionWh": worst_consumption_wh,
        "solarSufficiencyPct": solar_sufficiency_pct,
        "daysSampled": daily.len(),
    }))
}

/// Validates parameters, times the call, and dispatches to the relevant
/// kernel or store operation. Never panics or propagates an error into the
/// conversation runner - every failure path is converted to
/// `ToolResult::Err`.
pub async fn execute(tool_name: &str, parameters: &Value, ctx: &ToolContext<'_>) -> ToolInvocationOutcome {
    let canonical = canonical_tool_name(tool_name);
    let started = Instant::now();

    let outcome: Result<Value, ToolError> = match canonical {
        super::catalog::REQUEST_BMS_DATA => request_bms_data(parameters, ctx).await,
        super::catalog::GET_SYSTEM_ANALYTICS => get_system_analytics(parameters, ctx).await,
        super::catalog::GET_WEATHER_DATA => get_weather_data(parameters, ctx).await,
        super::catalog::GET_SOLAR_ESTIMATE => get_solar_estimate(parameters, ctx).await,
        super::catalog::PREDICT_BATTERY_TRENDS => predict_battery_trends(parameters, ctx).await,
        super::catalog::ANALYZE_USAGE_PATTERNS => analyze_usage_patterns(parameters, ctx).await,
        super::catalog::CALCULATE_ENERGY_BUDGET => calculate_energy_budget(parameters, ctx).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    };

    let result = match outcome {
        Ok(value) => ToolResult::Ok(value),
        Err(err) => ToolResult::err(canonical, err.to_string()),
    };

    ToolInvocationOutcome {
        result,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
