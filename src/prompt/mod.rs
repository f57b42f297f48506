//! Prompt Builder (component E). Renders the initial prompt handed to the
//! Conversation Runner from the `ContextBundle` the assembler produced, and
//! a parallel machine-readable `ContextSummary` for the caller's UI.

use serde::{Deserialize, Serialize};

use crate::analytics::outcome::AnalysisOutcome;
use crate::context::ContextBundle;
use crate::domain::{EngineMode, Snapshot, WeatherObservation};
use crate::tools::tool_catalog;

const DEFAULT_MISSION: &str =
    "Assess this battery system's health, confirm it can sufficiently power its load, and proactively \
     flag anything that needs attention before it becomes a problem.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotSummary {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub soc: Option<f64>,
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecentSnapshotDeltas {
    pub soc_delta: Option<f64>,
    pub voltage_delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContextSummary {
    pub snapshot: SnapshotSummary,
    pub autonomy_hours: Option<f64>,
    pub worst_case_days: Option<f64>,
    pub predicted_days_to_threshold: Option<f64>,
    pub anomaly_count: Option<usize>,
    pub weather: Option<WeatherObservation>,
    pub recent_snapshot_deltas: RecentSnapshotDeltas,
    pub truncated: bool,
}

fn persona_preamble() -> String {
    "You are the battery guru: a domain expert embedded in a solar/battery monitoring system. \
     Your three goals, in order, are (1) assess the pack's health, (2) confirm the system is \
     sufficient for its load, and (3) proactively surface anything worth attention before it \
     becomes a failure."
        .to_string()
}

fn execution_guidance(mode: EngineMode, bundle: &ContextBundle) -> String {
    let coverage = if bundle.analytics.is_some() {
        "The preloaded context already includes the full analytics suite, predictions, and \
         energy budgets - prefer answering from it and only call tools to fill a specific gap."
    } else {
        "The preloaded context is lean (sync mode): only the system profile, a 7-day summary, \
         recent snapshots, battery facts, night-discharge, and solar variance were loaded. Call \
         tools for anything deeper - analytics, predictions, or a wider history window."
    };

    let cycle_note = match bundle.battery_facts.as_ref().and_then(|f| f.cycle_count) {
        Some(c) if c <= 50 => {
            "The pack has a low cycle count and is likely a recent install - treat apparent \
             capacity decline as a monitoring item, not a firm finding."
                .to_string()
        }
        Some(c) => format!("The pack has logged {c} cycles."),
        None => "Cycle count is unknown.".to_string(),
    };

    let solar_note = match bundle.solar_variance.as_ref() {
        Some(v) if !v.within_tolerance => {
            "Observed solar charging diverges from the expected weather-modeled estimate by more \
             than the tolerance band - call out a possible panel, wiring, or soiling issue."
                .to_string()
        }
        Some(_) => "Observed solar charging is within the expected tolerance of the weather model.".to_string(),
        None => "No solar-variance baseline is available for this system.".to_string(),
    };

    format!(
        "Mode: {mode:?}. {coverage} {cycle_note} {solar_note}",
        mode = mode
    )
}

fn render_tool_catalog() -> String {
    let mut out = String::from("Available tools:\n");
    for spec in tool_catalog() {
        let params: Vec<&str> = spec.parameters.iter().map(|p| p.name).collect();
        let description: String = spec.description.chars().take(140).collect();
        out.push_str(&format!("- {}({}): {}\n", spec.name, params.join(", "), description));
    }
    out
}

fn outcome_block<T>(title: &str, outcome: Option<&AnalysisOutcome<T>>, render_ok: impl Fn(&T) -> Vec<String>) -> String {
    let mut block = format!("## {title}\n");
    match outcome {
        None => block.push_str("- not loaded in this context; call a tool to fetch it\n"),
        Some(AnalysisOutcome::InsufficientData { minimum_required, actual, reason }) => {
            block.push_str(&format!(
                "- insufficient data: need {minimum_required}, have {actual} ({reason})\n"
            ));
        }
        Some(AnalysisOutcome::Ok(value)) => {
            for line in render_ok(value) {
                block.push_str(&format!("- {line}\n"));
            }
        }
    }
    block
}

fn context_sections(bundle: &ContextBundle) -> String {
    let mut sections = String::new();

    if let Some(summary) = &bundle.initial_summary {
        sections.push_str(&format!(
            "## 7-DAY SUMMARY\n- {} records spanning {:.1} days\n- avg SOC {}\n- avg voltage {}\n",
            summary.record_count,
            summary.span_days,
            summary.avg_soc.map(|v| format!("{v:.1}%")).unwrap_or_else(|| "unknown".into()),
            summary.avg_voltage.map(|v| format!("{v:.1}V")).unwrap_or_else(|| "unknown".into()),
        ));
    } else {
        sections.push_str("## 7-DAY SUMMARY\n- insufficient data\n");
    }

    if let Some(facts) = &bundle.battery_facts {
        sections.push_str(&format!(
            "## BATTERY FACTS\n- chemistry: {}\n- rated capacity: {}\n- cycle count: {}\n- likely new install: {}\n",
            facts.chemistry.clone().unwrap_or_else(|| "unknown".into()),
            facts.rated_capacity_ah.map(|v| format!("{v:.0}Ah")).unwrap_or_else(|| "unknown".into()),
            facts.cycle_count.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
            facts.brand_new_likely,
        ));
    }

    if let Some(analytics) = &bundle.analytics {
        sections.push_str(&outcome_block("LOAD PROFILE", Some(&analytics.load_profile), |p| {
            vec![
                format!("interpretation: {:?}", p.interpretation),
                format!("night avg {:.0}W, day avg {:.0}W, baseload {:.0}W", p.night_avg_watts, p.day_avg_watts, p.baseload_watts),
            ]
        }));
        sections.push_str(&outcome_block("ENERGY BALANCE", Some(&analytics.energy_balance), |b| {
            vec![
                format!("solar sufficiency {:.0}%", b.solar_sufficiency_pct),
                format!(
                    "autonomy {}",
                    b.battery_autonomy_hours.map(|h| format!("{h:.1}h")).unwrap_or_else(|| "unknown".into())
                ),
                format!("deficit detected: {}", b.deficit_detected),
            ]
        }));
        sections.push_str(&outcome_block("SOLAR PERFORMANCE", Some(&analytics.solar_performance), |p| {
            vec![format!("rating {:?}, {:.0}% of expected output", p.rating, p.performance_ratio_pct)]
        }));
        sections.push_str(&outcome_block("BATTERY HEALTH", Some(&analytics.health), |h| {
            vec![
                format!("score {}/100", h.score),
                format!(
                    "imbalance {} ({})",
                    h.imbalance_mv.map(|v| format!("{v:.0}mV")).unwrap_or_else(|| "unknown".into()),
                    h.imbalance_rating.map(|r| format!("{r:?}")).unwrap_or_else(|| "unknown".into()),
                ),
                format!(
                    "cycle life: {}",
                    h.cycle_life_status.map(|s| format!("{s:?}")).unwrap_or_else(|| "unknown".into())
                ),
            ]
        }));
        sections.push_str(&outcome_block("USAGE PATTERNS", Some(&analytics.usage_patterns), |u| {
            vec![format!(
                "{:?} usage, {:.1} cycles/day, deepest discharge {:.0}%",
                u.pattern, u.cycles_per_day, u.deepest_discharge_pct
            )]
        }));
        sections.push_str(&outcome_block("TRENDS", Some(&analytics.trends), |t| {
            vec![format!(
                "SOC trend: {}",
                t.soc
                    .as_ref()
                    .map(|m| format!("{:?}", m.direction))
                    .unwrap_or_else(|| "unknown".into())
            )]
        }));
        sections.push_str(&outcome_block("ANOMALIES", Some(&analytics.anomalies), |a| {
            vec![format!("{} anomalies detected", a.len())]
        }));
        sections.push_str(&outcome_block("WEATHER IMPACT", Some(&analytics.weather_impact), |w| {
            vec![format!(
                "reduction on overcast days: {}",
                w.reduction_pct.map(|r| format!("{r:.0}%")).unwrap_or_else(|| "unknown".into())
            )]
        }));
        sections.push_str(&outcome_block("PREDICTIONS", Some(&analytics.predictive), |p| {
            vec![
                format!("service life outlook: {:?}", p.service_life_outlook),
                format!(
                    "ensemble days to threshold: {}",
                    p.ensemble_days_to_threshold.map(|d| format!("{d:.0}")).unwrap_or_else(|| "unknown".into())
                ),
            ]
        }));
    } else {
        sections.push_str("## ANALYTICS\n- not loaded in this context (sync mode) - call tools for deeper analysis\n");
    }

    sections.push_str(&outcome_block("NIGHT DISCHARGE", bundle.night_discharge.as_ref(), |r| {
        let mut lines = Vec::new();
        if let Some(night) = &r.night_discharge {
            lines.push(format!("{:.1}Ah over {:.1}h across {} run(s)", night.total_ah, night.total_hours, night.run_count));
        } else {
            lines.push("no qualifying night-discharge runs".to_string());
        }
        if let Some(variance) = &r.solar_variance {
            lines.push(format!(
                "solar variance within tolerance: {} (expected {:.1}Ah, observed {:.1}Ah)",
                variance.within_tolerance, variance.expected_solar_ah, variance.observed_charging_ah
            ));
        }
        lines
    }));

    if let Some(weather) = &bundle.weather {
        sections.push_str(&format!(
            "## WEATHER\n- clouds {}%, temp {}\n",
            weather.clouds_pct.map(|c| format!("{c:.0}")).unwrap_or_else(|| "unknown".into()),
            weather.temp_c.map(|t| format!("{t:.0}C")).unwrap_or_else(|| "unknown".into()),
        ));
    } else {
        sections.push_str("## WEATHER\n- insufficient data\n");
    }

    sections
}

const RESPONSE_RULES: &str = "\
Response rules (must follow exactly):
1. Emit exactly one JSON value per turn: either {\"tool_call\": <name>, \"parameters\": {...}} or {\"final_answer\": \"<markdown>\"}.
2. \"battery autonomy/runtime\" means time until discharge at the current load; \"service life/lifetime\" means time until replacement due to degradation. These two must never be conflated.
3. The final answer must use markdown sections \"## KEY FINDINGS\" and \"## RECOMMENDATIONS\", with urgency markers 🔴/🟡/🟢 and source citations embedded parenthetically in the bullets.
4. Cite the tool or context section backing any quantitative claim.
5. When a section is reported as insufficient data, say so rather than guessing.
6. Do not call more tools than necessary to support the three goals.";

fn recent_snapshot_deltas(bundle: &ContextBundle) -> RecentSnapshotDeltas {
    let first = bundle.recent_snapshots.last();
    let last = bundle.recent_snapshots.first();
    match (first, last) {
        (Some(oldest), Some(newest)) => RecentSnapshotDeltas {
            soc_delta: newest.analysis.soc.zip(oldest.analysis.soc).map(|(n, o)| n - o),
            voltage_delta: newest.analysis.voltage.zip(oldest.analysis.voltage).map(|(n, o)| n - o),
        },
        _ => RecentSnapshotDeltas::default(),
    }
}

fn worst_case_autonomy_days(bundle: &ContextBundle, snapshot: &Snapshot) -> Option<f64> {
    let budgets = bundle.energy_budgets.as_ref()?;
    let worst_case = budgets.worst_case.as_ref()?;
    let profile = bundle.system_profile.as_ref()?;
    let soc = snapshot.soc?;
    let usable_wh = profile.rated_capacity_ah * profile.nominal_voltage * (soc / 100.0) * 0.8;
    let daily_deficit_wh = (worst_case.worst_case_consumption_wh - worst_case.worst_case_generation_wh).max(0.0);
    if daily_deficit_wh > 1e-6 {
        Some(usable_wh / daily_deficit_wh)
    } else {
        None
    }
}

pub fn build_context_summary(bundle: &ContextBundle, snapshot: &Snapshot) -> ContextSummary {
    let autonomy_hours = bundle
        .energy_budgets
        .as_ref()
        .and_then(|b| b.current.ok())
        .and_then(|b| b.battery_autonomy_hours);

    let predicted_days_to_threshold = bundle
        .predictions
        .as_ref()
        .and_then(|p| p.capacity.ok())
        .and_then(|p| p.ensemble_days_to_threshold);

    let anomaly_count = bundle
        .analytics
        .as_ref()
        .and_then(|a| a.anomalies.ok())
        .map(|anomalies| anomalies.len());

    ContextSummary {
        snapshot: SnapshotSummary {
            voltage: snapshot.voltage,
            current: snapshot.current,
            power: snapshot.power,
            soc: snapshot.soc,
            temperature_c: snapshot.temperature_c,
        },
        autonomy_hours,
        worst_case_days: worst_case_autonomy_days(bundle, snapshot),
        predicted_days_to_threshold,
        anomaly_count,
        weather: bundle.weather.clone(),
        recent_snapshot_deltas: recent_snapshot_deltas(bundle),
        truncated: bundle.meta.as_ref().is_some_and(|m| m.truncated),
    }
}

/// Renders the initial prompt and its machine-readable counterpart.
pub fn build_prompt(
    bundle: &ContextBundle,
    snapshot: &Snapshot,
    mode: EngineMode,
    mission: Option<&str>,
) -> (String, ContextSummary) {
    let mission_statement = mission.unwrap_or(DEFAULT_MISSION);

    let prompt = format!(
        "{persona}\n\n{guidance}\n\n{catalog}\n{sections}\nMISSION: {mission_statement}\n\n{rules}\n",
        persona = persona_preamble(),
        guidance = execution_guidance(mode, bundle),
        catalog = render_tool_catalog(),
        sections = context_sections(bundle),
        rules = RESPONSE_RULES,
    );

    let summary = build_context_summary(bundle, snapshot);
    (prompt, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBundle;

    #[test]
    fn prompt_includes_persona_catalog_and_rules() {
        let bundle = ContextBundle::default();
        let snapshot = Snapshot::default();
        let (prompt, _summary) = build_prompt(&bundle, &snapshot, EngineMode::Sync, None);
        assert!(prompt.contains("battery guru"));
        assert!(prompt.contains("request_bms_data"));
        assert!(prompt.contains("Response rules"));
        assert!(prompt.contains("never be conflated"));
    }

    #[test]
    fn missing_analytics_notes_insufficient_context() {
        let bundle = ContextBundle::default();
        let snapshot = Snapshot::default();
        let (prompt, summary) = build_prompt(&bundle, &snapshot, EngineMode::Sync, None);
        assert!(prompt.contains("not loaded in this context"));
        assert!(!summary.truncated);
    }

    #[test]
    fn user_mission_overrides_default() {
        let bundle = ContextBundle::default();
        let snapshot = Snapshot::default();
        let (prompt, _summary) = build_prompt(&bundle, &snapshot, EngineMode::Sync, Some("Check the cabin pack."));
        assert!(prompt.contains("Check the cabin pack."));
        assert!(!prompt.contains(DEFAULT_MISSION));
    }
}
