//! Output Formatter & Confidence Scorer (component G). Turns the model's
//! raw final text plus the tool-call trace into the `{rawText,
//! formattedText, healthStatus, performance, contextSummary}` payload the
//! engine returns.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::ToolInvocationRecord;
use crate::prompt::ContextSummary;

const UNCERTAINTY_PHRASES: &[&str] = &[
    "insufficient data",
    "cannot determine",
    "not enough data",
    "unable to determine",
];

const QUALITY_PHRASES: &[&str] = &["high confidence", "strong correlation", "clear trend"];

const CONFIDENCE_TOOL_KEYWORDS: &[&str] = &["predict", "pattern", "budget"];

const FRAMED_HEADER_MARKER: &str = "BATTERY INSIGHTS REPORT";

/// Coarse pass/fail read on pack health, derived from the text rather than
/// recomputed from analytics - the formatter only has the model's prose and
/// the tool trace to work with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Watch,
    AtRisk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    pub confidence: u8,
    pub tool_calls: usize,
    pub iterations: usize,
    pub used_function_calling: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insights {
    pub raw_text: String,
    pub formatted_text: String,
    pub health_status: HealthStatus,
    pub performance: Performance,
    pub context_summary: ContextSummary,
}

/// Confidence heuristic from §4.G: start at 100, subtract 15 if no tools
/// were used, subtract 20 if an uncertainty phrase appears, add 5 if a
/// quality phrase appears, add 10 if any tool name references a
/// forward-looking analysis. Clamped to `[0,100]`.
pub fn score_confidence(raw_text: &str, tool_calls: &[ToolInvocationRecord]) -> u8 {
    let lower = raw_text.to_lowercase();
    let mut score: i32 = 100;

    if tool_calls.is_empty() {
        score -= 15;
    }
    if UNCERTAINTY_PHRASES.iter().any(|p| lower.contains(p)) {
        score -= 20;
    }
    if QUALITY_PHRASES.iter().any(|p| lower.contains(p)) {
        score += 5;
    }
    if tool_calls.iter().any(|call| {
        let name = call.name.to_lowercase();
        CONFIDENCE_TOOL_KEYWORDS.iter().any(|kw| name.contains(kw))
    }) {
        score += 10;
    }

    score.clamp(0, 100) as u8
}

fn is_already_framed(text: &str) -> bool {
    text.contains(FRAMED_HEADER_MARKER)
        || (text.contains("## KEY FINDINGS") && text.contains("## OPERATIONAL STATUS"))
}

/// Derives a coarse health status from urgency markers in the rendered
/// text - 🔴 anywhere downgrades to at-risk, 🟡 without 🔴 downgrades to
/// watch, otherwise healthy.
fn infer_health_status(text: &str) -> HealthStatus {
    if text.contains('🔴') {
        HealthStatus::AtRisk
    } else if text.contains('🟡') {
        HealthStatus::Watch
    } else {
        HealthStatus::Healthy
    }
}

/// Wraps `raw_text` with a fixed header, confidence badge, tool-count line,
/// divider, trimmed body, and footer - unless it already carries the
/// required markdown sections, in which case it passes through unchanged.
pub fn format_response(raw_text: &str, confidence: u8, tool_calls: &[ToolInvocationRecord]) -> String {
    if is_already_framed(raw_text) {
        return raw_text.to_string();
    }

    let generated_at = Utc::now().to_rfc3339();
    format!(
        "# {FRAMED_HEADER_MARKER}\nConfidence: {confidence}/100\nTool calls: {tool_count}\n---\n{body}\n---\nGenerated at {generated_at}",
        tool_count = tool_calls.len(),
        body = raw_text.trim(),
    )
}

pub fn build_insights(
    raw_text: String,
    tool_calls: &[ToolInvocationRecord],
    iterations: usize,
    used_function_calling: bool,
    context_summary: ContextSummary,
) -> Insights {
    let confidence = score_confidence(&raw_text, tool_calls);
    let formatted_text = format_response(&raw_text, confidence, tool_calls);
    let health_status = infer_health_status(&formatted_text);

    Insights {
        raw_text,
        formatted_text,
        health_status,
        performance: Performance {
            confidence,
            tool_calls: tool_calls.len(),
            iterations,
            used_function_calling,
        },
        context_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> ToolInvocationRecord {
        ToolInvocationRecord {
            name: name.to_string(),
            parameters: serde_json::json!({}),
            iteration: 1,
            duration_ms: 10,
            error: None,
        }
    }

    #[test]
    fn no_tools_and_uncertainty_phrase_stack_penalties() {
        let score = score_confidence("Insufficient data to draw a conclusion.", &[]);
        assert_eq!(score, 100 - 15 - 20);
    }

    #[test]
    fn predictive_tool_and_quality_phrase_add_up() {
        let calls = vec![call("predict_battery_trends")];
        let score = score_confidence("We observe a strong correlation here.", &calls);
        assert_eq!(score, 100 + 5 + 10);
    }

    #[test]
    fn score_is_clamped_to_valid_range() {
        let calls = vec![call("predict_battery_trends"), call("analyze_usage_patterns")];
        let score = score_confidence("high confidence, strong correlation, clear trend", &calls);
        assert_eq!(score, 100);
    }

    #[test]
    fn already_framed_text_passes_through() {
        let text = "## KEY FINDINGS\n- fine\n## OPERATIONAL STATUS\n- nominal";
        assert_eq!(format_response(text, 80, &[]), text);
    }

    #[test]
    fn unframed_text_gets_wrapped() {
        let formatted = format_response("Body text.", 70, &[]);
        assert!(formatted.contains(FRAMED_HEADER_MARKER));
        assert!(formatted.contains("Confidence: 70/100"));
        assert!(formatted.contains("Body text."));
    }

    #[test]
    fn red_marker_yields_at_risk_status() {
        assert_eq!(infer_health_status("🔴 critical issue"), HealthStatus::AtRisk);
        assert_eq!(infer_health_status("🟡 watch this"), HealthStatus::Watch);
        assert_eq!(infer_health_status("🟢 all good"), HealthStatus::Healthy);
    }
}
