//! The engine entry point: wires the Context Assembler (D), Prompt Builder
//! (E), Conversation Runner (F), and Output Formatter (G) together behind
//! the single `generate_insights` call described in §6.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::context::{self, Budget};
use crate::domain::{validate_snapshot, EngineMode, Snapshot, ValidationFlag};
use crate::error::EngineError;
use crate::output::{build_insights, Insights};
use crate::prompt::build_prompt;
use crate::runner::hooks::{NoopHooks, RunnerHooks};
use crate::runner::{run, LlmClient, RunConfig};
use crate::store::TelemetryStore;
use crate::tools::{NoWeatherProvider, ToolContext, WeatherProvider};

const DEFAULT_SYSTEM_ID: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInsightsRequest {
    pub snapshot: Snapshot,
    pub system_id: Option<String>,
    pub user_prompt: Option<String>,
    pub mode: EngineMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResult {
    pub insights: Insights,
    pub tool_calls: Vec<crate::domain::ToolInvocationRecord>,
    pub iterations: usize,
    pub used_function_calling: bool,
    pub warning: Option<String>,
    pub validation_flags: Vec<ValidationFlag>,
}

/// Runs the whole reasoning pipeline for one request. Snapshot validation
/// failures are recorded on the result (§7 `ValidationError`); they never
/// abort the loop.
pub async fn generate_insights(
    request: GenerateInsightsRequest,
    store: Arc<dyn TelemetryStore>,
    weather: Option<Arc<dyn WeatherProvider>>,
    llm: Arc<dyn LlmClient>,
    config: &AppConfig,
    hooks: Option<Arc<dyn RunnerHooks>>,
    cancellation: CancellationToken,
) -> Result<InsightsResult, EngineError> {
    let validation_flags = validate_snapshot(&request.snapshot);
    let system_id = request.system_id.as_deref().unwrap_or(DEFAULT_SYSTEM_ID);
    let hooks: Arc<dyn RunnerHooks> = hooks.unwrap_or_else(|| Arc::new(NoopHooks));
    let no_weather: Arc<dyn WeatherProvider> = Arc::new(NoWeatherProvider);
    let weather = weather.unwrap_or(no_weather);

    let bundle = context::assemble_context(
        system_id,
        &request.snapshot,
        store.as_ref(),
        Some(weather.as_ref()),
        request.mode,
        Budget::from_config(request.mode, &config.context),
    )
    .await;
    let truncated = bundle.meta.as_ref().is_some_and(|m| m.truncated);
    crate::runner::hooks::guarded("on_context_built", || hooks.on_context_built(truncated));

    let (initial_prompt, context_summary) = build_prompt(
        &bundle,
        &request.snapshot,
        request.mode,
        request.user_prompt.as_deref(),
    );

    let tool_ctx = ToolContext {
        store: store.as_ref(),
        weather: weather.as_ref(),
        default_system_id: system_id,
    };

    let run_config = RunConfig::from(&config.runner);
    let outcome = run(
        llm.as_ref(),
        tool_ctx,
        initial_prompt,
        run_config,
        hooks.as_ref(),
        cancellation,
    )
    .await?;

    let insights = build_insights(
        outcome.raw_text,
        &outcome.tool_calls,
        outcome.iterations,
        outcome.used_function_calling,
        context_summary,
    );

    Ok(InsightsResult {
        insights,
        tool_calls: outcome.tool_calls,
        iterations: outcome.iterations,
        used_function_calling: outcome.used_function_calling,
        warning: outcome.warning,
        validation_flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockLlmClient;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn end_to_end_sync_mode_reaches_final_answer() {
        let store: Arc<dyn TelemetryStore> = Arc::new(InMemoryStore::new());
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(vec![
            r#"{"final_answer": "## KEY FINDINGS\n- 🟢 nominal\n## RECOMMENDATIONS\n- 🟢 none (from context)"}"#,
        ]));
        let config = AppConfig::default();

        let request = GenerateInsightsRequest {
            snapshot: Snapshot {
                voltage: Some(52.1),
                current: Some(-12.0),
                soc: Some(48.0),
                ..Default::default()
            },
            system_id: Some("sys-1".to_string()),
            user_prompt: None,
            mode: EngineMode::Sync,
        };

        let result = generate_insights(
            request,
            store,
            None,
            llm,
            &config,
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.iterations, 1);
        assert!(result.insights.formatted_text.contains("BATTERY INSIGHTS REPORT") || result.insights.formatted_text.contains("KEY FINDINGS"));
        assert!(result.validation_flags.is_empty());
    }

    #[tokio::test]
    async fn invalid_soc_is_recorded_but_does_not_abort() {
        let store: Arc<dyn TelemetryStore> = Arc::new(InMemoryStore::new());
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(vec![
            r#"{"final_answer": "## KEY FINDINGS\n- check\n## RECOMMENDATIONS\n- 🔴 investigate"}"#,
        ]));
        let config = AppConfig::default();

        let request = GenerateInsightsRequest {
            snapshot: Snapshot {
                soc: Some(150.0),
                ..Default::default()
            },
            system_id: None,
            user_prompt: None,
            mode: EngineMode::Sync,
        };

        let result = generate_insights(
            request,
            store,
            None,
            llm,
            &config,
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!result.validation_flags.is_empty());
    }
}
