//! Conversation Runner (component F): a bounded ReAct-style loop that sends
//! the prompt to the LLM, parses the reply as a tool call or a final
//! answer, dispatches tool calls through the executor, prunes history
//! under a token budget, and enforces per-iteration and total deadlines.

pub mod compaction;
pub mod hooks;
pub mod http_client;
pub mod pruning;
pub mod recovery;

pub use http_client::HttpLlmClient;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::domain::{Role, ToolInvocationRecord, Turn};
use crate::error::{EngineError, LlmError};
use crate::tools::{execute, ToolContext, ToolResult};

use compaction::compact_tool_result;
use hooks::{
    guarded, preview, ErrorPayload, NoopHooks, PromptPayload, ResponsePayload, RunnerHooks,
    ToolCallPayload, ToolResultPayload,
};
use pruning::prune_history;
use recovery::{recover_empty, recover_unparseable, EmptyResponseOutcome, UnparseableOutcome};

/// Standardized text returned when iterations are exhausted without a
/// final answer (§4.F step 13).
pub const FALLBACK_TEXT: &str = "## KEY FINDINGS\n\
    - The reasoning loop reached its iteration limit before producing a final answer.\n\
    ## RECOMMENDATIONS\n\
    - 🟡 Retry with a narrower question, or inspect the tool trace for where the model got stuck.";

/// Client abstraction over the underlying LLM provider. `generate` receives
/// the rendered transcript and returns the model's raw text (or an error
/// for transport/provider failures, distinct from a timeout).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, transcript: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    ToolCall { name: String, parameters: Value },
    FinalAnswer(String),
    Unparseable(String),
    Empty,
}

fn extract_parsed(value: &Value) -> Option<ParsedResponse> {
    if let Some(name) = value.get("tool_call").and_then(Value::as_str) {
        let parameters = value.get("parameters").cloned().unwrap_or_else(|| json!({}));
        return Some(ParsedResponse::ToolCall {
            name: name.to_string(),
            parameters,
        });
    }
    if let Some(answer) = value.get("final_answer").and_then(Value::as_str) {
        return Some(ParsedResponse::FinalAnswer(answer.to_string()));
    }
    None
}

fn extract_fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn extract_balanced_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a raw model reply as strict JSON, then a fenced ` ```json ` block,
/// then the first balanced `{...}` substring, before giving up as
/// unparseable text.
pub fn parse_response(text: &str) -> ParsedResponse {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedResponse::Empty;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(parsed) = extract_parsed(&value) {
            return parsed;
        }
    }
    if let Some(candidate) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(parsed) = extract_parsed(&value) {
                return parsed;
            }
        }
    }
    if let Some(candidate) = extract_balanced_braces(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(parsed) = extract_parsed(&value) {
                return parsed;
            }
        }
    }

    ParsedResponse::Unparseable(trimmed.to_string())
}

fn render_transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
            };
            format!("[{role}]\n{}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub max_iterations: usize,
    pub iteration_timeout_ms: u64,
    pub total_timeout_ms: u64,
    pub conversation_token_limit: usize,
    pub tokens_per_char: f64,
}

impl From<&RunnerConfig> for RunConfig {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            iteration_timeout_ms: config.iteration_timeout_ms,
            total_timeout_ms: config.total_timeout_ms,
            conversation_token_limit: config.conversation_token_limit,
            tokens_per_char: config.tokens_per_char,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub raw_text: String,
    pub tool_calls: Vec<ToolInvocationRecord>,
    pub iterations: usize,
    pub used_function_calling: bool,
    pub warning: Option<String>,
}

/// Drives the bounded reasoning loop to completion (§4.F steps 5-13). The
/// only recognized terminal outcomes are a final answer, a deadline, model
/// unresponsiveness, or cancellation; exhausting `max_iterations` is *not*
/// terminal - it returns `Ok` with a fallback text and a warning.
pub async fn run(
    llm: &dyn LlmClient,
    ctx: ToolContext<'_>,
    initial_prompt: String,
    config: RunConfig,
    hooks: &dyn RunnerHooks,
    cancellation: CancellationToken,
) -> Result<RunOutcome, EngineError> {
    let start = Instant::now();
    let total_timeout = Duration::from_millis(config.total_timeout_ms);
    let iteration_timeout = Duration::from_millis(config.iteration_timeout_ms);

    let mut history = vec![Turn::user(initial_prompt)];
    let mut tool_calls: Vec<ToolInvocationRecord> = Vec::new();
    let mut used_function_calling = false;

    for iteration in 1..=config.max_iterations {
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let elapsed = start.elapsed();
        if elapsed >= total_timeout {
            return Err(EngineError::Deadline {
                iteration,
                max_iterations: config.max_iterations,
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }

        guarded("on_iteration_start", || hooks.on_iteration_start(iteration));

        let (pruned_history, prune_report) =
            prune_history(&history, config.conversation_token_limit, config.tokens_per_char);
        if prune_report.pruned {
            info!(
                iteration,
                before_tokens = prune_report.before_tokens,
                after_tokens = prune_report.after_tokens,
                "conversation history pruned before this iteration"
            );
        }
        let transcript = render_transcript(&pruned_history);

        let prompt_payload = PromptPayload {
            preview: preview(&transcript),
            full: transcript.clone(),
        };
        guarded("on_prompt_sent", || hooks.on_prompt_sent(&prompt_payload));

        let remaining_total = total_timeout.saturating_sub(start.elapsed());
        let per_iteration_budget = remaining_total.min(iteration_timeout);

        let raw_text = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(EngineError::Cancelled);
            }
            generated = tokio::time::timeout(per_iteration_budget, llm.generate(&transcript)) => {
                match generated {
                    Err(_elapsed) => {
                        let payload = ErrorPayload { message: "LLM generation timed out".to_string() };
                        guarded("on_error", || hooks.on_error(&payload));
                        return Err(EngineError::Deadline {
                            iteration,
                            max_iterations: config.max_iterations,
                            elapsed_secs: start.elapsed().as_secs_f64(),
                        });
                    }
                    Ok(Err(LlmError::Timeout)) => {
                        let payload = ErrorPayload { message: "LLM generation timed out".to_string() };
                        guarded("on_error", || hooks.on_error(&payload));
                        return Err(EngineError::Deadline {
                            iteration,
                            max_iterations: config.max_iterations,
                            elapsed_secs: start.elapsed().as_secs_f64(),
                        });
                    }
                    Ok(Err(LlmError::Provider(message))) => {
                        // A provider hiccup is recovered the same way an
                        // empty reply is: it consumes a strike rather than
                        // aborting immediately, since retrying often works.
                        warn!(iteration, %message, "llm provider error; treating as empty response");
                        String::new()
                    }
                    Ok(Ok(text)) => text,
                }
            }
        };

        let response_payload = ResponsePayload {
            preview: preview(&raw_text),
            full: raw_text.clone(),
        };
        guarded("on_response_received", || hooks.on_response_received(&response_payload));

        match parse_response(&raw_text) {
            ParsedResponse::ToolCall { name, parameters } => {
                used_function_calling = true;
                let call_payload = ToolCallPayload {
                    name: name.clone(),
                    parameters: parameters.clone(),
                    iteration,
                };
                guarded("on_tool_call", || hooks.on_tool_call(&call_payload));

                let outcome = execute(&name, &parameters, &ctx).await;
                history.push(Turn::assistant(raw_text.clone()));

                match outcome.result {
                    ToolResult::Ok(value) => {
                        tool_calls.push(ToolInvocationRecord {
                            name: name.clone(),
                            parameters: parameters.clone(),
                            iteration,
                            duration_ms: outcome.duration_ms,
                            error: None,
                        });
                        let compacted = compact_tool_result(value);
                        let result_payload = ToolResultPayload {
                            name: name.clone(),
                            result: compacted.clone(),
                            duration_ms: outcome.duration_ms,
                        };
                        guarded("on_tool_result", || hooks.on_tool_result(&result_payload));

                        let remaining_iterations = config.max_iterations.saturating_sub(iteration);
                        history.push(Turn::user(format!(
                            "Tool result for {name}:\n{compacted}\n\n\
                             {remaining_iterations} iteration(s) remaining - finalize your answer now if this data is sufficient."
                        )));
                    }
                    ToolResult::Err { message, tool, .. } => {
                        tool_calls.push(ToolInvocationRecord {
                            name: name.clone(),
                            parameters: parameters.clone(),
                            iteration,
                            duration_ms: outcome.duration_ms,
                            error: Some(message.clone()),
                        });
                        history.push(Turn::user(format!("Tool {tool} failed: {message}")));
                    }
                }
            }

            ParsedResponse::FinalAnswer(text) => {
                guarded("on_partial_update", || hooks.on_partial_update(true));
                guarded("on_final_answer", || hooks.on_final_answer(&text));
                return Ok(RunOutcome {
                    raw_text: text,
                    tool_calls,
                    iterations: iteration,
                    used_function_calling,
                    warning: None,
                });
            }

            ParsedResponse::Unparseable(text) => match recover_unparseable(&text) {
                UnparseableOutcome::TreatAsFinal(final_text) => {
                    guarded("on_partial_update", || hooks.on_partial_update(true));
                    guarded("on_final_answer", || hooks.on_final_answer(&final_text));
                    return Ok(RunOutcome {
                        raw_text: final_text,
                        tool_calls,
                        iterations: iteration,
                        used_function_calling,
                        warning: None,
                    });
                }
                UnparseableOutcome::RequestedDataShape { history_additions }
                | UnparseableOutcome::DemandJson { history_additions } => {
                    history.extend(history_additions);
                }
            },

            ParsedResponse::Empty => match recover_empty(&history, iteration) {
                EmptyResponseOutcome::Reminder { history_addition } => {
                    history.push(history_addition);
                }
                EmptyResponseOutcome::Unresponsive { consecutive_empty } => {
                    let payload = ErrorPayload {
                        message: format!("model produced {consecutive_empty} consecutive empty responses"),
                    };
                    guarded("on_error", || hooks.on_error(&payload));
                    return Err(EngineError::ModelUnresponsive { consecutive_empty });
                }
            },
        }
    }

    Ok(RunOutcome {
        raw_text: FALLBACK_TEXT.to_string(),
        tool_calls,
        iterations: config.max_iterations,
        used_function_calling,
        warning: Some(format!(
            "reached the {}-iteration limit without a final answer",
            config.max_iterations
        )),
    })
}

/// A scripted [`LlmClient`] for tests: returns each queued response in
/// order, optionally after an artificial delay to exercise the
/// per-iteration timeout path.
pub struct MockLlmClient {
    responses: parking_lot::Mutex<std::collections::VecDeque<String>>,
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses.into_iter().map(String::from).collect()),
            delay: None,
        }
    }

    pub fn with_delay(responses: Vec<&str>, delay: Duration) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses.into_iter().map(String::from).collect()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, _transcript: &str) -> Result<String, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut queue = self.responses.lock();
        queue
            .pop_front()
            .ok_or_else(|| LlmError::Provider("mock exhausted".to_string()))
    }
}

pub fn noop_hooks() -> NoopHooks {
    NoopHooks
}
