use thiserror::Error;

use crate::domain::ValidationFlag;

/// Typed error surface for the insights engine. Per the propagation policy:
/// tool failures and insufficient-data are reported into the conversation,
/// never raised as one of these; `Deadline`, `Cancelled`, and
/// `ModelUnresponsive` are terminal; `ValidationError` is recorded on the
/// result without aborting the reasoning loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("telemetry store error: {0}")]
    Store(#[from] StoreError),

    #[error("the model emitted non-JSON content that could not be recovered: {0}")]
    Parse(String),

    #[error("model produced {consecutive_empty} consecutive empty responses; aborting")]
    ModelUnresponsive { consecutive_empty: u32 },

    #[error("deadline exceeded at iteration {iteration}/{max_iterations} ({elapsed_secs:.1}s elapsed). Try simplifying your question.")]
    Deadline {
        iteration: usize,
        max_iterations: usize,
        elapsed_secs: f64,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("snapshot failed physical validation: {0:?}")]
    Validation(Vec<ValidationFlag>),
}

/// Errors surfaced by the Telemetry Store Adapter. Transient failures are
/// retried internally by the adapter; only a final failure reaches this
/// type, and the engine degrades by substituting "insufficient data"
/// rather than aborting.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("system {0} not found")]
    SystemNotFound(String),
}

/// Errors surfaced by the Tool Catalog & Executor. These are never raised
/// into the Conversation Runner - the executor turns them into a
/// `{error: true, tool, message}` payload that is appended to the
/// conversation as a user turn.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("parameter validation failed for {tool}: {message}")]
    InvalidParameters { tool: String, message: String },

    #[error("downstream call failed: {0}")]
    Downstream(#[from] StoreError),
}

/// Errors surfaced by the LLM client abstraction.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("generation timed out")]
    Timeout,

    #[error("generation failed: {0}")]
    Provider(String),
}
