use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation as recorded in the conversation trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub name: String,
    pub parameters: Value,
    pub iteration: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}
