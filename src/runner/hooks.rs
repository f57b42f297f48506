//! Progress hooks (§4.F.5). Every hook is best-effort: a panicking hook
//! implementation logs a warning and the loop continues untouched.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub preview: String,
    pub full: String,
}

#[derive(Debug, Clone)]
pub struct ResponsePayload {
    pub preview: String,
    pub full: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallPayload {
    pub name: String,
    pub parameters: Value,
    pub iteration: usize,
}

#[derive(Debug, Clone)]
pub struct ToolResultPayload {
    pub name: String,
    pub result: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ErrorPayload {
    pub message: String,
}

const PREVIEW_LEN: usize = 280;

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_LEN).collect()
}

/// Progress hooks the caller can supply to observe a run as it happens.
/// Every method is a no-op by default and called through [`guarded`], so a
/// panicking implementation cannot take down the loop.
pub trait RunnerHooks: Send + Sync {
    fn on_context_built(&self, _truncated: bool) {}
    fn on_iteration_start(&self, _iteration: usize) {}
    fn on_prompt_sent(&self, _payload: &PromptPayload) {}
    fn on_response_received(&self, _payload: &ResponsePayload) {}
    fn on_tool_call(&self, _payload: &ToolCallPayload) {}
    fn on_tool_result(&self, _payload: &ToolResultPayload) {}
    fn on_partial_update(&self, _final: bool) {}
    fn on_final_answer(&self, _text: &str) {}
    fn on_error(&self, _payload: &ErrorPayload) {}
}

/// The default hook set, used when a caller doesn't supply one.
pub struct NoopHooks;

impl RunnerHooks for NoopHooks {}

/// Runs `f`, catching and logging a panic rather than letting it escape
/// into the reasoning loop. Callers do not need their closures to be
/// `UnwindSafe` themselves - a hook panicking mid-call is exactly the
/// scenario this exists to contain.
pub fn guarded(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(hook = name, "hook panicked; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PanickingHooks;
    impl RunnerHooks for PanickingHooks {
        fn on_iteration_start(&self, _iteration: usize) {
            panic!("boom");
        }
    }

    #[test]
    fn panicking_hook_is_caught_and_logged() {
        let hooks = PanickingHooks;
        guarded("on_iteration_start", || hooks.on_iteration_start(1));
    }

    #[test]
    fn noop_hooks_do_nothing_observable() {
        let calls = AtomicUsize::new(0);
        let hooks = NoopHooks;
        hooks.on_final_answer("done");
        guarded("on_final_answer", || hooks.on_final_answer("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
