use axum::http::StatusCode;

/// GET /health/live - process is running.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready - always ready once bound, since the engine has no
/// external connections of its own to warm up (store and LLM client are
/// constructed at startup).
pub async fn readiness_check() -> StatusCode {
    StatusCode::OK
}
