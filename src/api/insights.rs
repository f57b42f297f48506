use std::time::Instant;

use axum::{extract::State, Json};
use tokio_util::sync::CancellationToken;

use crate::engine::{self, GenerateInsightsRequest, InsightsResult};

use super::error::ApiError;
use super::response::ApiResponse;
use super::AppState;

/// POST /api/v1/insights
pub async fn create_insights(
    State(state): State<AppState>,
    Json(request): Json<GenerateInsightsRequest>,
) -> Result<ApiResponse<InsightsResult>, ApiError> {
    let started = Instant::now();

    let result = engine::generate_insights(
        request,
        state.store.clone(),
        state.weather.clone(),
        state.llm.clone(),
        &state.config,
        None,
        CancellationToken::new(),
    )
    .await?;

    Ok(ApiResponse::success(result).with_duration(started.elapsed().as_millis() as u64))
}
