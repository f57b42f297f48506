//! Thin HTTP entry point. A single `POST /api/v1/insights` route fronting
//! `engine::generate_insights`, plus liveness/readiness probes.

pub mod error;
pub mod health;
pub mod insights;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::runner::{HttpLlmClient, LlmClient};
use crate::store::{InMemoryStore, TelemetryStore};
use crate::tools::{NoWeatherProvider, WeatherProvider};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub weather: Option<Arc<dyn WeatherProvider>>,
    pub llm: Arc<dyn LlmClient>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let llm = HttpLlmClient::new(
            config.llm.endpoint.clone(),
            Duration::from_millis(config.llm.timeout_ms),
        );
        Self {
            store: Arc::new(InMemoryStore::new()),
            weather: Some(Arc::new(NoWeatherProvider)),
            llm: Arc::new(llm),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/insights", post(insights::create_insights))
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
