use anyhow::Result;
use tracing::info;

use battery_insights_engine::api::{router, AppState};
use battery_insights_engine::config::AppConfig;
use battery_insights_engine::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = AppConfig::load()?;
    let addr = cfg.server.socket_addr()?;
    let state = AppState::new(cfg);
    let app = router(state);

    info!(%addr, "starting battery insights engine");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}
