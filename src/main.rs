use anyhow::Result;
use meter_balance::{api, config::Config, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let state = api::AppState::new(&cfg)?;
    let app = api::router(state, &cfg);

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting meter-balance");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
