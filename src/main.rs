use anyhow::Result;
use upsert_loadgen::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    init_tracing(&cfg.log);

    let app_state = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting upsert load generator");

    controller::spawn_controller_tasks(app_state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    let unreported = app_state.controller.shutdown().await;
    warn!(
        unreported_writes = unreported.write_count,
        in_flight = app_state.controller.context().in_flight(),
        "shutdown complete"
    );
    Ok(())
}
