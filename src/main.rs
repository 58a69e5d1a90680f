use anyhow::Result;
use solar_forecast_ml::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    if cfg.home_assistant.token.is_empty() || cfg.home_assistant.token.starts_with("__SET_VIA_ENV") {
        anyhow::bail!("SFML__HOME_ASSISTANT__TOKEN must be set to a Home Assistant long-lived access token");
    }

    let app_state = controller::AppState::new(&cfg)?;
    let coordinator = controller::build_coordinator(&cfg, app_state.board.clone())?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0, the forecast API is reachable from the network");
    }

    info!(
        %addr,
        timezone = %cfg.location.timezone,
        model_dir = %cfg.storage.model_dir.display(),
        "starting solar forecast service"
    );

    let controller_task = controller::spawn_controller_tasks(coordinator, &cfg);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    controller_task.abort();
    warn!("shutdown complete");
    Ok(())
}
