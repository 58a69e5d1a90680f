pub mod board;
pub mod coordinator;
pub mod scheduler;
pub mod settings;
pub mod stages;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::Config;
use crate::forecast::{ConsumptionForecaster, DaylightFilter, HomeAssistantClient, OpenMeteoClient, SolarForecaster};
use crate::ml::FileModelStore;

pub use board::{ForecastBoard, ForecastSink};
pub use coordinator::{Coordinator, TickReport};
pub use scheduler::{RetrainPolicy, ScheduleEntry, TaskStatus};
pub use settings::{LiveSettings, SettingsSource, TickSettings};
pub use stages::{BatterySimulation, ForecastStage, GridSimulation, StageContext, Trainable};

/// Shared read side, handed to the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<ForecastBoard>,
    pub tz: Tz,
}

impl AppState {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            board: Arc::new(ForecastBoard::new()),
            tz: cfg.location.tz()?,
        })
    }
}

/// Wires the collaborators from configuration into a coordinator that
/// publishes onto `sink`.
pub fn build_coordinator(cfg: &Config, sink: Arc<dyn ForecastSink>) -> Result<Coordinator> {
    let tz = cfg.location.tz()?;
    let telemetry = Arc::new(
        HomeAssistantClient::new(
            cfg.home_assistant.base_url.clone(),
            cfg.home_assistant.token.clone(),
            Duration::from_secs(cfg.home_assistant.timeout_secs),
        )
        .context("building Home Assistant client")?,
    );
    let weather = Arc::new(
        OpenMeteoClient::new(
            cfg.weather.base_url.clone(),
            cfg.location.latitude,
            cfg.location.longitude,
            Duration::from_secs(cfg.weather.timeout_secs),
        )
        .context("building weather client")?,
    );
    let store = Arc::new(
        FileModelStore::new(cfg.storage.model_dir.clone())
            .with_context(|| format!("opening model directory {}", cfg.storage.model_dir.display()))?,
    );
    info!(model_dir = %store.dir().display(), "model store ready");

    let solar = Arc::new(SolarForecaster::new(
        telemetry.clone(),
        weather,
        store.clone(),
        cfg.entities.pv_power.clone(),
        DaylightFilter::new(cfg.location.latitude, cfg.location.longitude, tz),
        tz,
    ));
    let consumption = Arc::new(ConsumptionForecaster::new(
        telemetry.clone(),
        store,
        cfg.entities.consumption.clone(),
        tz,
    ));
    let settings = Arc::new(LiveSettings::new(telemetry, &cfg.location, tz, cfg.battery.clone()));

    let schedule = &cfg.schedule;
    let stages: [Arc<dyn ForecastStage>; 4] = [
        solar.clone(),
        consumption.clone(),
        Arc::new(BatterySimulation),
        Arc::new(GridSimulation),
    ];
    let coordinator = stages.into_iter().fold(
        Coordinator::new(tz, settings, sink)
            .with_policy(schedule.retrain_policy())
            .with_window(schedule.days_back, schedule.days_forward)
            .with_trainable(solar)
            .with_trainable(consumption),
        |c, stage| {
            let interval = schedule.update_interval(stage.kind());
            c.with_stage(stage, interval)
        },
    );
    Ok(coordinator)
}

/// Drives the coordinator from a single task so ticks never overlap.
pub fn spawn_controller_tasks(mut coordinator: Coordinator, cfg: &Config) -> JoinHandle<()> {
    let period = Duration::from_secs(cfg.schedule.tick_seconds.max(1));
    let retry = Duration::from_secs(cfg.schedule.bootstrap_retry_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match coordinator.tick(Utc::now()).await {
                Ok(report) => info!(
                    trained = ?report.trained,
                    training_failed = ?report.training_failed,
                    updated = ?report.updated,
                    failed = ?report.failed,
                    skipped = report.skipped.len(),
                    "forecast tick"
                ),
                Err(e) if e.is_not_ready() => {
                    warn!(error = %e, retry_in_secs = retry.as_secs(), "forecasts not ready, retrying later");
                    tokio::time::sleep(retry).await;
                    interval.reset();
                }
                Err(e) => warn!(error = %e, "forecast tick failed"),
            }
        }
    })
}
