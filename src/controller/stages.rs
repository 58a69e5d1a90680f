//! The four prediction pipelines and the two trainable producers, behind the
//! seams the coordinator drives.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::settings::TickSettings;
use crate::domain::{ForecastKind, ForecastSeries};
use crate::error::{ForecastError, ForecastResult};
use crate::forecast::{simulate_battery, simulate_grid, ConsumptionForecaster, SolarForecaster};

/// Everything a pipeline run may read. Built fresh for every stage.
pub struct StageContext<'a> {
    pub now: DateTime<Tz>,
    pub window: (DateTime<Tz>, DateTime<Tz>),
    pub days_forward: u32,
    settings: &'a Result<TickSettings, String>,
    published: &'a BTreeMap<ForecastKind, Arc<ForecastSeries>>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        now: DateTime<Tz>,
        window: (DateTime<Tz>, DateTime<Tz>),
        days_forward: u32,
        settings: &'a Result<TickSettings, String>,
        published: &'a BTreeMap<ForecastKind, Arc<ForecastSeries>>,
    ) -> Self {
        Self {
            now,
            window,
            days_forward,
            settings,
            published,
        }
    }

    /// Settings resolved at the start of this tick.
    pub fn settings(&self) -> ForecastResult<&TickSettings> {
        self.settings
            .as_ref()
            .map_err(|e| ForecastError::UpstreamUnavailable(format!("settings: {e}")))
    }

    /// Most recently published series of an upstream kind, whichever tick
    /// produced it.
    pub fn upstream(&self, kind: ForecastKind) -> ForecastResult<Arc<ForecastSeries>> {
        self.published
            .get(&kind)
            .cloned()
            .ok_or_else(|| ForecastError::UpstreamUnavailable(format!("no {kind} forecast published yet")))
    }
}

#[async_trait]
pub trait ForecastStage: Send + Sync {
    fn kind(&self) -> ForecastKind;

    async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries>;
}

/// A producer whose model is refitted from history.
#[async_trait]
pub trait Trainable: Send + Sync {
    fn name(&self) -> &'static str;

    fn last_trained(&self) -> Option<DateTime<Utc>>;

    /// Returns the number of models fitted.
    async fn train(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<usize>;
}

#[async_trait]
impl ForecastStage for SolarForecaster {
    fn kind(&self) -> ForecastKind {
        ForecastKind::Solar
    }

    async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries> {
        self.predict(ctx.window.0, ctx.window.1).await
    }
}

#[async_trait]
impl Trainable for SolarForecaster {
    fn name(&self) -> &'static str {
        "solar"
    }

    fn last_trained(&self) -> Option<DateTime<Utc>> {
        SolarForecaster::last_trained(self)
    }

    async fn train(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<usize> {
        SolarForecaster::train(self, start, end).await.map(|_| 1)
    }
}

#[async_trait]
impl ForecastStage for ConsumptionForecaster {
    fn kind(&self) -> ForecastKind {
        ForecastKind::Consumption
    }

    async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries> {
        // the window ends on the first second of the day after the last one
        let last_day = (ctx.window.1 - Duration::seconds(1)).date_naive();
        self.predict(ctx.window.0.date_naive(), last_day).await
    }
}

#[async_trait]
impl Trainable for ConsumptionForecaster {
    fn name(&self) -> &'static str {
        "consumption"
    }

    fn last_trained(&self) -> Option<DateTime<Utc>> {
        ConsumptionForecaster::last_trained(self)
    }

    async fn train(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<usize> {
        ConsumptionForecaster::train(self, start, end).await.map(|models| models.len())
    }
}

/// Battery capacity from the published solar and consumption forecasts.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatterySimulation;

#[async_trait]
impl ForecastStage for BatterySimulation {
    fn kind(&self) -> ForecastKind {
        ForecastKind::Battery
    }

    async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries> {
        let tick = ctx.settings()?;
        let solar = ctx.upstream(ForecastKind::Solar)?;
        let consumption = ctx.upstream(ForecastKind::Consumption)?;
        simulate_battery(
            &solar,
            &consumption,
            &tick.settings,
            tick.battery_capacity_pct,
            ctx.now,
            ctx.days_forward,
        )
    }
}

/// Grid exchange from the published solar, consumption and battery forecasts.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridSimulation;

#[async_trait]
impl ForecastStage for GridSimulation {
    fn kind(&self) -> ForecastKind {
        ForecastKind::Grid
    }

    async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries> {
        let tick = ctx.settings()?;
        let solar = ctx.upstream(ForecastKind::Solar)?;
        let consumption = ctx.upstream(ForecastKind::Consumption)?;
        let battery = ctx.upstream(ForecastKind::Battery)?;
        simulate_grid(&solar, &consumption, &battery, &tick.settings, ctx.now, ctx.days_forward)
    }
}
