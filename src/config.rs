use anyhow::{Context, Result};
use chrono::Duration;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

use crate::controller::scheduler::RetrainPolicy;
use crate::domain::ForecastKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub home_assistant: HomeAssistantConfig,
    #[validate(nested)]
    pub location: LocationConfig,
    #[validate(nested)]
    pub weather: WeatherConfig,
    pub entities: EntitiesConfig,
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HomeAssistantConfig {
    #[validate(url)]
    pub base_url: String,
    pub token: String,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationConfig {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// IANA name, e.g. `Europe/Prague`
    pub timezone: String,
}

impl LocationConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {e}", self.timezone))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WeatherConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitiesConfig {
    pub pv_power: String,
    pub consumption: String,
}

/// A setting given either as a fixed number or read from an entity's state
/// on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Fixed(f64),
    Entity { entity: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatteryConfig {
    /// Current capacity (%)
    pub capacity: SettingValue,
    pub max_energy_wh: SettingValue,
    pub min_soc_pct: SettingValue,
    pub max_soc_pct: SettingValue,
    pub max_charge_power_w: SettingValue,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleConfig {
    #[validate(range(min = 1))]
    pub tick_seconds: u64,
    #[validate(range(min = 1))]
    pub retrain_interval_hours: i64,
    #[validate(range(min = 1))]
    pub training_window_days: i64,
    #[validate(range(min = 0))]
    pub training_end_offset_minutes: i64,
    #[validate(range(min = 1))]
    pub solar_update_minutes: i64,
    #[validate(range(min = 1))]
    pub consumption_update_minutes: i64,
    #[validate(range(min = 1))]
    pub battery_update_minutes: i64,
    #[validate(range(min = 1))]
    pub grid_update_minutes: i64,
    #[validate(range(min = 1, max = 16))]
    pub days_forward: u32,
    pub days_back: u32,
    pub bootstrap_retry_seconds: u64,
}

impl ScheduleConfig {
    pub fn retrain_policy(&self) -> RetrainPolicy {
        RetrainPolicy {
            interval: Duration::hours(self.retrain_interval_hours),
            window: Duration::days(self.training_window_days),
            end_offset: Duration::minutes(self.training_end_offset_minutes),
        }
    }

    pub fn update_interval(&self, kind: ForecastKind) -> Duration {
        Duration::minutes(match kind {
            ForecastKind::Solar => self.solar_update_minutes,
            ForecastKind::Consumption => self.consumption_update_minutes,
            ForecastKind::Battery => self.battery_update_minutes,
            ForecastKind::Grid => self.grid_update_minutes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub model_dir: PathBuf,
}

impl Config {
    /// `config/default.toml` (or `$SFML_CONFIG`) overlaid with `SFML__`
    /// environment variables, e.g. `SFML__HOME_ASSISTANT__TOKEN`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("SFML_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SFML__").split("__"));
        Self::from_figment(figment).with_context(|| format!("loading configuration from {path}"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate().context("configuration out of range")?;
        cfg.location.tz()?;
        Ok(cfg)
    }
}
