use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

use crate::config::{BatteryConfig, LocationConfig, SettingValue};
use crate::error::{ForecastError, ForecastResult};
use crate::forecast::{parse_state, ForecastSettings, TelemetrySource};

/// Settings for one tick, plus the measured battery capacity the battery
/// simulation starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSettings {
    pub settings: ForecastSettings,
    pub battery_capacity_pct: f64,
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn resolve(&self) -> ForecastResult<TickSettings>;
}

#[async_trait]
impl SettingsSource for TickSettings {
    async fn resolve(&self) -> ForecastResult<TickSettings> {
        Ok(*self)
    }
}

/// Resolves configured battery values, reading entity-backed ones from the
/// telemetry source.
pub struct LiveSettings {
    telemetry: Arc<dyn TelemetrySource>,
    latitude: f64,
    longitude: f64,
    tz: Tz,
    battery: BatteryConfig,
}

impl LiveSettings {
    pub fn new(telemetry: Arc<dyn TelemetrySource>, location: &LocationConfig, tz: Tz, battery: BatteryConfig) -> Self {
        Self {
            telemetry,
            latitude: location.latitude,
            longitude: location.longitude,
            tz,
            battery,
        }
    }

    async fn value(&self, name: &str, setting: &SettingValue) -> ForecastResult<f64> {
        match setting {
            SettingValue::Fixed(v) => Ok(*v),
            SettingValue::Entity { entity } => {
                let raw = self
                    .telemetry
                    .current_state(entity)
                    .await?
                    .ok_or_else(|| ForecastError::UpstreamUnavailable(format!("{name}: {entity} has no state")))?;
                let value = parse_state(&raw).ok_or_else(|| {
                    ForecastError::UpstreamUnavailable(format!("{name}: {entity} reported '{raw}'"))
                })?;
                debug!(setting = name, entity = %entity, value, "setting read from entity");
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl SettingsSource for LiveSettings {
    async fn resolve(&self) -> ForecastResult<TickSettings> {
        let b = &self.battery;
        Ok(TickSettings {
            settings: ForecastSettings {
                latitude: self.latitude,
                longitude: self.longitude,
                timezone: self.tz,
                min_soc_pct: self.value("min_soc_pct", &b.min_soc_pct).await?,
                max_soc_pct: self.value("max_soc_pct", &b.max_soc_pct).await?,
                max_battery_charge_power_w: self.value("max_charge_power_w", &b.max_charge_power_w).await?,
                max_battery_energy_wh: self.value("max_energy_wh", &b.max_energy_wh).await?,
            },
            battery_capacity_pct: self.value("capacity", &b.capacity).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::test_support::FakeTelemetry;
    use chrono_tz::Europe::Prague;

    fn location() -> LocationConfig {
        LocationConfig {
            latitude: 50.08,
            longitude: 14.42,
            timezone: "Europe/Prague".into(),
        }
    }

    fn battery() -> BatteryConfig {
        BatteryConfig {
            capacity: SettingValue::Entity {
                entity: "sensor.battery_level".into(),
            },
            max_energy_wh: SettingValue::Fixed(10_000.0),
            min_soc_pct: SettingValue::Fixed(10.0),
            max_soc_pct: SettingValue::Entity {
                entity: "number.max_soc".into(),
            },
            max_charge_power_w: SettingValue::Fixed(5_000.0),
        }
    }

    #[tokio::test]
    async fn test_entity_values_read_live() {
        let telemetry = FakeTelemetry {
            states: [
                ("sensor.battery_level".to_string(), "63.5".to_string()),
                ("number.max_soc".to_string(), "95".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let live = LiveSettings::new(Arc::new(telemetry), &location(), Prague, battery());
        let tick = live.resolve().await.unwrap();
        assert_eq!(tick.battery_capacity_pct, 63.5);
        assert_eq!(tick.settings.max_soc_pct, 95.0);
        assert_eq!(tick.settings.min_soc_pct, 10.0);
        assert_eq!(tick.settings.timezone, Prague);
    }

    #[tokio::test]
    async fn test_unavailable_entity_fails_resolution() {
        let telemetry = FakeTelemetry {
            states: [
                ("sensor.battery_level".to_string(), "unavailable".to_string()),
                ("number.max_soc".to_string(), "95".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let live = LiveSettings::new(Arc::new(telemetry), &location(), Prague, battery());
        let err = live.resolve().await.unwrap_err();
        assert!(matches!(err, ForecastError::UpstreamUnavailable(ref m) if m.contains("sensor.battery_level")));
    }
}
