pub mod battery;
pub mod consumption;
pub mod daylight;
pub mod features;
pub mod grid;
pub mod history;
pub mod solar;
pub mod weather;

use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{ForecastError, ForecastResult};

pub use battery::simulate_battery;
pub use consumption::ConsumptionForecaster;
pub use daylight::{DaylightFilter, Twilight};
pub use grid::simulate_grid;
pub use history::{numeric_samples, parse_state, HomeAssistantClient, RawSample, TelemetrySource};
pub use solar::SolarForecaster;
pub use weather::{OpenMeteoClient, WeatherRecord, WeatherSource, WEATHER_FEATURES};

/// Scalar settings the simulators run with, resolved fresh on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastSettings {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    pub min_soc_pct: f64,
    pub max_soc_pct: f64,
    pub max_battery_charge_power_w: f64,
    pub max_battery_energy_wh: f64,
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(tz.name())
}

impl ForecastSettings {
    /// Rejects battery settings the simulators cannot run with.
    pub fn validate_battery(&self) -> ForecastResult<()> {
        if !(self.max_battery_energy_wh > 0.0) {
            return Err(ForecastError::InvalidArgument(format!(
                "max battery energy must be positive, got {} Wh",
                self.max_battery_energy_wh
            )));
        }
        if !(0.0..=100.0).contains(&self.min_soc_pct)
            || !(0.0..=100.0).contains(&self.max_soc_pct)
            || self.min_soc_pct > self.max_soc_pct
        {
            return Err(ForecastError::InvalidArgument(format!(
                "state of charge bounds must satisfy 0 <= min ({}) <= max ({}) <= 100",
                self.min_soc_pct, self.max_soc_pct
            )));
        }
        if self.max_battery_charge_power_w < 0.0 {
            return Err(ForecastError::InvalidArgument(format!(
                "max charge power must not be negative, got {} W",
                self.max_battery_charge_power_w
            )));
        }
        Ok(())
    }

    pub fn min_soc_energy_wh(&self) -> f64 {
        self.max_battery_energy_wh * self.min_soc_pct / 100.0
    }

    pub fn max_soc_energy_wh(&self) -> f64 {
        self.max_battery_energy_wh * self.max_soc_pct / 100.0
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::settings;
    use super::*;

    #[test]
    fn test_soc_energy_bounds() {
        let s = settings();
        assert_eq!(s.min_soc_energy_wh(), 1_000.0);
        assert_eq!(s.max_soc_energy_wh(), 9_000.0);
        assert!(s.validate_battery().is_ok());
    }

    #[test]
    fn test_inverted_soc_bounds_rejected() {
        let s = ForecastSettings {
            min_soc_pct: 95.0,
            ..settings()
        };
        assert!(matches!(s.validate_battery(), Err(ForecastError::InvalidArgument(_))));
        let s = ForecastSettings {
            max_battery_energy_wh: 0.0,
            ..settings()
        };
        assert!(s.validate_battery().is_err());
    }
}
