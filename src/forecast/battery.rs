//! Forward simulation of battery state of charge.
//!
//! Walks hour by hour from the next full hour, applying the hour's solar
//! surplus or deficit to each scenario's stored energy. Scenarios pair with the
//! opposite consumption band (see `BATTERY_CONSUMPTION_PAIRING`).

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use super::ForecastSettings;
use crate::domain::time::next_full_hour;
use crate::domain::{Bands, ChannelNames, ForecastPoint, ForecastSeries, Scenario, BATTERY_CONSUMPTION_PAIRING};
use crate::error::ForecastResult;

/// Stored energy per scenario (Wh), carried across the steps of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationState {
    pub energy: Bands<f64>,
}

#[derive(Debug, Clone, Copy)]
struct BatteryLimits {
    min_energy: f64,
    max_energy: f64,
    capacity: f64,
    max_charge: f64,
}

impl BatteryLimits {
    fn from_settings(settings: &ForecastSettings) -> Self {
        Self {
            min_energy: settings.min_soc_energy_wh(),
            max_energy: settings.max_soc_energy_wh(),
            capacity: settings.max_battery_energy_wh,
            max_charge: settings.max_battery_charge_power_w,
        }
    }

    /// One hour: charging is capped at the charge power while below the upper
    /// bound, the result is clamped to the state of charge window.
    fn step(&self, energy: f64, net: f64) -> f64 {
        let applied = if net > 0.0 && energy < self.max_energy {
            net.min(self.max_charge)
        } else {
            net
        };
        (energy + applied).clamp(self.min_energy, self.max_energy)
    }

    fn percent(&self, energy: f64) -> f64 {
        energy / self.capacity * 100.0
    }
}

impl SimulationState {
    fn advance(&self, limits: &BatteryLimits, solar_w: f64, consumption: &Bands<f64>) -> Self {
        Self {
            energy: Bands::from_fn(|s| {
                let drain = consumption.paired(&BATTERY_CONSUMPTION_PAIRING, s);
                limits.step(self.energy.get(s), solar_w - drain)
            }),
        }
    }
}

/// Capacity forecast (%) for `days * 24` hours after `now`, headed by a point
/// at `now` carrying the measured capacity.
pub fn simulate_battery(
    solar: &ForecastSeries,
    consumption: &ForecastSeries,
    settings: &ForecastSettings,
    current_capacity_pct: f64,
    now: DateTime<Tz>,
    days: u32,
) -> ForecastResult<ForecastSeries> {
    settings.validate_battery()?;
    let tz = settings.timezone;
    let limits = BatteryLimits::from_settings(settings);
    let now = now.with_timezone(&tz);

    let solar_hourly = solar.hourly_average(tz);
    let consumption_hourly = consumption.hourly_average(tz);

    let mut state = SimulationState {
        energy: Bands::uniform(current_capacity_pct / 100.0 * limits.capacity),
    };
    let steps = days as i64 * 24;
    let mut points = Vec::with_capacity(steps as usize + 1);
    points.push(ForecastPoint::banded(now.fixed_offset(), Bands::uniform(current_capacity_pct)));

    let start = next_full_hour(now);
    let mut missing_consumption = 0usize;
    for step in 0..steps {
        let hour = start + Duration::hours(step);
        let key = hour.with_timezone(&Utc);
        let solar_w = solar_hourly.get(&key).map_or(0.0, |b| b.med);
        let drain = consumption_hourly.get(&key).copied().unwrap_or_else(|| {
            missing_consumption += 1;
            Bands::uniform(0.0)
        });

        state = state.advance(&limits, solar_w, &drain);
        points.push(ForecastPoint::banded(
            hour.fixed_offset(),
            Bands::from_fn(|s| limits.percent(state.energy.get(s))),
        ));
    }

    debug!(
        steps,
        missing_consumption,
        pairing = BATTERY_CONSUMPTION_PAIRING.name(),
        final_med_pct = limits.percent(state.energy.get(Scenario::Med)),
        "battery simulation finished"
    );
    Ok(ForecastSeries::new(points, ChannelNames::BANDED, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::test_support::settings;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use chrono_tz::Europe::Prague;

    fn now() -> DateTime<Tz> {
        Prague.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
    }

    fn hourly(start: DateTime<Tz>, hours: i64, bands: Bands<f64>) -> ForecastSeries {
        let points = (0..hours)
            .map(|h| ForecastPoint::banded((start + Duration::hours(h)).fixed_offset(), bands))
            .collect();
        ForecastSeries::new(points, ChannelNames::BANDED, Utc::now())
    }

    fn quarter_hourly(start: DateTime<Tz>, hours: i64, power: f64) -> ForecastSeries {
        let points = (0..hours * 4)
            .map(|q| ForecastPoint::single((start + Duration::minutes(15 * q)).fixed_offset(), power))
            .collect();
        ForecastSeries::new(points, ChannelNames::SOLAR, Utc::now())
    }

    fn empty(channels: ChannelNames) -> ForecastSeries {
        ForecastSeries::new(vec![], channels, Utc::now())
    }

    #[test]
    fn test_idle_battery_keeps_capacity() {
        let out = simulate_battery(
            &empty(ChannelNames::SOLAR),
            &hourly(next_full_hour(now()), 48, Bands::uniform(0.0)),
            &settings(),
            55.0,
            now(),
            2,
        )
        .unwrap();
        assert_eq!(out.len(), 49);
        for p in out.points() {
            assert_relative_eq!(p.value(Scenario::Min), 55.0);
            assert_relative_eq!(p.value(Scenario::Med), 55.0);
            assert_relative_eq!(p.value(Scenario::Max), 55.0);
        }
    }

    #[test]
    fn test_head_point_is_now_and_steps_start_at_next_hour() {
        let out = simulate_battery(
            &empty(ChannelNames::SOLAR),
            &empty(ChannelNames::BANDED),
            &settings(),
            40.0,
            now(),
            1,
        )
        .unwrap();
        assert_eq!(out.points()[0].time, now().fixed_offset());
        assert_eq!(
            out.points()[1].time,
            Prague.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap().fixed_offset()
        );
        assert_eq!(out.len(), 25);
    }

    #[test]
    fn test_charge_is_capped_and_clamped() {
        let start = next_full_hour(now());
        let out = simulate_battery(
            &quarter_hourly(start, 3, 8_000.0),
            &hourly(start, 3, Bands::uniform(0.0)),
            &settings(),
            10.0,
            now(),
            1,
        )
        .unwrap();
        // 1000 Wh + min(8000, 5000) = 6000 Wh, then clamped at 9000 Wh
        assert_relative_eq!(out.points()[1].med, 60.0);
        assert_relative_eq!(out.points()[2].med, 90.0);
        assert_relative_eq!(out.points()[3].med, 90.0);
        // no solar after three hours
        assert_relative_eq!(out.points()[4].med, 90.0);
    }

    #[test]
    fn test_discharge_uses_crossed_consumption() {
        let start = next_full_hour(now());
        let consumption = hourly(
            start,
            1,
            Bands {
                min: 100.0,
                med: 500.0,
                max: 900.0,
            },
        );
        let out = simulate_battery(&empty(ChannelNames::SOLAR), &consumption, &settings(), 50.0, now(), 1).unwrap();
        let first = out.points()[1];
        // battery-min drains with consumption-max
        assert_relative_eq!(first.min.unwrap(), 41.0);
        assert_relative_eq!(first.med, 45.0);
        assert_relative_eq!(first.max.unwrap(), 49.0);
    }

    #[test]
    fn test_discharge_is_clamped_at_min_soc() {
        let start = next_full_hour(now());
        let out = simulate_battery(
            &empty(ChannelNames::SOLAR),
            &hourly(start, 24, Bands::uniform(3_000.0)),
            &settings(),
            30.0,
            now(),
            1,
        )
        .unwrap();
        assert_relative_eq!(out.points()[1].med, 10.0);
        assert_relative_eq!(out.points()[24].med, 10.0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut s = settings();
        s.max_soc_pct = 5.0;
        let err = simulate_battery(
            &empty(ChannelNames::SOLAR),
            &empty(ChannelNames::BANDED),
            &s,
            50.0,
            now(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::ForecastError::InvalidArgument(_)));
    }
}
