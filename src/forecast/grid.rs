//! Hourly grid exchange under a threshold policy.
//!
//! Values are signed watt-hours per hour: export positive, import negative.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use super::ForecastSettings;
use crate::domain::time::next_full_hour;
use crate::domain::{
    Bands, ChannelNames, ForecastPoint, ForecastSeries, GRID_BATTERY_PAIRING, GRID_CONSUMPTION_PAIRING,
};
use crate::error::ForecastResult;

/// Exchange for one hour and scenario. `battery_pct` is the paired battery
/// capacity reading.
pub fn exchange(solar: f64, consumption: f64, battery_pct: f64, min_soc_pct: f64, max_soc_pct: f64) -> f64 {
    if solar > consumption && battery_pct >= max_soc_pct {
        solar - consumption
    } else if consumption > solar && battery_pct <= min_soc_pct {
        -(consumption - solar)
    } else {
        0.0
    }
}

/// Grid forecast for `days * 24` hours from the next full hour. Hours without
/// a consumption or battery value exchange nothing; hours without solar
/// production count as zero generation.
pub fn simulate_grid(
    solar: &ForecastSeries,
    consumption: &ForecastSeries,
    battery: &ForecastSeries,
    settings: &ForecastSettings,
    now: DateTime<Tz>,
    days: u32,
) -> ForecastResult<ForecastSeries> {
    let tz = settings.timezone;
    let solar_hourly = solar.hourly_average(tz);
    let consumption_hourly = consumption.hourly_average(tz);
    // the head point at `now` may share an hour with the first step; the step wins
    let battery_hourly = battery.hourly_last(tz);

    let start = next_full_hour(now.with_timezone(&tz));
    let steps = days as i64 * 24;
    let mut gaps = 0usize;
    let points: Vec<ForecastPoint> = (0..steps)
        .map(|step| {
            let hour = start + Duration::hours(step);
            let key = hour.with_timezone(&Utc);
            let solar_w = solar_hourly.get(&key).map_or(0.0, |b| b.med);
            let bands = match (consumption_hourly.get(&key), battery_hourly.get(&key)) {
                (Some(cons), Some(batt)) => Bands::from_fn(|s| {
                    exchange(
                        solar_w,
                        cons.paired(&GRID_CONSUMPTION_PAIRING, s),
                        batt.paired(&GRID_BATTERY_PAIRING, s),
                        settings.min_soc_pct,
                        settings.max_soc_pct,
                    )
                }),
                _ => {
                    gaps += 1;
                    Bands::uniform(0.0)
                }
            };
            ForecastPoint::banded(hour.fixed_offset(), bands)
        })
        .collect();

    debug!(
        steps,
        gaps,
        consumption_pairing = GRID_CONSUMPTION_PAIRING.name(),
        battery_pairing = GRID_BATTERY_PAIRING.name(),
        "grid simulation finished"
    );
    Ok(ForecastSeries::new(points, ChannelNames::BANDED, Utc::now()))
}
