//! Daylight filter based on civil twilight.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Sun altitude at civil dawn and dusk, degrees.
const CIVIL_TWILIGHT_ALTITUDE: f64 = -6.0;
const OBLIQUITY: f64 = 23.4397;
const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Twilight window for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Twilight {
    Between { dawn: DateTime<Utc>, dusk: DateTime<Utc> },
    /// Sun stays above civil twilight all day
    AlwaysLight,
    /// Sun never reaches civil twilight
    AlwaysDark,
}

#[derive(Debug, Clone, Copy)]
pub struct DaylightFilter {
    latitude: f64,
    longitude: f64,
    tz: Tz,
    margin: Duration,
}

impl DaylightFilter {
    pub fn new(latitude: f64, longitude: f64, tz: Tz) -> Self {
        Self {
            latitude,
            longitude,
            tz,
            margin: Duration::hours(1),
        }
    }

    /// Civil dawn and dusk on `date`, via the standard sunrise equation.
    pub fn twilight(&self, date: NaiveDate) -> Twilight {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(date);
        let n = (date - epoch).num_days() as f64;
        let j_star = n - self.longitude / 360.0;

        let m = (357.5291 + 0.985_600_28 * j_star).rem_euclid(360.0);
        let m_rad = m.to_radians();
        let c = 1.9148 * m_rad.sin() + 0.0200 * (2.0 * m_rad).sin() + 0.0003 * (3.0 * m_rad).sin();
        let lambda = (m + c + 180.0 + 102.9372).rem_euclid(360.0).to_radians();
        let transit = J2000 + j_star + 0.0053 * m_rad.sin() - 0.0069 * (2.0 * lambda).sin();

        let sin_decl = lambda.sin() * OBLIQUITY.to_radians().sin();
        let cos_decl = sin_decl.asin().cos();
        let phi = self.latitude.to_radians();
        let cos_hour_angle =
            (CIVIL_TWILIGHT_ALTITUDE.to_radians().sin() - phi.sin() * sin_decl) / (phi.cos() * cos_decl);

        if cos_hour_angle < -1.0 {
            return Twilight::AlwaysLight;
        }
        if cos_hour_angle > 1.0 {
            return Twilight::AlwaysDark;
        }
        let half_day = cos_hour_angle.acos().to_degrees() / 360.0;
        match (julian_to_utc(transit - half_day), julian_to_utc(transit + half_day)) {
            (Some(dawn), Some(dusk)) => Twilight::Between { dawn, dusk },
            _ => Twilight::AlwaysDark,
        }
    }

    /// True within `[dawn - 1h, dusk + 1h]` of `t`'s local calendar day.
    pub fn is_daytime<T: TimeZone>(&self, t: &DateTime<T>) -> bool {
        let local = t.with_timezone(&self.tz);
        match self.twilight(local.date_naive()) {
            Twilight::AlwaysLight => true,
            Twilight::AlwaysDark => false,
            Twilight::Between { dawn, dusk } => {
                let t = t.with_timezone(&Utc);
                dawn - self.margin <= t && t <= dusk + self.margin
            }
        }
    }
}

fn julian_to_utc(jd: f64) -> Option<DateTime<Utc>> {
    let millis = ((jd - UNIX_EPOCH_JD) * 86_400_000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
}
