use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Start of the local hour containing `t`, as a UTC instant.
pub fn floor_to_hour<T: TimeZone>(t: &DateTime<T>, tz: Tz) -> DateTime<Utc> {
    let local = t.with_timezone(&tz);
    local
        .with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| floor_utc(t.with_timezone(&Utc), 3600))
}

/// Start of the 15-minute slot containing `t`, as a UTC instant.
pub fn floor_to_quarter<T: TimeZone>(t: &DateTime<T>) -> DateTime<Utc> {
    floor_utc(t.with_timezone(&Utc), 900)
}

fn floor_utc(t: DateTime<Utc>, step_secs: i64) -> DateTime<Utc> {
    let ts = t.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(step_secs), 0).unwrap_or(t)
}

/// The first full hour at or after `now`.
pub fn next_full_hour(now: DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let floored = floor_to_hour(&now, tz).with_timezone(&tz);
    if floored == now {
        now
    } else {
        floored + Duration::hours(1)
    }
}

/// Resolves a local wall-clock time, taking the earlier instant on DST folds and
/// skipping forward over DST gaps.
pub fn local_datetime(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    local_datetime(tz, date, NaiveTime::MIN)
}

/// Window a prediction run covers: from local midnight of today (plus one
/// second) minus `days_back`, through `days_forward` days later (minus one second).
pub fn prediction_window(now: DateTime<Tz>, days_back: u32, days_forward: u32) -> (DateTime<Tz>, DateTime<Tz>) {
    let from = local_midnight(now.timezone(), now.date_naive()) + Duration::seconds(1)
        - Duration::days(days_back as i64);
    let to = from + Duration::days(days_forward as i64) - Duration::seconds(1);
    (from, to)
}
