//! Zone-aware time helpers. Everything that turns a local wall-clock time into
//! an instant (or back) goes through here.

use chrono::{
    offset::LocalResult, DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;

/// Upper bound on how far a spring-forward gap may push a local time.
const MAX_GAP_MINUTES: i64 = 180;

/// ISO weekday (Monday = 1 .. Sunday = 7) of `instant` as observed in `tz`.
pub fn zoned_day_of_week(instant: DateTime<Utc>, tz: Tz) -> u32 {
    day_of_week(local_date(instant, tz))
}

pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// Calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Instant of the local wall-clock time `date hour:minute` in `tz`.
///
/// Ambiguous local times (clocks going back) resolve to the earlier instant.
/// Local times inside a spring-forward gap move forward to the first minute
/// that exists. Returns `None` only for an out-of-range hour or minute.
pub fn zoned_instant(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let naive = date.and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => (1..=MAX_GAP_MINUTES).find_map(|shift| {
            tz.from_local_datetime(&(naive + Duration::minutes(shift)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }),
    }
}

/// Instant of `time` on `date` in `tz`.
pub fn zoned_instant_at(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    zoned_instant(tz, date, time.hour(), time.minute())
}

/// Parses `"HH:mm"` without failing: any unparsable or out-of-range component
/// becomes zero.
pub fn parse_hm(value: &str) -> NaiveTime {
    let mut parts = value.trim().splitn(2, ':');
    let hour = parts
        .next()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|hour| *hour < 24)
        .unwrap_or(0);
    let minute = parts
        .next()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|minute| *minute < 60)
        .unwrap_or(0);

    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Parses `"HH:mm"`, rejecting anything malformed.
pub fn parse_hm_strict(value: &str) -> Option<NaiveTime> {
    let (hour, minute) = value.trim().split_once(':')?;
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Half-open interval intersection.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn add_minutes(instant: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    instant.checked_add_signed(Duration::minutes(minutes))
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
