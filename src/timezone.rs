//! Timezone lookup for coordinates
//!
//! Cache expiry follows the local day of the watering site, so coordinates
//! are mapped to an IANA zone and boundaries are computed in that zone.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tzf_rs::DefaultFinder;

use crate::data::GeoCoordinates;

fn finder() -> &'static DefaultFinder {
    static FINDER: OnceLock<DefaultFinder> = OnceLock::new();
    FINDER.get_or_init(DefaultFinder::new)
}

/// Returns the IANA timezone containing the coordinates
///
/// Points the finder cannot place (open ocean, bad data) fall back to UTC.
pub fn timezone_for(coordinates: GeoCoordinates) -> Tz {
    let name = finder().get_tz_name(coordinates.longitude(), coordinates.latitude());
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(%coordinates, name, "no timezone for coordinates, using UTC");
            Tz::UTC
        }
    }
}

/// Resolves a local wall-clock time, stepping over DST gaps
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Some zones skip midnight on DST days; the first valid instant is an hour later
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&shifted))
        }
    }
}

/// The local midnight that started the day containing `now`
pub fn start_of_local_day(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    resolve_local(tz, now.with_timezone(&tz).date_naive(), NaiveTime::MIN)
}

/// The first local midnight strictly after `now`, in the given zone
pub fn next_local_midnight(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let tomorrow = local.date_naive() + Duration::days(1);
    resolve_local(tz, tomorrow, NaiveTime::MIN)
}

/// The next local boundary of a six-hour block (00:00, 06:00, 12:00, 18:00)
pub fn next_six_hour_boundary(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let next_block = (local.hour() / 6 + 1) * 6;
    if next_block >= 24 {
        return next_local_midnight(tz, now);
    }
    let time = NaiveTime::from_hms_opt(next_block, 0, 0).unwrap_or(NaiveTime::MIN);
    resolve_local(tz, local.date_naive(), time)
}

/// Seconds from `now` until the next local midnight at the coordinates
pub fn seconds_until_local_midnight(coordinates: GeoCoordinates, now: DateTime<Utc>) -> i64 {
    let midnight = next_local_midnight(timezone_for(coordinates), now);
    (midnight - now).num_seconds()
}
