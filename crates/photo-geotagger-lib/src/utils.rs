//! Utility functions for capture-time parsing and timezone conversions

use crate::{GeotagError, Result};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Format of the capture time reported by the photo host
pub const TAKEN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Earth's mean radius in meters
const EARTH_RADIUS_M: f64 = 6371000.0;

/// Parse a host capture-time string (`YYYY-MM-DD HH:MM:SS`)
pub fn parse_taken_date(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TAKEN_DATE_FORMAT).map_err(|source| {
        GeotagError::TakenDateParse {
            value: value.to_string(),
            source,
        }
    })
}

/// Express a UTC instant as wall-clock time in `timezone`
#[inline]
pub fn utc_to_local(instant: DateTime<Utc>, timezone: Tz) -> NaiveDateTime {
    instant.with_timezone(&timezone).naive_local()
}

/// Interpret a wall-clock time in `timezone` and convert it to UTC
///
/// Ambiguous times (clocks turned back) resolve to the later instant, i.e. the
/// standard-time reading. Times that fall into a gap (clocks turned forward) are
/// read with the offset in force right before the gap.
pub fn local_to_utc(local: NaiveDateTime, timezone: Tz) -> Result<DateTime<Utc>> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, latest) => Ok(latest.with_timezone(&Utc)),
        LocalResult::None => {
            let before_gap = local - TimeDelta::hours(1);
            timezone
                .from_local_datetime(&before_gap)
                .latest()
                .map(|dt| (dt + TimeDelta::hours(1)).with_timezone(&Utc))
                .ok_or(GeotagError::NonexistentLocalTime { local, timezone })
        }
    }
}

/// Parse an IANA timezone name such as `Europe/Madrid`
pub fn parse_timezone(name: &str) -> std::result::Result<Tz, String> {
    name.parse::<Tz>().map_err(|e| e.to_string())
}

/// Calculate the Haversine distance between two (lat, lon) pairs in meters
#[inline]
pub fn haversine_distance((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
