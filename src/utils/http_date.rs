//! Hand-rolled IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`) formatting and
//! parsing for `Last-Modified`/`If-Modified-Since`. No `chrono`/`httpdate` --
//! nothing else in this stack needs calendar math, so a small civil-calendar
//! conversion (Howard Hinnant's `days_from_civil`/`civil_from_days`) is
//! enough.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Formats a `SystemTime` as an IMF-fixdate, truncated to whole seconds.
pub fn format_http_date(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let days = secs.div_euclid(86400);
    let rem = secs.rem_euclid(86400);
    let (hh, mm, ss) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (y, m, d) = civil_from_days(days);
    let weekday = WEEKDAYS[((days + 4).rem_euclid(7)) as usize];
    let month = MONTHS[(m - 1) as usize];
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        weekday, d, month, y, hh, mm, ss
    )
}

/// Parses an IMF-fixdate into a `SystemTime`. The weekday name is not
/// validated against the computed date, only used to locate the rest of the
/// string.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let rest = value.trim().split_once(", ")?.1;
    let mut parts = rest.split_whitespace();
    let day: i64 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?;
    let month = (MONTHS.iter().position(|m| *m == month_name)? as i64) + 1;
    let year: i64 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let mut time_parts = time.split(':');
    let hh: i64 = time_parts.next()?.parse().ok()?;
    let mm: i64 = time_parts.next()?.parse().ok()?;
    let ss: i64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    let secs = days * 86400 + hh * 3600 + mm * 60 + ss;
    if secs < 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_secs(secs as u64))
}

/// True if `mtime` is no newer than the client's `If-Modified-Since` value
/// (both truncated to whole seconds, as the wire format demands).
pub fn not_modified_since(mtime: SystemTime, if_modified_since: &str) -> bool {
    let Some(client_time) = parse_http_date(if_modified_since) else {
        return false;
    };
    let mtime_secs = mtime.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let client_secs = client_time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    mtime_secs <= client_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_http_date_known_value() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777); // 1994-11-06 08:49:37 GMT
        assert_eq!(format_http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_parse_http_date_round_trip() {
        let original = "Sun, 06 Nov 1994 08:49:37 GMT";
        let parsed = parse_http_date(original).unwrap();
        assert_eq!(format_http_date(parsed), original);
    }

    #[test]
    fn test_parse_http_date_rejects_garbage() {
        assert!(parse_http_date("not a date").is_none());
    }

    #[test]
    fn test_not_modified_since_equal_is_not_modified() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777);
        assert!(not_modified_since(t, "Sun, 06 Nov 1994 08:49:37 GMT"));
    }

    #[test]
    fn test_not_modified_since_newer_file_is_modified() {
        let t = UNIX_EPOCH + Duration::from_secs(784111778);
        assert!(!not_modified_since(t, "Sun, 06 Nov 1994 08:49:37 GMT"));
    }
}
