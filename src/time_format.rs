//! Conversions between `hh:mm:ss` strings and millisecond counts
//!
//! Used to parse the recorder's max duration and to render progress in caller UIs.

use crate::error::ConfigError;

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Convert a time string (`hh:mm:ss`, `mm:ss` or `ss`) to milliseconds
///
/// Each group has one or two digits. Seconds and minutes must be below 60,
/// hours below 24.
///
/// ```
/// assert_eq!(audrec::time_to_milliseconds("1:35:11").unwrap(), 5_711_000);
/// assert_eq!(audrec::time_to_milliseconds("15:00").unwrap(), 900_000);
/// ```
pub fn time_to_milliseconds(time: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidTime(time.to_string());

    let groups: Vec<&str> = time.trim().split(':').collect();
    if groups.len() > 3 {
        return Err(invalid());
    }

    // Seconds first, then minutes, then hours
    let units = [(MS_PER_SECOND, 60), (MS_PER_MINUTE, 60), (MS_PER_HOUR, 24)];

    let mut total = 0;
    for (group, (unit_ms, limit)) in groups.iter().rev().zip(units) {
        if group.is_empty() || group.len() > 2 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u64 = group.parse().map_err(|_| invalid())?;
        if value >= limit {
            return Err(invalid());
        }
        total += value * unit_ms;
    }

    Ok(total)
}

/// Render milliseconds as `hh:mm:ss`, or `mm:ss` when `minutes_only` is set
///
/// Sub-second remainders are truncated. Hours wrap at 24 and are dropped
/// entirely in `minutes_only` mode, so minutes never exceed 59.
///
/// ```
/// assert_eq!(audrec::milliseconds_to_time(5682, false), "00:00:05");
/// assert_eq!(audrec::milliseconds_to_time(65_000, true), "01:05");
/// ```
pub fn milliseconds_to_time(milliseconds: u64, minutes_only: bool) -> String {
    let total_secs = milliseconds / MS_PER_SECOND;
    let hours = (total_secs / 3600) % 24;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    if minutes_only {
        format!("{:02}:{:02}", minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}
