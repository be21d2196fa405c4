//! Parsing of the free-text "last seen" field in player exports.
//!
//! The export writes one of three shapes:
//! - absolute: `"Jan 05 2025 14:30"` (`%b %d %Y %H:%M`)
//! - relative day: `"Today 14:30"` / `"Yesterday 14:30"`
//! - relative weekday: `"Monday 14:30"`
//!
//! Relative shapes are resolved against the snapshot's recording instant.
//! `"Today"` means the day before recording and `"Yesterday"` two days
//! before; weekday names resolve to the most recent occurrence strictly
//! before the recording day, then one further day back. Both offsets are
//! conventions of the exporting plugin, carried as-is.
//!
//! All instants are interpreted as UTC.

use chrono::{DateTime, Datelike, Days, NaiveDateTime, Utc, Weekday};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LastSeenError {
    #[error("unrecognized last-seen date format: '{0}'")]
    UnrecognizedDateFormat(String),
    #[error("invalid recording timestamp: {0}")]
    InvalidRecordingTimestamp(i64),
}

/// Converts a raw last-seen value into absolute seconds between the parsed
/// instant and `recording_ts` (a Unix timestamp). Always non-negative; the
/// direction of the difference is not preserved.
pub fn seconds_since_last_seen(raw: &str, recording_ts: i64) -> Result<i64, LastSeenError> {
    let recording = DateTime::<Utc>::from_timestamp(recording_ts, 0)
        .ok_or(LastSeenError::InvalidRecordingTimestamp(recording_ts))?
        .naive_utc();

    let trimmed = raw.trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();

    let parsed = match tokens.as_slice() {
        // "Jan 05 2025 14:30"
        [_, _, _, last] if last.contains(':') => {
            NaiveDateTime::parse_from_str(trimmed, "%b %d %Y %H:%M")
                .map_err(|_| LastSeenError::UnrecognizedDateFormat(raw.to_string()))?
        }
        [day_word, time_of_day] => {
            let (hour, minute) = parse_time_of_day(*time_of_day)
                .ok_or_else(|| LastSeenError::UnrecognizedDateFormat(raw.to_string()))?;
            let days_back = match *day_word {
                "Today" => 1,
                "Yesterday" => 2,
                other => {
                    let target = parse_weekday(other)
                        .ok_or_else(|| LastSeenError::UnrecognizedDateFormat(raw.to_string()))?;
                    let recording_weekday = recording.weekday().num_days_from_monday() as i64;
                    let target_weekday = target.num_days_from_monday() as i64;
                    (recording_weekday - target_weekday).rem_euclid(7) + 1
                }
            };
            let date = recording
                .date()
                .checked_sub_days(Days::new(days_back as u64))
                .ok_or(LastSeenError::InvalidRecordingTimestamp(recording_ts))?;
            date.and_hms_opt(hour, minute, 0)
                .ok_or_else(|| LastSeenError::UnrecognizedDateFormat(raw.to_string()))?
        }
        _ => return Err(LastSeenError::UnrecognizedDateFormat(raw.to_string())),
    };

    Ok((parsed - recording).num_seconds().abs())
}

fn parse_time_of_day(raw: &str) -> Option<(u32, u32)> {
    let (hour, minute) = raw.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    match raw {
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        "Sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
