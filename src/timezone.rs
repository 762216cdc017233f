use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, LocalResult, NaiveDateTime, NaiveTime, Offset,
    TimeDelta, TimeZone, Utc, Weekday,
};

use crate::error::EntryError;

/// Every displayed or manually entered time is GMT+8.
pub const DISPLAY_OFFSET_SECS: i32 = 8 * 3_600;
pub const DISPLAY_OFFSET_LABEL: &str = "GMT+8";

pub fn display_offset() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl FromStr for Meridiem {
    type Err = EntryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_uppercase().as_str() {
            "AM" => Ok(Self::Am),
            "PM" => Ok(Self::Pm),
            _ => Err(EntryError::Malformed(input.to_string())),
        }
    }
}

pub fn twelve_hour_to_time(
    hour: u32,
    minute: u32,
    meridiem: Meridiem,
) -> Result<NaiveTime, EntryError> {
    if !(1..=12).contains(&hour) {
        return Err(EntryError::HourOutOfRange(hour));
    }
    if minute > 59 {
        return Err(EntryError::MinuteOutOfRange(minute));
    }
    let hour24 = match (meridiem, hour) {
        (Meridiem::Am, 12) => 0,
        (Meridiem::Pm, h) if h < 12 => h + 12,
        (_, h) => h,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
        .ok_or_else(|| EntryError::Malformed(format!("{hour}:{minute:02}")))
}

/// Parses `H:MM AM`, `H:MM PM` or the unspaced `H:MMPM`.
pub fn parse_twelve_hour(input: &str) -> Result<NaiveTime, EntryError> {
    let trimmed = input.trim();
    let malformed = || EntryError::Malformed(trimmed.to_string());
    if trimmed.len() < 3 || !trimmed.is_char_boundary(trimmed.len() - 2) {
        return Err(malformed());
    }
    let (clock, suffix) = trimmed.split_at(trimmed.len() - 2);
    let meridiem = suffix.parse::<Meridiem>().map_err(|_| malformed())?;
    let (hour, minute) = clock.trim().split_once(':').ok_or_else(malformed)?;
    let hour = hour.trim().parse::<u32>().map_err(|_| malformed())?;
    let minute = minute.trim().parse::<u32>().map_err(|_| malformed())?;
    twelve_hour_to_time(hour, minute, meridiem)
}

pub fn parse_weekday(input: &str) -> Result<Weekday, EntryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EntryError::MissingWeekday);
    }
    Weekday::from_str(trimmed).map_err(|_| EntryError::UnknownWeekday(trimmed.to_string()))
}

/// Resolves a manually entered "defeated at" wall time to the latest
/// occurrence that is not after `now`.
pub fn most_recent_occurrence(
    time: NaiveTime,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, EntryError> {
    let offset = display_offset();
    most_recent_occurrence_in_tz(time, &now.with_timezone(&offset), &offset)
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| EntryError::Unresolvable(time.format("%H:%M").to_string()))
}

/// Resolves a "respawns on <weekday> at <time>" entry to its next occurrence
/// at or after `now`. Today at an earlier time rolls over to next week.
pub fn next_weekday_occurrence(
    weekday: Weekday,
    time: NaiveTime,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, EntryError> {
    let offset = display_offset();
    next_weekday_occurrence_in_tz(weekday, time, &now.with_timezone(&offset), &offset)
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| EntryError::Unresolvable(format!("{weekday} {}", time.format("%H:%M"))))
}

/// Instants too close to the end of the calendar to shift into GMT+8 are
/// shown in UTC.
pub fn format_respawn_display(instant: DateTime<Utc>) -> String {
    let shifted = TimeDelta::try_seconds(i64::from(DISPLAY_OFFSET_SECS))
        .and_then(|offset| instant.naive_utc().checked_add_signed(offset));
    match shifted {
        Some(local) => format!("{} ({DISPLAY_OFFSET_LABEL})", local.format("%a %-I:%M %p")),
        None => format!("{} (UTC)", instant.format("%a %-I:%M %p")),
    }
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}

pub(crate) fn most_recent_occurrence_in_tz<Tz>(
    time: NaiveTime,
    now: &DateTime<Tz>,
    timezone: &Tz,
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
{
    for day_offset in 0_u64..3 {
        let date = now.date_naive().checked_sub_days(Days::new(day_offset))?;
        let Some(candidate) = resolve_local_datetime(timezone, date.and_time(time)) else {
            continue;
        };
        if candidate <= *now {
            return Some(candidate);
        }
    }
    None
}

pub(crate) fn next_weekday_occurrence_in_tz<Tz>(
    weekday: Weekday,
    time: NaiveTime,
    now: &DateTime<Tz>,
    timezone: &Tz,
) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
{
    for day_offset in 0_u64..14 {
        let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
        if date.weekday() != weekday {
            continue;
        }
        let Some(candidate) = resolve_local_datetime(timezone, date.and_time(time)) else {
            continue;
        };
        if candidate >= *now {
            return Some(candidate);
        }
    }
    None
}
