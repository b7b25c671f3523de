//! Wall-clock display formatting.
//!
//! Two layouts:
//!
//! - standard: `Wednesday, 03 Mar 21 06:30:00 AM`
//! - military: `03 0630U MAR 21`
//!
//! The military zone letter covers whole-hour UTC offsets only (Zulu at UTC,
//! Alfa through Mike east with J unused, November through Yankee west). An
//! offset with no letter is an error, not a blank.

use chrono::{DateTime, Datelike, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::FormatError;

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Military letter for a whole-hour UTC offset (hours east, -12..=12).
fn military_letter(offset_hours: i32) -> Option<char> {
    match offset_hours {
        0 => Some('Z'),
        1..=9 => Some((b'A' + (offset_hours - 1) as u8) as char),
        10 => Some('K'),
        11 => Some('L'),
        12 => Some('M'),
        -9..=-1 => Some((b'N' + (-offset_hours - 1) as u8) as char),
        -10 => Some('W'),
        -11 => Some('X'),
        -12 => Some('Y'),
        _ => None,
    }
}

/// Format `now` for display, converted into `timezone` when one is set.
pub fn format_clock(
    now: DateTime<Utc>,
    timezone: Option<&str>,
    military: bool,
) -> Result<String, FormatError> {
    match timezone {
        Some(name) => {
            let tz: Tz = name
                .parse()
                .map_err(|_| FormatError::UnknownTimezone(name.to_string()))?;
            render(now.with_timezone(&tz), military)
        }
        None => render(now, military),
    }
}

fn render<Z: TimeZone>(local: DateTime<Z>, military: bool) -> Result<String, FormatError> {
    let weekday = WEEKDAYS[local.weekday().num_days_from_sunday() as usize];
    let month = MONTHS[local.month0() as usize];
    let yy = local.year().rem_euclid(100);

    if military {
        let offset_minutes = local.offset().fix().local_minus_utc() / 60;
        if offset_minutes % 60 != 0 {
            return Err(FormatError::UnmappedOffset {
                minutes: offset_minutes,
            });
        }
        let letter = military_letter(offset_minutes / 60).ok_or(FormatError::UnmappedOffset {
            minutes: offset_minutes,
        })?;
        Ok(format!(
            "{:02} {:02}{:02}{} {} {:02}",
            local.day(),
            local.hour(),
            local.minute(),
            letter,
            month.to_uppercase(),
            yy
        ))
    } else {
        let (pm, hour) = local.hour12();
        Ok(format!(
            "{}, {:02} {} {:02} {:02}:{:02}:{:02} {}",
            weekday,
            local.day(),
            month,
            yy,
            hour,
            local.minute(),
            local.second(),
            if pm { "PM" } else { "AM" }
        ))
    }
}
