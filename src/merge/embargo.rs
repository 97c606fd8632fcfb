//! Recurring weekly merge embargo windows

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s+(\d{1,2}):(\d{2})\s*-\s*([A-Za-z]+)\s+(\d{1,2}):(\d{2})\s*$")
        .expect("valid interval regex")
});

const SECS_PER_WEEK: u32 = 7 * 24 * 3600;

/// Seconds since Monday 00:00
fn week_offset(day: Weekday, time: NaiveTime) -> u32 {
    day.num_days_from_monday() * 24 * 3600 + time.num_seconds_from_midnight()
}

/// A window recurring every week, e.g. `Fri 18:00 - Mon 08:00` (UTC).
///
/// Both ends are inclusive. A window whose start lies after its end wraps
/// around the week boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyInterval {
    from: u32,
    to: u32,
}

impl WeeklyInterval {
    /// Build from explicit endpoints
    pub fn new(from_day: Weekday, from_time: NaiveTime, to_day: Weekday, to_time: NaiveTime) -> Self {
        Self {
            from: week_offset(from_day, from_time),
            to: week_offset(to_day, to_time),
        }
    }

    /// Whether `when` falls inside the window
    pub fn covers(&self, when: DateTime<Utc>) -> bool {
        let t = week_offset(when.weekday(), when.time()) % SECS_PER_WEEK;
        if self.from <= self.to {
            self.from <= t && t <= self.to
        } else {
            t >= self.from || t <= self.to
        }
    }
}

impl FromStr for WeeklyInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid embargo interval: {s:?}"));
        let caps = INTERVAL_RE.captures(s).ok_or_else(invalid)?;
        let day = |i: usize| Weekday::from_str(&caps[i]).map_err(|_| invalid());
        let time = |i: usize| -> Result<NaiveTime> {
            let hour = caps[i].parse().map_err(|_| invalid())?;
            let minute = caps[i + 1].parse().map_err(|_| invalid())?;
            NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
        };
        Ok(Self::new(day(1)?, time(2)?, day(4)?, time(5)?))
    }
}

/// A union of weekly windows during which no merges happen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embargo {
    intervals: Vec<WeeklyInterval>,
}

impl Embargo {
    /// No embargo at all
    pub const fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Union of the given windows
    pub const fn from_intervals(intervals: Vec<WeeklyInterval>) -> Self {
        Self { intervals }
    }

    /// Whether any window covers `when`
    pub fn covers(&self, when: DateTime<Utc>) -> bool {
        self.intervals.iter().any(|i| i.covers(when))
    }

    /// Whether there are no windows
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl FromStr for Embargo {
    type Err = Error;

    /// Comma-separated windows; an empty string is no embargo
    fn from_str(s: &str) -> Result<Self> {
        let intervals = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(WeeklyInterval::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { intervals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-01-01 is a Monday
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_weekend_window_wraps_around() {
        let embargo: Embargo = "Fri 18:00 - Mon 08:00".parse().unwrap();
        assert!(embargo.covers(at(5, 18, 0)));
        assert!(embargo.covers(at(6, 12, 0)));
        assert!(embargo.covers(at(7, 23, 59)));
        assert!(embargo.covers(at(1, 7, 59)));
        assert!(embargo.covers(at(8, 8, 0)));
        assert!(!embargo.covers(at(1, 8, 1)));
        assert!(!embargo.covers(at(5, 17, 59)));
        assert!(!embargo.covers(at(3, 12, 0)));
    }

    #[test]
    fn test_union_of_windows() {
        let embargo: Embargo = "Wed 12:00 - Wed 13:00, Thursday 9:00 - Thursday 9:30"
            .parse()
            .unwrap();
        assert!(embargo.covers(at(3, 12, 30)));
        assert!(embargo.covers(at(4, 9, 15)));
        assert!(!embargo.covers(at(3, 13, 1)));
        assert!(!embargo.covers(at(4, 10, 0)));
    }

    #[test]
    fn test_empty_string_is_no_embargo() {
        let embargo: Embargo = "".parse().unwrap();
        assert!(embargo.is_empty());
        assert!(!embargo.covers(at(1, 0, 0)));
        assert_eq!(embargo, Embargo::empty());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("Fri - Mon".parse::<Embargo>().is_err());
        assert!("Fry 10:00 - Mon 10:00".parse::<Embargo>().is_err());
        assert!("Fri 25:00 - Mon 10:00".parse::<Embargo>().is_err());
    }
}
