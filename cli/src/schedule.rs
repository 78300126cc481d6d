//! Daily `HH:MM` (UTC) trigger for scheduled scan passes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Utc};

/// Fires once a day at a fixed UTC wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|at| Self { at })
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        }
    }

    /// How long to sleep from `now` until the next firing.
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self { at: NaiveTime::MIN }
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} UTC", self.at.format("%H:%M"))
    }
}

impl FromStr for DailySchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("schedule '{s}' is not HH:MM"))?;
        let hour = h.parse::<u32>().map_err(|_| format!("bad hour in '{s}'"))?;
        let minute = m.parse::<u32>().map_err(|_| format!("bad minute in '{s}'"))?;
        Self::new(hour, minute).ok_or_else(|| format!("schedule '{s}' is out of range"))
    }
}
