//! Weekly on-duty windows.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ConfigError;

/// Working hours of one weekday, `start < t < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyWindow {
    /// Last off-duty instant before the window.
    pub start: NaiveTime,
    /// First off-duty instant after the window.
    pub end: NaiveTime,
}

impl DutyWindow {
    /// Returns true if `time` falls strictly inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start < time && time < self.end
    }
}

/// Weekday (Monday = 0) to working hours. Missing days are off duty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<u8, (String, String)>",
    into = "BTreeMap<u8, (String, String)>"
)]
pub struct DutySchedule {
    days: BTreeMap<u8, DutyWindow>,
}

fn parse_time(weekday: u8, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| ConfigError::InvalidSchedule {
            weekday,
            reason: format!("bad time {raw:?}: {e}"),
        })
}

impl DutySchedule {
    /// Creates an empty schedule: always off duty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a weekday window.
    ///
    /// # Errors
    ///
    /// Fails for a weekday above 6 or a window that does not end after it
    /// starts.
    pub fn with_day(mut self, weekday: u8, start: NaiveTime, end: NaiveTime) -> Result<Self, ConfigError> {
        if weekday > 6 {
            return Err(ConfigError::InvalidSchedule {
                weekday,
                reason: "weekday must be 0 (Monday) to 6 (Sunday)".to_string(),
            });
        }
        if start >= end {
            return Err(ConfigError::InvalidSchedule {
                weekday,
                reason: format!("window {start}..{end} is empty"),
            });
        }
        self.days.insert(weekday, DutyWindow { start, end });
        Ok(self)
    }

    /// Same as [`DutySchedule::with_day`] for every weekday in `weekdays`.
    ///
    /// # Errors
    ///
    /// See [`DutySchedule::with_day`].
    pub fn with_days(
        mut self,
        weekdays: impl IntoIterator<Item = u8>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Self, ConfigError> {
        for weekday in weekdays {
            self = self.with_day(weekday, start, end)?;
        }
        Ok(self)
    }

    /// Window of a weekday.
    #[must_use]
    pub fn window(&self, weekday: u8) -> Option<&DutyWindow> {
        self.days.get(&weekday)
    }

    /// Returns true if no day is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Classifies a tenant-local instant.
    #[must_use]
    pub fn is_on_duty(&self, local: DateTime<FixedOffset>) -> bool {
        let Ok(weekday) = u8::try_from(local.weekday().num_days_from_monday()) else {
            return false;
        };
        let time = local.time().with_nanosecond(0).unwrap_or_else(|| local.time());
        self.window(weekday).is_some_and(|w| w.contains(time))
    }
}

impl TryFrom<BTreeMap<u8, (String, String)>> for DutySchedule {
    type Error = ConfigError;

    fn try_from(raw: BTreeMap<u8, (String, String)>) -> Result<Self, Self::Error> {
        let mut schedule = Self::new();
        for (weekday, (start, end)) in raw {
            let start = parse_time(weekday, &start)?;
            let end = parse_time(weekday, &end)?;
            schedule = schedule.with_day(weekday, start, end)?;
        }
        Ok(schedule)
    }
}

impl From<DutySchedule> for BTreeMap<u8, (String, String)> {
    fn from(schedule: DutySchedule) -> Self {
        schedule
            .days
            .into_iter()
            .map(|(day, w)| {
                (
                    day,
                    (w.start.format("%H:%M").to_string(), w.end.format("%H:%M").to_string()),
                )
            })
            .collect()
    }
}
