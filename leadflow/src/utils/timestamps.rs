//! Tenant-local time conversion.
//!
//! The CRM stores every timestamp as epoch seconds while reports are read in the
//! tenant's wall clock. Date-range filters are typed by an operator in the host
//! machine's zone, so they need an extra correction before being sent upstream.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Largest UTC offset in use anywhere.
const MAX_OFFSET_HOURS: i32 = 14;

const SECONDS_PER_HOUR: i32 = 3600;

/// Epoch-second bounds of a fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    /// Inclusive lower bound.
    pub from_ts: i64,
    /// Inclusive upper bound.
    pub to_ts: i64,
}

/// Converts epoch timestamps to a tenant's fixed-offset wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConverter {
    tenant_offset_hours: i32,
    host_offset_hours: i32,
    tenant_zone: FixedOffset,
}

impl TimeConverter {
    /// Creates a converter for the given tenant offset, capturing the host's
    /// current offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] for offsets beyond ±14 hours.
    pub fn new(tenant_offset_hours: i32) -> Result<Self, ConfigError> {
        let tenant_zone = fixed_offset(tenant_offset_hours)?;
        Ok(Self {
            tenant_offset_hours,
            host_offset_hours: host_offset_hours(),
            tenant_zone,
        })
    }

    /// Overrides the host offset.
    #[must_use]
    pub const fn with_host_offset(mut self, hours: i32) -> Self {
        self.host_offset_hours = hours;
        self
    }

    /// The tenant's UTC offset in hours.
    #[must_use]
    pub const fn tenant_offset_hours(&self) -> i32 {
        self.tenant_offset_hours
    }

    /// The host's UTC offset in hours.
    #[must_use]
    pub const fn host_offset_hours(&self) -> i32 {
        self.host_offset_hours
    }

    /// Converts an epoch timestamp to tenant-local time.
    #[must_use]
    pub fn to_local(&self, unix_ts: i64) -> DateTime<FixedOffset> {
        DateTime::<Utc>::from_timestamp(unix_ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.tenant_zone)
    }

    /// The tenant-local calendar date of an epoch timestamp.
    #[must_use]
    pub fn local_date(&self, unix_ts: i64) -> NaiveDate {
        self.to_local(unix_ts).date_naive()
    }

    /// The tenant-local hour of an epoch timestamp.
    #[must_use]
    pub fn local_hour(&self, unix_ts: i64) -> u32 {
        self.to_local(unix_ts).hour()
    }

    /// Corrects an operator-supplied date range into epoch bounds.
    ///
    /// Both bounds are shifted by `host - tenant` hours and then read as host
    /// wall-clock time.
    #[must_use]
    pub fn window_shift(&self, date_from: NaiveDateTime, date_to: NaiveDateTime) -> FetchWindow {
        let shift = Duration::hours(i64::from(self.host_offset_hours - self.tenant_offset_hours));
        FetchWindow {
            from_ts: self.host_wall_clock_to_epoch(date_from + shift),
            to_ts: self.host_wall_clock_to_epoch(date_to + shift),
        }
    }

    fn host_wall_clock_to_epoch(&self, naive: NaiveDateTime) -> i64 {
        naive.and_utc().timestamp() - i64::from(self.host_offset_hours * SECONDS_PER_HOUR)
    }
}

/// Builds a [`FixedOffset`] from whole hours.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOffset`] when out of range.
pub fn fixed_offset(hours: i32) -> Result<FixedOffset, ConfigError> {
    if hours.abs() > MAX_OFFSET_HOURS {
        return Err(ConfigError::InvalidOffset(hours));
    }
    FixedOffset::east_opt(hours * SECONDS_PER_HOUR).ok_or(ConfigError::InvalidOffset(hours))
}

/// Returns the host machine's current UTC offset in whole hours.
#[must_use]
pub fn host_offset_hours() -> i32 {
    Local::now().offset().fix().local_minus_utc() / SECONDS_PER_HOUR
}

/// Moves a date back to the Monday of its ISO week.
#[must_use]
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveTime};

    fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap())
    }

    #[test]
    fn test_to_local_applies_tenant_offset() {
        let converter = TimeConverter::new(3).unwrap();
        // 2023-10-05T22:00:00Z
        let local = converter.to_local(1_696_543_200);

        assert_eq!(local.hour(), 1);
        assert_eq!(local.day(), 6);
        assert_eq!(local.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_local_date_negative_offset() {
        let converter = TimeConverter::new(-5).unwrap();
        // 2023-10-05T02:00:00Z is still Oct 4 in UTC-5
        let date = converter.local_date(1_696_471_200);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 10, 4).unwrap());
    }

    #[test]
    fn test_invalid_offset_rejected() {
        assert_eq!(TimeConverter::new(15), Err(ConfigError::InvalidOffset(15)));
        assert!(TimeConverter::new(-12).is_ok());
    }

    #[test]
    fn test_window_shift_reads_range_in_tenant_zone() {
        let converter = TimeConverter::new(3).unwrap().with_host_offset(0);
        let window = converter.window_shift(naive(2023, 10, 1, 0), naive(2023, 10, 2, 0));

        // midnight in UTC+3 is 21:00 UTC of the previous day
        assert_eq!(window.from_ts, naive(2023, 9, 30, 21).and_utc().timestamp());
        assert_eq!(window.to_ts - window.from_ts, 86_400);
    }

    #[test]
    fn test_window_shift_independent_of_host_offset() {
        let a = TimeConverter::new(1).unwrap().with_host_offset(5);
        let b = TimeConverter::new(1).unwrap().with_host_offset(-7);
        let from = naive(2024, 1, 10, 12);

        assert_eq!(a.window_shift(from, from), b.window_shift(from, from));
    }

    #[test]
    fn test_monday_of() {
        let sunday = NaiveDate::from_ymd_opt(2023, 10, 8).unwrap();
        assert_eq!(monday_of(sunday), NaiveDate::from_ymd_opt(2023, 10, 2).unwrap());
        let monday = NaiveDate::from_ymd_opt(2023, 10, 2).unwrap();
        assert_eq!(monday_of(monday), monday);
    }
}
