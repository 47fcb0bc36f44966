//! Service-day relative times.
//!
//! Timetables store times as seconds since the start of the service day
//! rather than as wall-clock instants. A service day starts at "noon minus
//! twelve hours" in the feed time zone, which equals midnight except on days
//! with a daylight-saving transition. Trips running past midnight simply
//! carry times beyond 24:00:00.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Seconds since the start of a service day.
///
/// Displayed in compact form: seconds are omitted when they are zero.
///
/// # Examples
///
/// ```
/// use transit_realtime::domain::ServiceTime;
///
/// let t = ServiceTime::parse("0:00:15").unwrap();
/// assert_eq!(t.seconds(), 15);
/// assert_eq!(t.to_string(), "0:00:15");
///
/// let t = ServiceTime::parse("25:10").unwrap();
/// assert_eq!(t.seconds(), 25 * 3600 + 600);
/// assert_eq!(t.to_string(), "25:10");
///
/// assert!(ServiceTime::parse("7").is_err());
/// assert!(ServiceTime::parse("7:60").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceTime(i32);

impl ServiceTime {
    pub const MIDNIGHT: ServiceTime = ServiceTime(0);

    pub const fn from_seconds(seconds: i32) -> Self {
        Self(seconds)
    }

    pub const fn hms(hours: i32, minutes: i32, seconds: i32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    /// Parse `H:MM` or `H:MM:SS`. Hours may exceed 23 for trips running
    /// past midnight.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let mut parts = s.split(':');
        let hours = parts
            .next()
            .ok_or_else(|| TimeError::new("expected H:MM"))?;
        let minutes = parts
            .next()
            .ok_or_else(|| TimeError::new("expected H:MM"))?;
        let seconds = parts.next();
        if parts.next().is_some() {
            return Err(TimeError::new("too many components"));
        }

        let hours = parse_digits(hours, 1..=2).ok_or_else(|| TimeError::new("invalid hour"))?;
        let minutes = parse_digits(minutes, 2..=2)
            .filter(|m| *m < 60)
            .ok_or_else(|| TimeError::new("minute must be 00-59"))?;
        let seconds = match seconds {
            Some(s) => parse_digits(s, 2..=2)
                .filter(|s| *s < 60)
                .ok_or_else(|| TimeError::new("second must be 00-59"))?,
            None => 0,
        };

        Ok(Self::hms(hours, minutes, seconds))
    }

    pub const fn seconds(self) -> i32 {
        self.0
    }

    /// The time `seconds` later, or `None` if it does not fit.
    pub fn checked_add(self, seconds: i32) -> Option<Self> {
        self.0.checked_add(seconds).map(Self)
    }

    /// Seconds from `earlier` to this time, or `None` if they do not fit.
    pub fn checked_sub(self, earlier: Self) -> Option<i32> {
        self.0.checked_sub(earlier.0)
    }

    /// Convert an absolute instant to a time on the given service date.
    pub fn from_instant<Z: TimeZone>(
        instant: &DateTime<Z>,
        service_date: NaiveDate,
        zone: Tz,
    ) -> Option<Self> {
        let start = service_day_start(service_date, zone)?;
        let seconds = instant.timestamp() - start.timestamp();
        i32::try_from(seconds).ok().map(Self)
    }

    /// Convert a POSIX timestamp to a time on the given service date.
    pub fn from_epoch_seconds(epoch: i64, service_date: NaiveDate, zone: Tz) -> Option<Self> {
        let start = service_day_start(service_date, zone)?;
        let seconds = epoch.checked_sub(start.timestamp())?;
        i32::try_from(seconds).ok().map(Self)
    }

    /// Returns the absolute instant of this time on the given service date.
    pub fn to_instant(self, service_date: NaiveDate, zone: Tz) -> Option<DateTime<Tz>> {
        let start = service_day_start(service_date, zone)?;
        start.checked_add_signed(Duration::seconds(i64::from(self.0)))
    }
}

/// The instant a service day starts: noon minus twelve hours, local time.
pub fn service_day_start(service_date: NaiveDate, zone: Tz) -> Option<DateTime<Tz>> {
    let noon = service_date.and_hms_opt(12, 0, 0)?;
    let local_noon = zone.from_local_datetime(&noon).earliest()?;
    local_noon.checked_sub_signed(Duration::hours(12))
}

impl Add<i32> for ServiceTime {
    type Output = Self;

    fn add(self, rhs: i32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub for ServiceTime {
    type Output = i32;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl fmt::Debug for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceTime({self})")
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let (h, m, s) = (abs / 3600, (abs % 3600) / 60, abs % 60);
        if s == 0 {
            write!(f, "{sign}{h}:{m:02}")
        } else {
            write!(f, "{sign}{h}:{m:02}:{s:02}")
        }
    }
}

/// Parse an all-digit string whose length falls in `len`.
fn parse_digits(s: &str, len: std::ops::RangeInclusive<usize>) -> Option<i32> {
    if !len.contains(&s.len()) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
