//! Time-of-day parsing, instant resolution and countdown formatting.
//!
//! Provider times are "HH:MM" strings for a calendar day. Some providers emit
//! "24:MM" for times just past midnight; that is read as minute MM of the
//! following day. Malformed strings never fail: they resolve to "00:00" and
//! the anomaly is handed back to the caller.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use thiserror::Error;

use crate::prayer::{PrayerName, PrayerTimeSet};

/// Why a time string could not be read as "HH:MM".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeFormatError {
    #[error("time string is empty")]
    Empty,
    #[error("time '{0}' is not in HH:MM form")]
    Shape(String),
    #[error("time '{0}' has non-numeric parts")]
    NotNumeric(String),
    #[error("time '{0}' is out of range")]
    OutOfRange(String),
}

/// A parsed wall-clock time, possibly on the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub time: NaiveTime,
    /// Set for the "24:MM" sentinel.
    pub next_day: bool,
}

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime {
        time: NaiveTime::MIN,
        next_day: false,
    };

    /// Strictly parse "HH:MM" (hours 0-24, where 24 is the next-day sentinel).
    pub fn parse(input: &str) -> Result<Self, TimeFormatError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TimeFormatError::Empty);
        }

        let Some((h, m)) = trimmed.split_once(':') else {
            return Err(TimeFormatError::Shape(trimmed.to_string()));
        };
        if h.is_empty() || m.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(TimeFormatError::Shape(trimmed.to_string()));
        }
        if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimeFormatError::NotNumeric(trimmed.to_string()));
        }

        let hour: u32 = h
            .parse()
            .map_err(|_| TimeFormatError::NotNumeric(trimmed.to_string()))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| TimeFormatError::NotNumeric(trimmed.to_string()))?;

        let (hour, next_day) = if hour == 24 { (0, true) } else { (hour, false) };
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| TimeFormatError::OutOfRange(trimmed.to_string()))?;

        Ok(Self { time, next_day })
    }

    /// Parse, falling back to midnight on malformed input.
    pub fn parse_lossy(input: &str) -> (Self, Option<TimeFormatError>) {
        match Self::parse(input) {
            Ok(parsed) => (parsed, None),
            Err(e) => (Self::MIDNIGHT, Some(e)),
        }
    }

    /// Local date-time on `day`, accounting for the next-day sentinel.
    pub fn on(self, day: NaiveDate) -> NaiveDateTime {
        let day = if self.next_day {
            day.succ_opt().unwrap_or(day)
        } else {
            day
        };
        day.and_time(self.time)
    }
}

/// An instant resolved from a provider string, with any parse anomaly.
#[derive(Debug, Clone)]
pub struct ResolvedInstant<Tz: TimeZone> {
    pub instant: DateTime<Tz>,
    pub anomaly: Option<TimeFormatError>,
}

/// Resolve `time` on `day` in `tz`, reporting malformed input to the caller.
pub fn resolve_instant<Tz: TimeZone>(time: &str, day: NaiveDate, tz: &Tz) -> ResolvedInstant<Tz> {
    let (clock, anomaly) = ClockTime::parse_lossy(time);
    ResolvedInstant {
        instant: localize(tz, clock.on(day)),
        anomaly,
    }
}

/// Resolve `time` on `day` in `tz`. Malformed input is logged and read as
/// "00:00".
pub fn to_instant<Tz: TimeZone>(time: &str, day: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let resolved = resolve_instant(time, day, tz);
    if let Some(anomaly) = &resolved.anomaly {
        tracing::warn!(%day, "Malformed prayer time, using 00:00: {}", anomaly);
    }
    resolved.instant
}

/// Every malformed time in `times`, in day order.
pub fn time_anomalies(times: &PrayerTimeSet) -> Vec<(PrayerName, TimeFormatError)> {
    times
        .iter()
        .filter_map(|(prayer, time)| ClockTime::parse(time).err().map(|e| (prayer, e)))
        .collect()
}

/// Warn once per malformed time. Called when a day's times are loaded so
/// per-tick evaluation can stay silent.
pub fn log_time_anomalies(times: &PrayerTimeSet) {
    for (prayer, anomaly) in time_anomalies(times) {
        tracing::warn!(
            prayer = prayer.key(),
            "Malformed prayer time, using 00:00: {}",
            anomaly
        );
    }
}

/// Next occurrence of `time` that lies beyond `now + margin`.
///
/// The candidate is resolved on `now`'s calendar day; while it is at or
/// before `now + margin` it moves to the same wall-clock time on the next
/// day. A second step only happens when the margin itself crosses midnight.
pub fn roll_forward<Tz: TimeZone>(time: &str, now: &DateTime<Tz>, margin: Duration) -> DateTime<Tz> {
    let threshold = now.clone() + margin;
    let tz = now.timezone();
    let mut day = now.date_naive();
    let mut candidate = to_instant(time, day, &tz);
    while candidate <= threshold {
        let Some(next) = day.succ_opt() else {
            return candidate + Duration::hours(24);
        };
        day = next;
        candidate = to_instant(time, day, &tz);
    }
    candidate
}

/// Format a countdown as `HH:MM:SS`. Negative durations clamp to zero.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are pushed forward by an hour.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt;
    }
    let shifted = naive + Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
