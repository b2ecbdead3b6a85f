use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone, Utc};

pub const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Fractional Unix seconds for `value`, the unit every persisted timestamp uses.
pub fn unix_seconds<Tz: TimeZone>(value: &DateTime<Tz>) -> f64 {
    value.timestamp() as f64 + f64::from(value.timestamp_subsec_micros()) / 1_000_000.0
}

/// Converts fractional Unix seconds into `tz`; `None` for non-finite or out-of-range input.
pub fn datetime_from_unix_seconds<Tz: TimeZone>(seconds: f64, tz: &Tz) -> Option<DateTime<Tz>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round().clamp(0.0, 999_999_999.0) as u32;
    let utc = DateTime::<Utc>::from_timestamp(whole as i64, nanos)?;
    Some(utc.with_timezone(tz))
}

/// Returns the `YYYY-MM-DD` key used to stamp the daily record set.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Naive local ISO-8601 timestamp with microseconds, e.g. `2026-02-08T10:00:00.000000`.
pub fn iso_local_timestamp<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Local midnight `days` days after the calendar day containing `value`.
pub fn midnight_after_days<Tz: TimeZone>(value: &DateTime<Tz>, days: i64) -> Option<DateTime<Tz>> {
    let target_day = value.date_naive().checked_add_signed(Duration::days(days))?;
    let midnight = target_day.and_hms_opt(0, 0, 0)?;
    value
        .timezone()
        .from_local_datetime(&midnight)
        .earliest()
}

/// Source of "now" for everything that stamps or expires state.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_unix(&self) -> f64 {
        unix_seconds(&self.now())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Wall clock in the host's local timezone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

#[derive(Debug)]
/// Settable clock for replays and tests.
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, value: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = value;
        }
    }

    pub fn advance(&self, delta: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
