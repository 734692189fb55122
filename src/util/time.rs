//! Conversions from the engine's two native time encodings.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Number of 100-nanosecond ticks per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Seconds between 1601-01-01 (the tick epoch) and 1970-01-01.
const TICK_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Converts a count of 100-nanosecond ticks since 1601-01-01T00:00:00Z into a
/// UTC timestamp.
///
/// Returns `None` for negative tick counts.
pub fn ticks_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks < 0 {
        return None;
    }
    let secs = ticks / TICKS_PER_SECOND - TICK_EPOCH_OFFSET_SECS;
    let nanos = (ticks % TICKS_PER_SECOND) * 100;
    DateTime::from_timestamp(secs, nanos as u32)
}

/// Converts an OLE automation date (days since 1899-12-30, the fraction being
/// the time of day) into a UTC timestamp.
///
/// For negative dates the fraction still counts forward from midnight, so
/// `-1.25` is 1899-12-29T06:00:00.
pub fn ole_date_to_datetime(days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    let whole = days.trunc();
    let fraction = (days - whole).abs();
    let millis = whole * MILLIS_PER_DAY + (fraction * MILLIS_PER_DAY).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    epoch.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Interprets an ambiguous 64-bit column value as a tick timestamp, returning
/// it only if it lies strictly between 1970-01-01 and `now + window`.
///
/// Columns of type code 15 hold either plain counters or timestamps and the
/// catalog has nothing to tell them apart; the window keeps small counters
/// (which land in the 17th century) and huge ones (far future) as integers.
pub fn try_interpret_as_timestamp(
    raw: i64,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<DateTime<Utc>> {
    let timestamp = ticks_to_datetime(raw)?;
    let upper = now.checked_add_signed(window)?;
    (timestamp > DateTime::<Utc>::UNIX_EPOCH && timestamp < upper).then_some(timestamp)
}
