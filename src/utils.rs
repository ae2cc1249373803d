/// Utility functions for timekeeping and formatting
use std::time::Instant;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Wall-clock layout of the log file timestamp column
pub const LOG_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// Format a timestamp for the log file
///
/// Produces YYYY-MM-DD HH:MM:SS.ffffff.
/// Falls back to default string representation if formatting fails.
pub fn format_log_timestamp(dt: &OffsetDateTime) -> String {
    dt.format(LOG_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| dt.to_string())
}

/// Format whole elapsed seconds as MM:SS
///
/// Minutes keep growing past 99 rather than wrapping.
pub fn format_elapsed(seconds: u64) -> String {
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    format!("{minutes:02}:{seconds:02}")
}

/// Convert a monotonic span in seconds to whole seconds
///
/// Negative spans (clock skew in tests) clamp to zero.
pub fn duration_to_seconds(span: f64) -> u64 {
    if span.is_finite() && span > 0.0 {
        span.floor() as u64
    } else {
        0
    }
}

/// Process-wide monotonic timebase
///
/// Every buffer time axis and every rate estimator reads seconds from the
/// same origin so slices of different devices line up.
#[derive(Debug, Clone, Copy)]
pub struct Timebase {
    origin: Instant,
}

impl Timebase {
    pub fn start() -> Self {
        Timebase {
            origin: Instant::now(),
        }
    }

    /// Seconds since the timebase started.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Local wall clock for log rows
///
/// The local UTC offset can only be queried safely while the process is
/// single-threaded, so it is captured once at startup.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    offset: UtcOffset,
}

impl WallClock {
    /// Capture the local offset, falling back to UTC if it is unavailable.
    pub fn local() -> Self {
        WallClock {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }

    pub fn utc() -> Self {
        WallClock {
            offset: UtcOffset::UTC,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::PrimitiveDateTime;

    #[test]
    fn log_timestamps_have_microsecond_precision() {
        let dt = datetime!(2024-01-01 12:00:05.12 UTC);
        assert_eq!(format_log_timestamp(&dt), "2024-01-01 12:00:05.120000");
    }

    #[test]
    fn log_timestamps_parse_back() {
        let text = format_log_timestamp(&datetime!(2024-03-09 07:08:09.000321 UTC));
        let parsed = PrimitiveDateTime::parse(&text, LOG_TIMESTAMP_FORMAT).unwrap();
        assert_eq!(parsed, datetime!(2024-03-09 07:08:09.000321));
    }

    #[test]
    fn elapsed_is_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(6001), "100:01");
    }

    #[test]
    fn negative_spans_clamp_to_zero() {
        assert_eq!(duration_to_seconds(-1.5), 0);
        assert_eq!(duration_to_seconds(61.9), 61);
    }
}
