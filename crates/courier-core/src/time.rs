// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time source and the canonical timestamp encoding used in storage.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current time.
///
/// The scheduler and retry coordinator read time through this trait so that
/// due-time selection can be driven deterministically in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a timestamp as fixed-width ISO 8601 with millisecond precision.
///
/// Every timestamp column uses this encoding so that lexical comparison in
/// SQL matches chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_ts`] (or any RFC 3339 string).
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_fixed_width_and_sortable() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let (fa, fb) = (format_ts(a), format_ts(b));
        assert_eq!(fa, "2026-03-01T09:00:00.000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
    }

    #[test]
    fn parse_accepts_formatted_output() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 4, 12, 30, 15).unwrap();
        assert_eq!(parse_ts(&format_ts(ts)), Some(ts));
        assert_eq!(parse_ts("not a time"), None);
    }
}
