//! Timex / date-time resolution
//!
//! Converts provider date/time expressions (timex strings, ISO local
//! date-times, free text) into absolute local timestamps. Resolution never
//! fails: anything that cannot be parsed goes through [`RelativeDatePolicy`].

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use tracing::{debug, warn};

/// Local date-time layouts accepted verbatim
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Timex hour-only form: `2024-01-16T14`
static DATE_HOUR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})T(\d{1,2})$").expect("valid date-hour regex")
});

/// Time-of-day component of a partial timex: `XXXX-XX-XXT14:30`, `T09`
static TIME_OF_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"T(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?$").expect("valid time-of-day regex")
});

/// Policy applied when an expression is relative or cannot be parsed.
///
/// The date is `now + day_offset` days at the same time of day, unless the
/// expression carried its own time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeDatePolicy {
    pub day_offset: i64,
}

impl Default for RelativeDatePolicy {
    fn default() -> Self {
        Self { day_offset: 1 }
    }
}

impl RelativeDatePolicy {
    pub fn new(day_offset: i64) -> Self {
        Self { day_offset }
    }

    /// The fallback timestamp for `now`
    pub fn apply(&self, now: NaiveDateTime, time_of_day: Option<NaiveTime>) -> NaiveDateTime {
        let shifted = now + Duration::days(self.day_offset);
        match time_of_day {
            Some(time) => shifted.date().and_time(time),
            None => shifted,
        }
    }
}

/// Resolves date/time expressions relative to a supplied "now"
#[derive(Debug, Clone, Copy, Default)]
pub struct TimexResolver {
    policy: RelativeDatePolicy,
}

impl TimexResolver {
    pub fn new(policy: RelativeDatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RelativeDatePolicy {
        self.policy
    }

    /// Resolve `expression` to an absolute timestamp.
    ///
    /// `type_hint` is the provider's value type ("datetime", "date", "time",
    /// "datetimerange", ...) and only affects logging.
    pub fn resolve(
        &self,
        expression: &str,
        type_hint: Option<&str>,
        now: NaiveDateTime,
    ) -> NaiveDateTime {
        let expression = range_start(expression.trim());

        if is_relative(expression) {
            debug!(
                expression,
                type_hint = type_hint.unwrap_or("-"),
                "Relative timex, applying relative-date policy"
            );
            return self.policy.apply(now, time_of_day(expression));
        }

        if expression.eq_ignore_ascii_case("PRESENT_REF") || expression.eq_ignore_ascii_case("now") {
            return now;
        }

        if let Some(parsed) = parse_absolute(expression, now) {
            return parsed;
        }

        warn!(
            expression,
            type_hint = type_hint.unwrap_or("-"),
            "Could not parse date/time, applying relative-date policy"
        );
        self.policy.apply(now, time_of_day(expression))
    }
}

/// `(2024-01-16T14,2024-01-16T15,PT1H)` resolves to its start component
fn range_start(expression: &str) -> &str {
    match expression.strip_prefix('(') {
        Some(inner) => inner
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or(inner),
        None => expression,
    }
}

/// Wildcard and week-based timex forms carry no absolute date
fn is_relative(expression: &str) -> bool {
    expression.contains("XX")
        || expression.contains("-W")
        || expression.starts_with('T')
        || expression.to_lowercase().contains("tomorrow")
}

fn time_of_day(expression: &str) -> Option<NaiveTime> {
    let caps = TIME_OF_DAY_RE.captures(expression)?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn parse_absolute(expression: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(expression, format) {
            return Some(parsed);
        }
    }

    // Offsets are dropped; the wall-clock time as written is kept.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(expression) {
        return Some(parsed.naive_local());
    }

    if let Some(caps) = DATE_HOUR_RE.captures(expression) {
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let hour = caps[2].parse().ok()?;
        return date.and_hms_opt(hour, 0, 0);
    }

    NaiveDate::parse_from_str(expression, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(now.time()))
}
