//! Recurrence pattern compilation
//!
//! Free-text recurrence descriptions ("every weekday", "weekly on monday and
//! thursday", "monthly") are matched against a fixed vocabulary and turned into
//! a [`RecurrenceRule`]. Unrecognized text falls back to a weekly rule.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default validity of a recurring series
pub const DEFAULT_RANGE_MONTHS: u32 = 6;

/// Weekday names in Monday..Sunday order
pub(crate) const WEEKDAY_NAMES: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

const WORKWEEK: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Phrases that double the interval
const EVERY_OTHER: &[&str] = &["every other", "biweekly", "bi-weekly", "fortnight"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// Structured repeating rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Always >= 1
    pub interval: u32,
    /// Monday..Sunday order, never empty for weekly rules, empty otherwise
    pub active_weekdays: Vec<Weekday>,
    pub range_start: NaiveDate,
    /// Inclusive
    pub range_end: NaiveDate,
}

impl RecurrenceRule {
    pub fn is_active_on(&self, weekday: Weekday) -> bool {
        self.active_weekdays.contains(&weekday)
    }
}

/// Compiles recurrence text into a [`RecurrenceRule`]
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceCompiler {
    range_months: u32,
}

impl Default for RecurrenceCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE_MONTHS)
    }
}

impl RecurrenceCompiler {
    pub fn new(range_months: u32) -> Self {
        Self {
            range_months: range_months.max(1),
        }
    }

    /// Compile `text` for a series starting at `start` (today if absent)
    pub fn compile(&self, text: &str, start: Option<NaiveDateTime>) -> RecurrenceRule {
        let anchor = start
            .map(|s| s.date())
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        self.compile_from(text, anchor)
    }

    /// Compile `text` for a series whose range starts on `anchor`
    pub fn compile_from(&self, text: &str, anchor: NaiveDate) -> RecurrenceRule {
        let lower = text.to_lowercase();

        let frequency = if lower.contains("weekday") {
            Frequency::Weekly
        } else if lower.contains("daily") {
            Frequency::Daily
        } else if lower.contains("monthly") {
            Frequency::Monthly
        } else {
            Frequency::Weekly
        };

        let interval = if EVERY_OTHER.iter().any(|p| lower.contains(p)) {
            2
        } else {
            1
        };

        let active_weekdays = match frequency {
            Frequency::Weekly => weekly_days(&lower, anchor),
            _ => Vec::new(),
        };

        let range_end = anchor
            .checked_add_months(Months::new(self.range_months))
            .unwrap_or(NaiveDate::MAX);

        let rule = RecurrenceRule {
            frequency,
            interval,
            active_weekdays,
            range_start: anchor,
            range_end,
        };
        debug!(text, ?rule, "Compiled recurrence rule");
        rule
    }
}

/// Weekdays named in `lower`; "weekday" means exactly Mon–Fri. With no
/// weekday named, the series repeats on the anchor's weekday.
fn weekly_days(lower: &str, anchor: NaiveDate) -> Vec<Weekday> {
    if lower.contains("weekday") {
        return WORKWEEK.to_vec();
    }

    let named: Vec<Weekday> = WEEKDAY_NAMES
        .iter()
        .filter(|(name, _)| lower.contains(name))
        .map(|(_, day)| *day)
        .collect();

    if named.is_empty() {
        vec![anchor.weekday()]
    } else {
        named
    }
}
