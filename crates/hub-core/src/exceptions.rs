//! Exception resolution for recurring series
//!
//! A [`RecurrenceRule`] is expanded into concrete [`Occurrence`]s and each
//! exception phrase ("second tuesday", "fridays", "last monday") is matched
//! against them. Nothing here touches a calendar; the result is handed to the
//! calendar provider, which skips those instances.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::recurrence::{Frequency, RecurrenceRule, WEEKDAY_NAMES};

/// One concrete date produced by expanding a recurrence rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub date: NaiveDate,
    pub weekday: Weekday,
    /// `((day - 1) / 7) + 1`
    pub week_of_month: u32,
}

impl Occurrence {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday(),
            week_of_month: (date.day() - 1) / 7 + 1,
        }
    }

    /// No later date in the same month falls on the same weekday
    pub fn is_last_of_month(&self) -> bool {
        self.date
            .checked_add_days(Days::new(7))
            .is_none_or(|next| next.month() != self.date.month())
    }
}

/// Position of a weekday within its month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordinal {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Last,
}

/// Ordinal tokens, matched on word boundaries so "21st" or "lasting" do not count
static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(first|1st|second|2nd|third|3rd|fourth|4th|fifth|5th|last)\b")
        .expect("valid ordinal regex")
});

impl Ordinal {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "first" | "1st" => Some(Self::First),
            "second" | "2nd" => Some(Self::Second),
            "third" | "3rd" => Some(Self::Third),
            "fourth" | "4th" => Some(Self::Fourth),
            "fifth" | "5th" => Some(Self::Fifth),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    /// Leftmost ordinal token in `text`
    fn find(text: &str) -> Option<Self> {
        ORDINAL_RE
            .find(text)
            .and_then(|m| Self::from_token(m.as_str()))
    }
}

impl Ordinal {
    fn matches(self, occurrence: &Occurrence) -> bool {
        match self {
            Self::First => occurrence.week_of_month == 1,
            Self::Second => occurrence.week_of_month == 2,
            Self::Third => occurrence.week_of_month == 3,
            Self::Fourth => occurrence.week_of_month == 4,
            Self::Fifth => occurrence.week_of_month == 5,
            Self::Last => occurrence.is_last_of_month(),
        }
    }
}

/// Exclusion rule parsed from one exception phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExceptionRule {
    pub ordinal: Option<Ordinal>,
    pub weekday: Option<Weekday>,
}

impl ExceptionRule {
    /// Parse a phrase. When several ordinals or weekdays appear, the one
    /// earliest in the text wins.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self {
            ordinal: Ordinal::find(&lower),
            weekday: earliest(&lower, &WEEKDAY_NAMES),
        }
    }

    /// Neither part could be resolved; matches nothing
    pub fn is_noop(&self) -> bool {
        self.ordinal.is_none() && self.weekday.is_none()
    }

    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        if self.is_noop() {
            return false;
        }
        let weekday_ok = self.weekday.is_none_or(|day| day == occurrence.weekday);
        let ordinal_ok = self.ordinal.is_none_or(|ord| ord.matches(occurrence));
        weekday_ok && ordinal_ok
    }
}

fn earliest<T: Copy>(haystack: &str, words: &[(&str, T)]) -> Option<T> {
    words
        .iter()
        .filter_map(|(word, value)| haystack.find(word).map(|pos| (pos, *value)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, value)| value)
}

/// Every occurrence of `rule` within its inclusive range, in date order
pub fn expand(rule: &RecurrenceRule) -> Vec<Occurrence> {
    let interval = i64::from(rule.interval.max(1));
    let start = rule.range_start;
    let week_origin = start - Days::new(u64::from(start.weekday().num_days_from_monday()));
    let month_origin = start.year() * 12 + start.month0() as i32;

    start
        .iter_days()
        .take_while(|date| *date <= rule.range_end)
        .filter(|date| match rule.frequency {
            Frequency::Daily => (*date - start).num_days() % interval == 0,
            Frequency::Weekly => {
                let week = (*date - week_origin).num_days() / 7;
                week % interval == 0 && rule.is_active_on(date.weekday())
            }
            Frequency::Monthly => {
                let months = i64::from(date.year() * 12 + date.month0() as i32 - month_origin);
                date.day() == start.day() && months % interval == 0
            }
        })
        .map(Occurrence::on)
        .collect()
}

/// Occurrences of `rule` excluded by any of `exception_texts`, in date order
pub fn resolve_exclusions(rule: &RecurrenceRule, exception_texts: &[String]) -> Vec<Occurrence> {
    let rules: Vec<ExceptionRule> = exception_texts
        .iter()
        .filter_map(|text| {
            let parsed = ExceptionRule::parse(text);
            if parsed.is_noop() {
                debug!(text = %text, "Exception text matched no ordinal or weekday, ignoring");
                None
            } else {
                Some(parsed)
            }
        })
        .collect();

    if rules.is_empty() {
        return Vec::new();
    }

    let excluded: Vec<Occurrence> = expand(rule)
        .into_iter()
        .filter(|occurrence| rules.iter().any(|r| r.matches(occurrence)))
        .collect();

    debug!(count = excluded.len(), "Resolved excluded occurrences");
    excluded
}
