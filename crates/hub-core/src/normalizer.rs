//! Entity normalization
//!
//! Maps provider entity categories onto the canonical entity set. Category
//! names are matched case-insensitively; unknown categories are dropped.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::model::{CanonicalEntities, DEFAULT_SUBJECT, Intent, RawEntity, UNKNOWN_INTENT};
use crate::timex::TimexResolver;

/// Canonical slot a raw entity category feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Attendee,
    DateTime,
    Recurrence,
    Exception,
    Subject,
    Location,
}

fn slot_for(category: &str) -> Option<Slot> {
    match category.trim().to_lowercase().as_str() {
        "personname" | "attendee" | "person" => Some(Slot::Attendee),
        "datetime" | "datetimev2" | "time" | "date" => Some(Slot::DateTime),
        "recurrence" | "recurrencepattern" | "recurringpattern" => Some(Slot::Recurrence),
        "exception" | "exceptions" => Some(Slot::Exception),
        "subject" | "meetingtitle" | "title" => Some(Slot::Subject),
        "location" => Some(Slot::Location),
        _ => None,
    }
}

/// Absent, empty, or the literal string "null" some providers emit
fn present(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

/// Turns raw provider output into [`CanonicalEntities`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    resolver: TimexResolver,
}

impl Normalizer {
    pub fn new(resolver: TimexResolver) -> Self {
        Self { resolver }
    }

    /// Normalize relative to the local clock
    pub fn normalize(&self, intent_label: &str, entities: &[RawEntity]) -> CanonicalEntities {
        self.normalize_at(intent_label, entities, chrono::Local::now().naive_local())
    }

    /// Normalize with an explicit "now" for relative date resolution
    pub fn normalize_at(
        &self,
        intent_label: &str,
        entities: &[RawEntity],
        now: NaiveDateTime,
    ) -> CanonicalEntities {
        let intent_label = present(intent_label).unwrap_or(UNKNOWN_INTENT).to_string();

        let mut attendees = Vec::new();
        let mut times: Vec<NaiveDateTime> = Vec::with_capacity(2);
        let mut subject = None;
        let mut location = None;
        let mut recurrence_text = None;
        let mut exception_texts = Vec::new();

        for entity in entities {
            let Some(slot) = slot_for(&entity.category) else {
                debug!(category = %entity.category, "Dropping unrecognized entity category");
                continue;
            };

            match slot {
                Slot::Attendee => {
                    if let Some(name) = present(&entity.text) {
                        attendees.push(name.to_string());
                    }
                }
                Slot::DateTime => {
                    // Only one start/end pair per request.
                    if times.len() >= 2 {
                        debug!(text = %entity.text, "Ignoring datetime entity beyond start/end");
                        continue;
                    }
                    if let Some(resolved) = self.resolve_datetime(entity, now) {
                        times.push(resolved);
                    }
                }
                Slot::Recurrence => {
                    if let Some(text) = present(&entity.text) {
                        recurrence_text = Some(text.to_string());
                    }
                }
                Slot::Exception => {
                    if let Some(text) = present(&entity.text) {
                        exception_texts.push(text.to_string());
                    }
                }
                Slot::Subject => {
                    if let Some(text) = present(&entity.text) {
                        subject = Some(text.to_string());
                    }
                }
                Slot::Location => {
                    if let Some(text) = present(&entity.text) {
                        location = Some(text.to_string());
                    }
                }
            }
        }

        let start_time = times.first().copied();
        let end_time = match (start_time, times.get(1).copied()) {
            (Some(start), Some(end)) if end <= start => {
                warn!(%start, %end, "End time is not after start time, dropping end time");
                None
            }
            (_, end) => end,
        };

        CanonicalEntities {
            intent: Intent::from_label(&intent_label),
            intent_label,
            attendees,
            start_time,
            end_time,
            subject: subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            location,
            recurrence_text,
            exception_texts,
        }
    }

    /// Resolve one datetime entity, preferring its structured resolution
    fn resolve_datetime(&self, entity: &RawEntity, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let (expression, type_hint) = match entity.resolution.as_ref().and_then(timex_value) {
            Some((expression, type_hint)) => (expression, type_hint),
            None => (present(&entity.text)?.to_string(), None),
        };
        Some(self.resolver.resolve(&expression, type_hint.as_deref(), now))
    }
}

/// Pull `(timex, type)` out of a provider resolution.
///
/// Accepts `{"values": [{"timex": .., "type": ..}]}`, a bare
/// `{"timex": ..}` object, or a plain string. `value` is used when no
/// `timex` is present.
fn timex_value(resolution: &JsonValue) -> Option<(String, Option<String>)> {
    match resolution {
        JsonValue::String(s) => present(s).map(|s| (s.to_string(), None)),
        JsonValue::Object(map) => {
            let candidate = match map.get("values") {
                Some(JsonValue::Array(values)) => values.first()?,
                _ => resolution,
            };
            let expression = candidate
                .get("timex")
                .or_else(|| candidate.get("value"))
                .and_then(JsonValue::as_str)
                .and_then(present)?;
            let type_hint = candidate
                .get("type")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            Some((expression.to_string(), type_hint))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn datetime(timex: &str) -> RawEntity {
        RawEntity::new("datetimeV2", "").with_resolution(json!({
            "values": [{"timex": timex, "type": "datetime"}]
        }))
    }

    #[test]
    fn test_book_scenario() {
        let raw = vec![
            RawEntity::new("PersonName", "Mary"),
            datetime("2024-01-16T14:00"),
            datetime("2024-01-16T15:00"),
            RawEntity::new("subject", "Meeting with Mary"),
        ];

        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.intent, Intent::Book);
        assert_eq!(entities.intent_label, "BookMeeting");
        assert_eq!(entities.attendees, vec!["Mary"]);
        assert_eq!(entities.start_time, Some(at(16, 14)));
        assert_eq!(entities.end_time, Some(at(16, 15)));
        assert_eq!(entities.subject, "Meeting with Mary");
    }

    #[test]
    fn test_category_mapping_is_case_insensitive() {
        let raw = vec![
            RawEntity::new("ATTENDEE", "Bob"),
            RawEntity::new("person", "alice@example.com"),
            RawEntity::new("MeetingTitle", "Sync"),
            RawEntity::new("LOCATION", "Room 4"),
            RawEntity::new("RecurringPattern", "every weekday"),
            RawEntity::new("Exception", "second tuesday"),
            RawEntity::new("exception", "first monday"),
        ];

        let entities = Normalizer::default().normalize_at("scheduleMeeting", &raw, now());
        assert_eq!(entities.attendees, vec!["Bob", "alice@example.com"]);
        assert_eq!(entities.subject, "Sync");
        assert_eq!(entities.location.as_deref(), Some("Room 4"));
        assert_eq!(entities.recurrence_text.as_deref(), Some("every weekday"));
        assert_eq!(entities.exception_texts, vec!["second tuesday", "first monday"]);
    }

    #[test]
    fn test_unknown_categories_are_dropped() {
        let raw = vec![
            RawEntity::new("Sentiment", "positive"),
            RawEntity::new("attendee", "Bob"),
        ];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.attendees, vec!["Bob"]);
    }

    #[test]
    fn test_subject_defaults() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize_at("BookMeeting", &[], now()).subject, "Meeting");

        for text in ["null", "NULL", "", "   "] {
            let raw = vec![RawEntity::new("title", text)];
            assert_eq!(
                normalizer.normalize_at("BookMeeting", &raw, now()).subject,
                "Meeting",
                "subject {text:?}"
            );
        }
    }

    #[test]
    fn test_literal_null_is_absence() {
        let raw = vec![
            RawEntity::new("location", "null"),
            RawEntity::new("recurrence", "null"),
            RawEntity::new("attendee", "null"),
        ];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert!(entities.location.is_none());
        assert!(entities.recurrence_text.is_none());
        assert!(entities.attendees.is_empty());
    }

    #[test]
    fn test_missing_intent_is_unknown() {
        let entities = Normalizer::default().normalize_at("", &[], now());
        assert_eq!(entities.intent_label, UNKNOWN_INTENT);
        assert_eq!(entities.intent, Intent::Unknown);
    }

    #[test]
    fn test_third_datetime_is_ignored() {
        let raw = vec![
            datetime("2024-01-16T14:00"),
            datetime("2024-01-16T15:00"),
            datetime("2024-01-17T09:00"),
        ];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(16, 14)));
        assert_eq!(entities.end_time, Some(at(16, 15)));
    }

    #[test]
    fn test_end_before_start_is_dropped() {
        let raw = vec![datetime("2024-01-16T15:00"), datetime("2024-01-16T14:00")];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(16, 15)));
        assert!(entities.end_time.is_none());
    }

    #[test]
    fn test_datetime_text_without_resolution() {
        let raw = vec![RawEntity::new("date", "2024-01-20T09:00")];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(20, 9)));
    }

    #[test]
    fn test_relative_datetime_uses_policy() {
        let raw = vec![RawEntity::new("datetime", "tomorrow").with_resolution(json!({
            "values": [{"timex": "XXXX-XX-XXT14:00", "type": "datetime"}]
        }))];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(16, 14)));
    }

    #[test]
    fn test_luis_style_value_resolution() {
        let raw = vec![RawEntity::new("datetimeV2", "").with_resolution(json!({
            "values": [{"value": "2024-01-18 11:00:00", "type": "datetime"}]
        }))];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(18, 11)));
    }

    #[test]
    fn test_empty_datetime_is_not_a_slot() {
        let raw = vec![
            RawEntity::new("datetime", "null"),
            datetime("2024-01-16T14:00"),
        ];
        let entities = Normalizer::default().normalize_at("BookMeeting", &raw, now());
        assert_eq!(entities.start_time, Some(at(16, 14)));
        assert!(entities.end_time.is_none());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let raw = vec![
            RawEntity::new("PersonName", "Mary"),
            datetime("XXXX-WXX-2"),
            RawEntity::new("recurrence", "weekly"),
            RawEntity::new("exception", "second tuesday"),
        ];
        let normalizer = Normalizer::default();
        let first = normalizer.normalize_at("BookMeeting", &raw, now());
        let second = normalizer.normalize_at("BookMeeting", &raw, now());
        assert_eq!(first, second);
    }
}
