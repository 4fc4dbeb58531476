//! Data models for calendar integration

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use hub_core::{Booking, CanonicalEntities, DEFAULT_START_OFFSET_HOURS, expand};

/// Meeting participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Display name
    pub name: String,
    /// E-mail address
    pub address: String,
}

impl Attendee {
    /// Build an attendee from what the user typed.
    ///
    /// E-mail addresses are used as-is, named after their local part. Plain
    /// names become `first.last@<domain>`.
    pub fn from_input(input: &str, domain: &str) -> Self {
        let input = input.trim();
        match input.split_once('@') {
            Some((local, _)) => Self {
                name: capitalize(local),
                address: input.to_string(),
            },
            None => Self {
                name: input.to_string(),
                address: format!(
                    "{}@{}",
                    input
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(".")
                        .to_lowercase(),
                    domain
                ),
            },
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Event unique identifier
    pub uid: String,
    /// Event summary/title
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Wall-clock start in the calendar's time zone
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Recurrence rule value (without the `RRULE:` prefix)
    #[serde(default)]
    pub rrule: Option<String>,
    /// Skipped instances of the series
    #[serde(default)]
    pub exdates: Vec<NaiveDateTime>,
}

impl CalendarEvent {
    /// Create a new single event with a fresh uid
    pub fn new(summary: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            summary: summary.into(),
            description: None,
            start,
            end,
            location: None,
            attendees: Vec::new(),
            rrule: None,
            exdates: Vec::new(),
        }
    }

    /// Event for a booking. Missing times default to an hour from `now`
    /// lasting one hour.
    pub fn from_booking(booking: &Booking, attendee_domain: &str, now: NaiveDateTime) -> Self {
        let entities = &booking.entities;
        let mut start = entities
            .start_time
            .unwrap_or(now + Duration::hours(DEFAULT_START_OFFSET_HOURS));
        let mut end = entities.end_time.unwrap_or(start + Duration::hours(1));

        // DTSTART is itself an instance, so it must be the first generated occurrence
        if let Some(first) = booking
            .recurrence
            .as_ref()
            .and_then(|rule| expand(rule).first().copied())
        {
            let duration = end - start;
            start = first.date.and_time(start.time());
            end = start + duration;
        }

        let mut event = Self::new(&entities.subject, start, end);
        event.description = Some("Meeting created via Schedule Hub".to_string());
        event.location = entities.location.clone();
        event.attendees = entities
            .attendees
            .iter()
            .map(|a| Attendee::from_input(a, attendee_domain))
            .collect();

        if let Some(rule) = &booking.recurrence {
            event.rrule = Some(crate::ical::rrule_value(rule));
            event.exdates = booking
                .exclusions
                .iter()
                .map(|occurrence| occurrence.date.and_time(start.time()))
                .collect();
        }
        event
    }

    /// Move the event to the times, attendees and location in `entities`.
    ///
    /// A new start without an end keeps the event's duration. Empty attendee
    /// lists and absent locations leave the current values alone.
    pub fn reschedule(&mut self, entities: &CanonicalEntities, attendee_domain: &str) {
        if let Some(start) = entities.start_time {
            let duration = self.end - self.start;
            self.start = start;
            self.end = entities.end_time.unwrap_or(start + duration);
        } else if let Some(end) = entities.end_time.filter(|end| *end > self.start) {
            self.end = end;
        }

        if !entities.attendees.is_empty() {
            self.attendees = entities
                .attendees
                .iter()
                .map(|a| Attendee::from_input(a, attendee_domain))
                .collect();
        }
        if let Some(location) = &entities.location {
            self.location = Some(location.clone());
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }
}
