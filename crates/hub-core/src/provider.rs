//! Collaborator interfaces
//!
//! The scheduling core talks to the outside world through two traits: an
//! [`NluProvider`] that turns text into an intent plus raw entities, and a
//! [`CalendarProvider`] that persists events for a user.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::exceptions::Occurrence;
use crate::model::{CanonicalEntities, PROVIDER_ERROR_INTENT, RawEntity, UNKNOWN_INTENT, UserId};
use crate::recurrence::RecurrenceRule;

/// What an NLU provider extracted from one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NluResult {
    /// Top intent label as the provider named it
    pub intent: String,
    pub entities: Vec<RawEntity>,
}

impl NluResult {
    pub fn new(intent: impl Into<String>, entities: Vec<RawEntity>) -> Self {
        Self {
            intent: intent.into(),
            entities,
        }
    }

    /// The provider call failed
    pub fn provider_error() -> Self {
        Self::new(PROVIDER_ERROR_INTENT, Vec::new())
    }

    /// The provider answered but named no intent
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_INTENT, Vec::new())
    }
}

/// Natural-language understanding backend.
///
/// Implementations never fail: transport and decoding errors are logged and
/// reported as [`NluResult::provider_error`].
#[async_trait]
pub trait NluProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> NluResult;
}

/// Everything a calendar needs to create one (possibly recurring) event
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub entities: CanonicalEntities,
    pub recurrence: Option<RecurrenceRule>,
    /// Instances of `recurrence` to skip, in date order
    pub exclusions: Vec<Occurrence>,
}

impl Booking {
    pub fn single(entities: CanonicalEntities) -> Self {
        Self {
            entities,
            recurrence: None,
            exclusions: Vec::new(),
        }
    }
}

/// Criteria for locating existing events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub subject: String,
    pub window_start: Option<NaiveDateTime>,
    pub window_end: Option<NaiveDateTime>,
}

impl EventFilter {
    pub fn by_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    /// Case-insensitive substring match on the subject
    pub fn matches_subject(&self, subject: &str) -> bool {
        subject
            .to_lowercase()
            .contains(&self.subject.to_lowercase())
    }

    /// Whether an event spanning `start..end` overlaps the window, if any
    pub fn matches_window(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> bool {
        let (Some(window_start), Some(window_end)) = (self.window_start, self.window_end) else {
            return true;
        };
        let Some(start) = start else {
            return false;
        };
        let end = end.unwrap_or(start);
        start < window_end && (end > window_start || start >= window_start)
    }
}

/// Reference to an existing calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandle {
    pub id: String,
    pub subject: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Calendar backend acting on behalf of a user
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Create the event and return its id
    async fn create(&self, booking: &Booking, user: &UserId) -> Result<String>;

    async fn find(&self, filter: &EventFilter, user: &UserId) -> Result<Vec<EventHandle>>;

    async fn delete(&self, event_id: &str, user: &UserId) -> Result<()>;

    /// Apply the times, attendees and location from `entities` to an event
    async fn update(&self, event_id: &str, entities: &CanonicalEntities, user: &UserId)
    -> Result<()>;
}
