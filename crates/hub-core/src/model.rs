//! Request-scoped data model
//!
//! Everything here is created and dropped within a single scheduling request.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Intent label used when the provider returned no usable intent
pub const UNKNOWN_INTENT: &str = "Unknown";

/// Intent label reported by an NLU provider whose call failed
pub const PROVIDER_ERROR_INTENT: &str = "provider_error";

/// Subject used when the request names none
pub const DEFAULT_SUBJECT: &str = "Meeting";

/// Entity as produced by an NLU provider, reduced to a provider-agnostic shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Provider category name ("PersonName", "datetimeV2", ...)
    pub category: String,
    /// Surface text the provider matched
    pub text: String,
    /// Structured resolution (timex values etc.), if the provider gave one
    #[serde(default)]
    pub resolution: Option<serde_json::Value>,
}

impl RawEntity {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: serde_json::Value) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// Classified scheduling intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Book,
    Cancel,
    Reschedule,
    /// Could not classify; a terminal state, not an error
    Unknown,
}

impl Intent {
    /// Classify a provider label. Case-insensitive and synonym-tolerant.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "bookmeeting" | "schedulemeeting" => Self::Book,
            "cancelmeeting" | "deletemeeting" => Self::Cancel,
            "reschedulemeeting" | "updatemeeting" => Self::Reschedule,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Book => "Book",
            Self::Cancel => "Cancel",
            Self::Reschedule => "Reschedule",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Unified, provider-agnostic representation of a parsed scheduling request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEntities {
    pub intent: Intent,
    /// Top intent label exactly as the provider returned it
    pub intent_label: String,
    pub attendees: Vec<String>,
    pub start_time: Option<NaiveDateTime>,
    /// Always after `start_time` when both are present
    pub end_time: Option<NaiveDateTime>,
    /// Never empty
    pub subject: String,
    pub location: Option<String>,
    pub recurrence_text: Option<String>,
    pub exception_texts: Vec<String>,
}

impl CanonicalEntities {
    /// Entities for a request that carried nothing but an intent label
    pub fn empty(intent_label: impl Into<String>) -> Self {
        let intent_label = intent_label.into();
        Self {
            intent: Intent::from_label(&intent_label),
            intent_label,
            attendees: Vec::new(),
            start_time: None,
            end_time: None,
            subject: DEFAULT_SUBJECT.to_string(),
            location: None,
            recurrence_text: None,
            exception_texts: Vec::new(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_text.is_some()
    }

    /// Whether the provider call failed rather than returning an unknown intent
    pub fn is_provider_error(&self) -> bool {
        self.intent_label.eq_ignore_ascii_case(PROVIDER_ERROR_INTENT)
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

static OBJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid object id regex")
});

/// Calendar owner on whose behalf a request is executed.
///
/// Either an e-mail address or a directory object id (GUID). The core never
/// resolves a "current user" itself, so `"me"` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Validation(
                "User ID is required (e-mail address or object ID)".to_string(),
            ));
        }
        if raw.eq_ignore_ascii_case("me") {
            return Err(Error::Validation(
                "User ID 'me' is not supported; provide an e-mail address or object ID".to_string(),
            ));
        }
        if !EMAIL_RE.is_match(raw) && !OBJECT_ID_RE.is_match(raw) {
            return Err(Error::Validation(format!(
                "Invalid user ID format: '{}'. Expected an e-mail address or a GUID object ID",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome status of a scheduling request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response returned upward to the caller.
///
/// Built in one pass by one of the constructors below; absent fields are
/// omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exceptions: Option<Vec<String>>,
}

impl ScheduleResponse {
    /// Error response carrying only a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            event_id: None,
            subject: None,
            start_time: None,
            end_time: None,
            attendees: None,
            recurrence_pattern: None,
            exceptions: None,
        }
    }

    /// A meeting was created
    pub fn booked(event_id: impl Into<String>, entities: &CanonicalEntities) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: "Meeting scheduled successfully".to_string(),
            event_id: Some(event_id.into()),
            subject: Some(entities.subject.clone()),
            start_time: entities.start_time,
            end_time: entities.end_time,
            attendees: Some(entities.attendees.clone()),
            recurrence_pattern: entities.recurrence_text.clone(),
            exceptions: (!entities.exception_texts.is_empty())
                .then(|| entities.exception_texts.clone()),
        }
    }

    /// An existing meeting was deleted
    pub fn cancelled(event_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: "Meeting cancelled successfully".to_string(),
            event_id: Some(event_id.into()),
            subject: Some(subject.into()),
            ..Self::error(String::new())
        }
    }

    /// An existing meeting was moved
    pub fn rescheduled(
        event_id: impl Into<String>,
        subject: impl Into<String>,
        entities: &CanonicalEntities,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: "Meeting rescheduled successfully".to_string(),
            event_id: Some(event_id.into()),
            subject: Some(subject.into()),
            start_time: entities.start_time,
            end_time: entities.end_time,
            attendees: (!entities.attendees.is_empty()).then(|| entities.attendees.clone()),
            ..Self::error(String::new())
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
