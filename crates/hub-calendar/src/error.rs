//! Error types for hub-calendar

use thiserror::Error;

/// hub-calendar error type
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("CalDAV error: {status} - {body}")]
    Caldav { status: u16, body: String },

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("iCalendar parsing error: {0}")]
    Ical(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CalendarError>;

impl From<CalendarError> for hub_core::Error {
    fn from(err: CalendarError) -> Self {
        hub_core::Error::Calendar(err.to_string())
    }
}
