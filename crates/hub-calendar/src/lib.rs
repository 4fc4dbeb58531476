//! hub-calendar: CalDAV calendar backend for schedule-hub
//!
//! Creates, finds, reschedules and deletes VEVENTs in a per-user CalDAV
//! collection. Recurring bookings are written as a single series with
//! `RRULE` and `EXDATE` properties.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_calendar::CalDavClient;
//! use hub_core::{CalendarConfig, CalendarProvider, EventFilter, UserId};
//!
//! let client = CalDavClient::new(CalendarConfig {
//!     server_url: "https://caldav.example.com".to_string(),
//!     ..Default::default()
//! })?;
//! let user = UserId::parse("alice@example.com")?;
//! let events = client.find(&EventFilter::by_subject("standup"), &user).await?;
//! ```

pub mod client;
pub mod error;
pub mod ical;
pub mod models;

pub use client::CalDavClient;
pub use error::{CalendarError, Result};
pub use ical::{parse_ical, rrule_value, to_ical};
pub use models::{Attendee, CalendarEvent};
