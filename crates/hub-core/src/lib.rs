//! hub-core: schedule-hub core library
//!
//! Turns natural-language scheduling requests into calendar operations:
//! date/time resolution, entity normalization, recurrence compilation,
//! exception resolution and intent routing. NLU and calendar backends are
//! reached through the traits in [`provider`].

pub mod config;
pub mod error;
pub mod exceptions;
pub mod model;
pub mod normalizer;
pub mod provider;
pub mod recurrence;
pub mod router;
pub mod timex;

pub use config::{ApiConfig, CalendarConfig, Config, NluConfig, NluProviderKind, ResolverConfig};
pub use error::{Error, Result};
pub use exceptions::{ExceptionRule, Occurrence, Ordinal, expand, resolve_exclusions};
pub use model::{CanonicalEntities, Intent, RawEntity, ResponseStatus, ScheduleResponse, UserId};
pub use normalizer::Normalizer;
pub use provider::{Booking, CalendarProvider, EventFilter, EventHandle, NluProvider, NluResult};
pub use recurrence::{Frequency, RecurrenceCompiler, RecurrenceRule};
pub use router::{Clock, DEFAULT_START_OFFSET_HOURS, ScheduleService};
pub use timex::{RelativeDatePolicy, TimexResolver};
