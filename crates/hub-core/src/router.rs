//! Intent routing
//!
//! [`ScheduleService`] runs one request end to end: NLU extraction,
//! normalization, and dispatch of the classified intent to the calendar.
//! Collaborator failures never escape; they become error responses.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::exceptions::resolve_exclusions;
use crate::model::{CanonicalEntities, Intent, ScheduleResponse, UserId};
use crate::normalizer::Normalizer;
use crate::provider::{Booking, CalendarProvider, EventFilter, NluProvider};
use crate::recurrence::RecurrenceCompiler;

/// Hours from now at which an unscheduled meeting starts
pub const DEFAULT_START_OFFSET_HOURS: i64 = 1;

/// Source of "now" for relative date resolution
pub type Clock = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Scheduling pipeline bound to one NLU and one calendar provider
pub struct ScheduleService {
    nlu: Arc<dyn NluProvider>,
    calendar: Arc<dyn CalendarProvider>,
    normalizer: Normalizer,
    compiler: RecurrenceCompiler,
    clock: Clock,
}

impl ScheduleService {
    pub fn new(nlu: Arc<dyn NluProvider>, calendar: Arc<dyn CalendarProvider>) -> Self {
        Self {
            nlu,
            calendar,
            normalizer: Normalizer::default(),
            compiler: RecurrenceCompiler::default(),
            clock: local_now,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_compiler(mut self, compiler: RecurrenceCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Process one natural-language request for `user`
    pub async fn process(&self, text: &str, user: &UserId) -> ScheduleResponse {
        info!(user = %user, nlu = self.nlu.name(), "Processing schedule request");

        let extracted = self.nlu.extract(text).await;
        let entities =
            self.normalizer
                .normalize_at(&extracted.intent, &extracted.entities, (self.clock)());
        debug!(?entities, "Normalized entities");

        let response = self.dispatch(&entities, user).await;
        info!(
            status = ?response.status,
            message = %response.message,
            "Schedule request complete"
        );
        response
    }

    /// Route already-normalized entities to the matching calendar operation
    pub async fn dispatch(&self, entities: &CanonicalEntities, user: &UserId) -> ScheduleResponse {
        info!(intent = %entities.intent, label = %entities.intent_label, "Routing request");
        match entities.intent {
            Intent::Book => self.book(entities, user).await,
            Intent::Cancel => self.cancel(entities, user).await,
            Intent::Reschedule => self.reschedule(entities, user).await,
            Intent::Unknown if entities.is_provider_error() => {
                error!("NLU provider failed; cannot extract intent or entities");
                ScheduleResponse::error(
                    "NLU provider error. Check the provider configuration and credentials; see logs for details.",
                )
            }
            Intent::Unknown => {
                warn!(label = %entities.intent_label, "Could not understand request");
                ScheduleResponse::error(format!(
                    "Could not understand the request (intent: {}). Try rephrasing your request.",
                    entities.intent_label
                ))
            }
        }
    }

    async fn book(&self, entities: &CanonicalEntities, user: &UserId) -> ScheduleResponse {
        let booking = self.booking_for(entities);
        match self.calendar.create(&booking, user).await {
            Ok(event_id) => {
                info!(event_id = %event_id, subject = %entities.subject, "Meeting booked");
                ScheduleResponse::booked(event_id, entities)
            }
            Err(e) => {
                error!(error = %e, "Failed to book meeting");
                ScheduleResponse::error(format!("Failed to schedule meeting: {}", e))
            }
        }
    }

    fn booking_for(&self, entities: &CanonicalEntities) -> Booking {
        let Some(text) = entities.recurrence_text.as_deref() else {
            if !entities.exception_texts.is_empty() {
                warn!(
                    exceptions = ?entities.exception_texts,
                    "Exceptions given without a recurrence, ignoring"
                );
            }
            return Booking::single(entities.clone());
        };

        // Without a start the series begins where the calendar's default start lands
        let anchor = entities
            .start_time
            .unwrap_or_else(|| (self.clock)() + Duration::hours(DEFAULT_START_OFFSET_HOURS));
        let rule = self.compiler.compile_from(text, anchor.date());
        let exclusions = resolve_exclusions(&rule, &entities.exception_texts);
        Booking {
            entities: entities.clone(),
            recurrence: Some(rule),
            exclusions,
        }
    }

    async fn cancel(&self, entities: &CanonicalEntities, user: &UserId) -> ScheduleResponse {
        let mut filter = EventFilter::by_subject(&entities.subject);
        if let (Some(start), Some(end)) = (entities.start_time, entities.end_time) {
            filter = filter.with_window(start, end);
        }

        let result = async {
            let found = self.calendar.find(&filter, user).await?;
            debug!(matches = found.len(), "Using first matching event");
            let Some(event) = found.into_iter().next() else {
                return Ok(None);
            };
            self.calendar.delete(&event.id, user).await?;
            Ok::<_, crate::Error>(Some(event))
        }
        .await;

        match result {
            Ok(Some(event)) => {
                info!(event_id = %event.id, "Meeting cancelled");
                ScheduleResponse::cancelled(event.id, event.subject)
            }
            Ok(None) => {
                warn!(subject = %entities.subject, "No matching events found to cancel");
                ScheduleResponse::error("No matching event found to cancel")
            }
            Err(e) => {
                error!(error = %e, "Failed to cancel meeting");
                ScheduleResponse::error(format!("Failed to cancel meeting: {}", e))
            }
        }
    }

    async fn reschedule(&self, entities: &CanonicalEntities, user: &UserId) -> ScheduleResponse {
        let filter = EventFilter::by_subject(&entities.subject);

        let result = async {
            let found = self.calendar.find(&filter, user).await?;
            debug!(matches = found.len(), "Using first matching event");
            let Some(event) = found.into_iter().next() else {
                return Ok(None);
            };
            self.calendar.update(&event.id, entities, user).await?;
            Ok::<_, crate::Error>(Some(event))
        }
        .await;

        match result {
            Ok(Some(event)) => {
                info!(event_id = %event.id, "Meeting rescheduled");
                ScheduleResponse::rescheduled(event.id, event.subject, entities)
            }
            Ok(None) => {
                warn!(subject = %entities.subject, "No matching events found to reschedule");
                ScheduleResponse::error("No matching event found to reschedule")
            }
            Err(e) => {
                error!(error = %e, "Failed to reschedule meeting");
                ScheduleResponse::error(format!("Failed to reschedule meeting: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::model::{RawEntity, ResponseStatus};
    use crate::provider::{EventHandle, NluResult};
    use crate::recurrence::Frequency;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    struct FakeNlu(NluResult);

    #[async_trait]
    impl NluProvider for FakeNlu {
        fn name(&self) -> &str {
            "fake"
        }

        async fn extract(&self, _text: &str) -> NluResult {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct FakeCalendar {
        events: Vec<EventHandle>,
        fail: bool,
        created: Mutex<Vec<Booking>>,
        filters: Mutex<Vec<EventFilter>>,
        deleted: Mutex<Vec<String>>,
        updated: Mutex<Vec<(String, CanonicalEntities)>>,
    }

    impl FakeCalendar {
        fn with_events(events: Vec<EventHandle>) -> Self {
            Self {
                events,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn check(&self) -> Result<()> {
            if self.fail {
                Err(Error::Calendar("calendar unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeCalendar {
        async fn create(&self, booking: &Booking, _user: &UserId) -> Result<String> {
            self.check()?;
            self.created.lock().unwrap().push(booking.clone());
            Ok("evt-new".to_string())
        }

        async fn find(&self, filter: &EventFilter, _user: &UserId) -> Result<Vec<EventHandle>> {
            self.check()?;
            self.filters.lock().unwrap().push(filter.clone());
            Ok(self
                .events
                .iter()
                .filter(|e| filter.matches_subject(&e.subject))
                .cloned()
                .collect())
        }

        async fn delete(&self, event_id: &str, _user: &UserId) -> Result<()> {
            self.check()?;
            self.deleted.lock().unwrap().push(event_id.to_string());
            Ok(())
        }

        async fn update(
            &self,
            event_id: &str,
            entities: &CanonicalEntities,
            _user: &UserId,
        ) -> Result<()> {
            self.check()?;
            self.updated
                .lock()
                .unwrap()
                .push((event_id.to_string(), entities.clone()));
            Ok(())
        }
    }

    fn service(nlu: NluResult, calendar: Arc<FakeCalendar>) -> ScheduleService {
        ScheduleService::new(Arc::new(FakeNlu(nlu)), calendar).with_clock(fixed_now)
    }

    fn user() -> UserId {
        UserId::parse("organizer@contoso.com").unwrap()
    }

    fn handle(id: &str, subject: &str) -> EventHandle {
        EventHandle {
            id: id.to_string(),
            subject: subject.to_string(),
            start: Some(at(1, 16, 14)),
            end: Some(at(1, 16, 15)),
        }
    }

    #[tokio::test]
    async fn test_book_meeting_scenario() {
        let calendar = Arc::new(FakeCalendar::default());
        let nlu = NluResult::new(
            "BookMeeting",
            vec![
                RawEntity::new("PersonName", "Mary"),
                RawEntity::new("DateTime", "2024-01-16T14:00"),
                RawEntity::new("DateTime", "2024-01-16T15:00"),
                RawEntity::new("Subject", "Meeting with Mary"),
            ],
        );

        let response = service(nlu, calendar.clone())
            .process("Book a meeting with Mary tomorrow at 2pm", &user())
            .await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.message, "Meeting scheduled successfully");
        assert_eq!(response.event_id.as_deref(), Some("evt-new"));
        assert_eq!(response.attendees, Some(vec!["Mary".to_string()]));

        let created = calendar.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let booking = &created[0];
        assert_eq!(booking.entities.attendees, vec!["Mary".to_string()]);
        assert_eq!(booking.entities.start_time, Some(at(1, 16, 14)));
        assert_eq!(booking.entities.end_time, Some(at(1, 16, 15)));
        assert_eq!(booking.entities.subject, "Meeting with Mary");
        assert!(booking.recurrence.is_none());
    }

    #[tokio::test]
    async fn test_book_recurring_with_exceptions() {
        let calendar = Arc::new(FakeCalendar::default());
        let nlu = NluResult::new(
            "scheduleMeeting",
            vec![
                RawEntity::new("DateTime", "2024-01-01T10:00"),
                RawEntity::new("RecurrencePattern", "every weekday"),
                RawEntity::new("Exception", "every second Tuesday"),
            ],
        );

        let response = service(nlu, calendar.clone()).process("standup", &user()).await;
        assert!(response.is_success());
        assert_eq!(response.recurrence_pattern.as_deref(), Some("every weekday"));
        assert_eq!(response.exceptions, Some(vec!["every second Tuesday".to_string()]));

        let created = calendar.created.lock().unwrap();
        let booking = &created[0];
        let rule = booking.recurrence.as_ref().unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.range_end, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(booking.exclusions.len(), 6);
        assert_eq!(
            booking.exclusions[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
    }

    #[tokio::test]
    async fn test_recurrence_without_start_anchors_on_clock() {
        fn late_evening() -> NaiveDateTime {
            at(1, 1, 23) + chrono::Duration::minutes(30)
        }

        let calendar = Arc::new(FakeCalendar::default());
        let nlu = NluResult::new(
            "BookMeeting",
            vec![RawEntity::new("RecurrencePattern", "daily")],
        );
        ScheduleService::new(Arc::new(FakeNlu(nlu)), calendar.clone())
            .with_clock(late_evening)
            .process("daily sync", &user())
            .await;

        let created = calendar.created.lock().unwrap();
        let rule = created[0].recurrence.as_ref().unwrap();
        assert_eq!(rule.range_start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rule.range_end, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
    }

    #[tokio::test]
    async fn test_exceptions_without_recurrence_are_ignored() {
        let calendar = Arc::new(FakeCalendar::default());
        let nlu = NluResult::new(
            "BookMeeting",
            vec![RawEntity::new("Exception", "second tuesday")],
        );
        service(nlu, calendar.clone()).process("x", &user()).await;

        let created = calendar.created.lock().unwrap();
        assert!(created[0].recurrence.is_none());
        assert!(created[0].exclusions.is_empty());
    }

    #[tokio::test]
    async fn test_intent_synonyms_route_to_book() {
        for label in ["scheduleMeeting", "SCHEDULEMEETING", "bookmeeting"] {
            let calendar = Arc::new(FakeCalendar::default());
            let response = service(NluResult::new(label, Vec::new()), calendar.clone())
                .process("x", &user())
                .await;
            assert!(response.is_success(), "label {label}");
            assert_eq!(calendar.created.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_cancel_with_zero_matches() {
        let calendar = Arc::new(FakeCalendar::with_events(vec![handle("evt-1", "Retro")]));
        let nlu = NluResult::new("CancelMeeting", vec![RawEntity::new("Subject", "Standup")]);

        let response = service(nlu, calendar.clone()).process("cancel", &user()).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.contains("No matching event"));
        assert!(calendar.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_deletes_first_match_within_window() {
        let calendar = Arc::new(FakeCalendar::with_events(vec![
            handle("evt-1", "Weekly Standup"),
            handle("evt-2", "Standup follow-up"),
        ]));
        let nlu = NluResult::new(
            "deleteMeeting",
            vec![
                RawEntity::new("Subject", "standup"),
                RawEntity::new("DateTime", "2024-01-16T14:00"),
                RawEntity::new("DateTime", "2024-01-16T15:00"),
            ],
        );

        let response = service(nlu, calendar.clone()).process("cancel", &user()).await;
        assert!(response.is_success());
        assert_eq!(response.message, "Meeting cancelled successfully");
        assert_eq!(response.event_id.as_deref(), Some("evt-1"));
        assert_eq!(*calendar.deleted.lock().unwrap(), vec!["evt-1".to_string()]);

        let filters = calendar.filters.lock().unwrap();
        assert_eq!(filters[0].window_start, Some(at(1, 16, 14)));
        assert_eq!(filters[0].window_end, Some(at(1, 16, 15)));
    }

    #[tokio::test]
    async fn test_cancel_without_both_times_has_no_window() {
        let calendar = Arc::new(FakeCalendar::with_events(vec![handle("evt-1", "Standup")]));
        let nlu = NluResult::new(
            "CancelMeeting",
            vec![
                RawEntity::new("Subject", "Standup"),
                RawEntity::new("DateTime", "2024-01-16T14:00"),
            ],
        );
        service(nlu, calendar.clone()).process("cancel", &user()).await;

        let filters = calendar.filters.lock().unwrap();
        assert!(filters[0].window_start.is_none());
        assert!(filters[0].window_end.is_none());
    }

    #[tokio::test]
    async fn test_reschedule_updates_first_match() {
        let calendar = Arc::new(FakeCalendar::with_events(vec![handle("evt-7", "Sync")]));
        let nlu = NluResult::new(
            "UpdateMeeting",
            vec![
                RawEntity::new("Subject", "sync"),
                RawEntity::new("DateTime", "2024-01-18T10:00"),
            ],
        );

        let response = service(nlu, calendar.clone()).process("move", &user()).await;
        assert!(response.is_success());
        assert_eq!(response.message, "Meeting rescheduled successfully");
        assert_eq!(response.start_time, Some(at(1, 18, 10)));

        let updated = calendar.updated.lock().unwrap();
        assert_eq!(updated[0].0, "evt-7");
        assert!(calendar.filters.lock().unwrap()[0].window_start.is_none());
    }

    #[tokio::test]
    async fn test_reschedule_with_zero_matches() {
        let calendar = Arc::new(FakeCalendar::default());
        let nlu = NluResult::new("RescheduleMeeting", Vec::new());
        let response = service(nlu, calendar).process("move", &user()).await;
        assert_eq!(response.message, "No matching event found to reschedule");
    }

    #[tokio::test]
    async fn test_provider_error_and_unknown_are_distinct() {
        let calendar = Arc::new(FakeCalendar::default());
        let provider_error = service(NluResult::provider_error(), calendar.clone())
            .process("x", &user())
            .await;
        let unknown = service(NluResult::new("OrderPizza", Vec::new()), calendar.clone())
            .process("x", &user())
            .await;

        assert_eq!(provider_error.status, ResponseStatus::Error);
        assert_eq!(unknown.status, ResponseStatus::Error);
        assert!(provider_error.message.contains("NLU provider error"));
        assert!(unknown.message.contains("OrderPizza"));
        assert!(calendar.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_calendar_failure_becomes_error_response() {
        let calendar = Arc::new(FakeCalendar::failing());

        let book = service(NluResult::new("BookMeeting", Vec::new()), calendar.clone())
            .process("x", &user())
            .await;
        assert!(book.message.starts_with("Failed to schedule meeting:"));
        assert!(book.message.contains("calendar unavailable"));

        let cancel = service(NluResult::new("CancelMeeting", Vec::new()), calendar.clone())
            .process("x", &user())
            .await;
        assert!(cancel.message.starts_with("Failed to cancel meeting:"));

        let reschedule = service(NluResult::new("RescheduleMeeting", Vec::new()), calendar)
            .process("x", &user())
            .await;
        assert!(reschedule.message.starts_with("Failed to reschedule meeting:"));
    }
}
