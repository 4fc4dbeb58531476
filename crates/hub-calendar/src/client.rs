//! CalDAV client implementation

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, error, info, warn};

use hub_core::{
    Booking, CalendarConfig, CalendarProvider, CanonicalEntities, Clock, EventFilter, EventHandle,
    UserId,
};

use crate::error::{CalendarError, Result};
use crate::ical::{parse_ical, to_ical};
use crate::models::CalendarEvent;

const TIME_RANGE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// One `<response>` of a multistatus body
#[derive(Debug, Default, Clone, PartialEq)]
struct DavResource {
    href: String,
    etag: Option<String>,
    calendar_data: String,
}

/// Event id for a resource href: its file name without `.ics`
fn resource_id(href: &str) -> String {
    let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or(href);
    name.strip_suffix(".ics").unwrap_or(name).to_string()
}

/// CalDAV backed [`CalendarProvider`]
pub struct CalDavClient {
    client: Client,
    config: CalendarConfig,
    base_url: String,
    clock: Clock,
}

impl CalDavClient {
    /// Create a new CalDAV client
    pub fn new(config: CalendarConfig) -> Result<Self> {
        if config.server_url.trim().is_empty() {
            return Err(CalendarError::Configuration(
                "calendar.server_url is not set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::Configuration(e.to_string()))?;

        let base_url = config.server_url.trim_end_matches('/').to_string();
        info!(server = %base_url, "Calendar client initialized");

        Ok(Self {
            client,
            config,
            base_url,
            clock: local_now,
        })
    }

    /// Replace the clock used for default start times
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Collection URL for `user`
    pub fn calendar_url(&self, user: &UserId) -> String {
        let path = self.config.calendar_path.replace("{user}", user.as_str());
        format!("{}/{}", self.base_url, path.trim_matches('/'))
    }

    fn event_url(&self, event_id: &str, user: &UserId) -> String {
        format!("{}/{}.ics", self.calendar_url(user), event_id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        if self.config.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    async fn ensure_success(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "CalDAV {} failed", action);
        Err(CalendarError::Caldav {
            status: status.as_u16(),
            body,
        })
    }

    /// calendar-query body, with a time-range filter when `window` is given
    fn report_body(window: Option<(NaiveDateTime, NaiveDateTime)>) -> String {
        // Event times are local; widen the UTC range by a day and filter exactly afterwards.
        let time_range = window
            .map(|(start, end)| {
                format!(
                    r#"
                <C:time-range start="{}" end="{}"/>"#,
                    (start - Duration::days(1)).format(TIME_RANGE_FORMAT),
                    (end + Duration::days(1)).format(TIME_RANGE_FORMAT)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">{}
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            time_range
        )
    }

    /// Fetch the events of `user` matching `filter`
    pub async fn query_events(
        &self,
        filter: &EventFilter,
        user: &UserId,
    ) -> Result<Vec<(String, CalendarEvent)>> {
        let url = self.calendar_url(user);
        let window = filter.window_start.zip(filter.window_end);
        debug!(url = %url, subject = %filter.subject, ?window, "Querying events");

        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| CalendarError::Configuration(e.to_string()))?;
        let response = self
            .request(report, &url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(Self::report_body(window))
            .send()
            .await?;
        let text = Self::ensure_success(response, "REPORT").await?.text().await?;

        let mut matches = Vec::new();
        for resource in parse_multistatus(&text)? {
            if resource.calendar_data.is_empty() {
                continue;
            }
            let event = match parse_ical(&resource.calendar_data) {
                Ok(event) => event,
                Err(e) => {
                    warn!(href = %resource.href, error = %e, "Skipping unparseable event");
                    continue;
                }
            };
            // The server already expanded recurring series against the range.
            let in_window =
                event.is_recurring() || filter.matches_window(Some(event.start), Some(event.end));
            if filter.matches_subject(&event.summary) && in_window {
                matches.push((resource_id(&resource.href), event));
            }
        }

        info!(count = matches.len(), user = %user.as_str(), "Found matching events");
        Ok(matches)
    }

    /// PUT a new event and return its id
    pub async fn create_event(&self, event: &CalendarEvent, user: &UserId) -> Result<String> {
        let url = self.event_url(&event.uid, user);
        let ical = to_ical(event, self.config.time_zone.as_deref(), Utc::now());
        debug!(url = %url, summary = %event.summary, "Creating event");

        let response = self
            .request(Method::PUT, &url)
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(ical)
            .send()
            .await?;
        Self::ensure_success(response, "PUT").await?;

        info!(event_id = %event.uid, user = %user.as_str(), "Created event");
        Ok(event.uid.clone())
    }

    /// GET an event along with its etag
    pub async fn get_event(
        &self,
        event_id: &str,
        user: &UserId,
    ) -> Result<(CalendarEvent, Option<String>)> {
        let response = self
            .request(Method::GET, &self.event_url(event_id, user))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CalendarError::EventNotFound(event_id.to_string()));
        }
        let response = Self::ensure_success(response, "GET").await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let event = parse_ical(&response.text().await?)?;
        Ok((event, etag))
    }

    pub async fn delete_event(&self, event_id: &str, user: &UserId) -> Result<()> {
        let url = self.event_url(event_id, user);
        debug!(url = %url, "Deleting event");

        let response = self.request(Method::DELETE, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CalendarError::EventNotFound(event_id.to_string()));
        }
        Self::ensure_success(response, "DELETE").await?;

        info!(event_id, user = %user.as_str(), "Deleted event");
        Ok(())
    }

    pub async fn update_event(
        &self,
        event_id: &str,
        entities: &CanonicalEntities,
        user: &UserId,
    ) -> Result<()> {
        let (mut event, etag) = self.get_event(event_id, user).await?;
        event.reschedule(entities, &self.config.attendee_domain);

        let ical = to_ical(&event, self.config.time_zone.as_deref(), Utc::now());
        let mut request = self
            .request(Method::PUT, &self.event_url(event_id, user))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(ical);
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }
        Self::ensure_success(request.send().await?, "PUT").await?;

        info!(event_id, start = %event.start, "Updated event");
        Ok(())
    }
}

#[async_trait]
impl CalendarProvider for CalDavClient {
    async fn create(&self, booking: &Booking, user: &UserId) -> hub_core::Result<String> {
        let event =
            CalendarEvent::from_booking(booking, &self.config.attendee_domain, (self.clock)());
        Ok(self.create_event(&event, user).await?)
    }

    async fn find(&self, filter: &EventFilter, user: &UserId) -> hub_core::Result<Vec<EventHandle>> {
        let events = self.query_events(filter, user).await?;
        Ok(events
            .into_iter()
            .map(|(id, event)| EventHandle {
                id,
                subject: event.summary,
                start: Some(event.start),
                end: Some(event.end),
            })
            .collect())
    }

    async fn delete(&self, event_id: &str, user: &UserId) -> hub_core::Result<()> {
        Ok(self.delete_event(event_id, user).await?)
    }

    async fn update(
        &self,
        event_id: &str,
        entities: &CanonicalEntities,
        user: &UserId,
    ) -> hub_core::Result<()> {
        Ok(self.update_event(event_id, entities, user).await?)
    }
}

/// Collect href, etag and calendar data per `<response>`
fn parse_multistatus(body: &str) -> Result<Vec<DavResource>> {
    #[derive(PartialEq)]
    enum Field {
        None,
        Href,
        Etag,
        CalendarData,
    }

    let mut resources = Vec::new();
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavResource::default()),
                b"href" => field = Field::Href,
                b"getetag" => field = Field::Etag,
                b"calendar-data" => field = Field::CalendarData,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(resource) = current.take() {
                        resources.push(resource);
                    }
                }
                b"href" | b"getetag" | b"calendar-data" => field = Field::None,
                _ => {}
            },
            Ok(Event::Text(ref e)) if field != Field::None => {
                let text = e
                    .unescape()
                    .map_err(|e| CalendarError::XmlParse(e.to_string()))?;
                push_field(current.as_mut(), &field, &text);
            }
            Ok(Event::CData(e)) if field != Field::None => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_field(current.as_mut(), &field, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CalendarError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    fn push_field(resource: Option<&mut DavResource>, field: &Field, text: &str) {
        let Some(resource) = resource else {
            return;
        };
        match field {
            Field::Href => resource.href.push_str(text.trim()),
            Field::Etag => resource
                .etag
                .get_or_insert_with(String::new)
                .push_str(text.trim()),
            Field::CalendarData => resource.calendar_data.push_str(text),
            Field::None => {}
        }
    }

    Ok(resources)
}
