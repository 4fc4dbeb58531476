//! iCalendar (RFC 5545) generation and parsing
//!
//! Only the subset of VEVENT needed for scheduling is handled. Times are
//! written either as floating local times or with a `TZID` parameter when a
//! calendar time zone is configured.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};

use hub_core::{Frequency, RecurrenceRule};

use crate::error::{CalendarError, Result};
use crate::models::{Attendee, CalendarEvent};

const PRODID: &str = "-//schedule-hub//calendar//EN";
const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const MAX_LINE_OCTETS: usize = 75;

fn byday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// `RRULE` value for a compiled rule. `UNTIL` is the last moment of the
/// range end in the same wall-clock time as `DTSTART`, so an occurrence late
/// on the final day is kept whatever the zone's UTC offset.
pub fn rrule_value(rule: &RecurrenceRule) -> String {
    let mut parts = vec![format!(
        "FREQ={}",
        match rule.frequency {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    )];

    if rule.interval > 1 {
        parts.push(format!("INTERVAL={}", rule.interval));
    }

    match rule.frequency {
        Frequency::Weekly if !rule.active_weekdays.is_empty() => {
            let days: Vec<&str> = rule.active_weekdays.iter().map(|d| byday(*d)).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        Frequency::Monthly => {
            parts.push(format!("BYMONTHDAY={}", chrono::Datelike::day(&rule.range_start)));
        }
        _ => {}
    }

    parts.push(format!("UNTIL={}T235959", rule.range_end.format("%Y%m%d")));
    parts.join(";")
}

/// Escape a TEXT value
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn unescape_text(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => result.push('\n'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

/// Fold a content line at 75 octets without splitting a character
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return format!("{}\r\n", line);
    }

    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut current = 0;
    // continuation lines lose one octet to the leading space
    let mut limit = MAX_LINE_OCTETS;
    for (idx, ch) in line.char_indices() {
        if idx + ch.len_utf8() - current > limit {
            folded.push_str(&line[current..idx]);
            folded.push_str("\r\n ");
            current = idx;
            limit = MAX_LINE_OCTETS - 1;
        }
    }
    folded.push_str(&line[current..]);
    folded.push_str("\r\n");
    folded
}

struct Writer<'a> {
    out: String,
    time_zone: Option<&'a str>,
}

impl Writer<'_> {
    fn line(&mut self, line: &str) {
        self.out.push_str(&fold_line(line));
    }

    fn datetime(&mut self, name: &str, value: NaiveDateTime) {
        let line = match self.time_zone {
            Some(tz) => format!("{};TZID={}:{}", name, tz, value.format(DATETIME_FORMAT)),
            None => format!("{}:{}", name, value.format(DATETIME_FORMAT)),
        };
        self.line(&line);
    }

    fn datetimes(&mut self, name: &str, values: &[NaiveDateTime]) {
        let joined: Vec<String> = values
            .iter()
            .map(|v| v.format(DATETIME_FORMAT).to_string())
            .collect();
        let line = match self.time_zone {
            Some(tz) => format!("{};TZID={}:{}", name, tz, joined.join(",")),
            None => format!("{}:{}", name, joined.join(",")),
        };
        self.line(&line);
    }
}

/// Serialize `event` as a VCALENDAR object
pub fn to_ical(event: &CalendarEvent, time_zone: Option<&str>, stamp: DateTime<Utc>) -> String {
    let mut w = Writer {
        out: String::new(),
        time_zone,
    };

    w.line("BEGIN:VCALENDAR");
    w.line("VERSION:2.0");
    w.line(&format!("PRODID:{}", PRODID));
    w.line("CALSCALE:GREGORIAN");
    w.line("BEGIN:VEVENT");
    w.line(&format!("UID:{}", event.uid));
    w.line(&format!("DTSTAMP:{}Z", stamp.format(DATETIME_FORMAT)));
    w.datetime("DTSTART", event.start);
    w.datetime("DTEND", event.end);
    w.line(&format!("SUMMARY:{}", escape_text(&event.summary)));

    if let Some(desc) = &event.description {
        w.line(&format!("DESCRIPTION:{}", escape_text(desc)));
    }
    if let Some(loc) = &event.location {
        w.line(&format!("LOCATION:{}", escape_text(loc)));
    }
    for attendee in &event.attendees {
        w.line(&format!(
            "ATTENDEE;CN=\"{}\";ROLE=REQ-PARTICIPANT;RSVP=TRUE:mailto:{}",
            attendee.name.replace('"', "'"),
            attendee.address
        ));
    }

    if let Some(rrule) = &event.rrule {
        w.line(&format!("RRULE:{}", rrule));
        if !event.exdates.is_empty() {
            w.datetimes("EXDATE", &event.exdates);
        }
    }

    w.line("END:VEVENT");
    w.line("END:VCALENDAR");
    w.out
}

/// Split a content line into name, parameters and value
fn split_property(line: &str) -> Option<(String, Vec<(String, String)>, &str)> {
    // The value starts at the first colon outside a quoted parameter.
    let mut in_quotes = false;
    let colon = line.char_indices().find_map(|(idx, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ':' if !in_quotes => Some(idx),
        _ => None,
    })?;

    let (head, value) = (&line[..colon], &line[colon + 1..]);
    let mut parts = head.split(';');
    let name = parts.next()?.trim().to_uppercase();
    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_uppercase(), v.trim_matches('"').to_string()))
        .collect();
    Some((name, params, value))
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, DATETIME_FORMAT)
            .ok()
            .map(|dt| dt.and_utc().with_timezone(&chrono::Local).naive_local());
    }
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Unfold continuation lines
fn unfold(ical: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ical.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match raw.strip_prefix([' ', '\t']) {
            Some(continuation) if !lines.is_empty() => {
                if let Some(last) = lines.last_mut() {
                    last.push_str(continuation);
                }
            }
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// Parse the first VEVENT of an iCalendar object
pub fn parse_ical(ical: &str) -> Result<CalendarEvent> {
    let mut in_event = false;
    let mut uid = None;
    let mut summary = String::new();
    let mut description = None;
    let mut start = None;
    let mut end = None;
    let mut location = None;
    let mut attendees = Vec::new();
    let mut rrule = None;
    let mut exdates = Vec::new();

    for line in unfold(ical) {
        let line = line.trim_end();
        match line {
            "BEGIN:VEVENT" => {
                in_event = true;
                continue;
            }
            "END:VEVENT" => break,
            _ if !in_event => continue,
            _ => {}
        }

        let Some((name, params, value)) = split_property(line) else {
            continue;
        };

        match name.as_str() {
            "UID" => uid = Some(value.to_string()),
            "SUMMARY" => summary = unescape_text(value),
            "DESCRIPTION" => description = Some(unescape_text(value)),
            "LOCATION" => location = Some(unescape_text(value)),
            "DTSTART" => start = parse_datetime(value),
            "DTEND" => end = parse_datetime(value),
            "RRULE" => rrule = Some(value.to_string()),
            "EXDATE" => exdates.extend(value.split(',').filter_map(parse_datetime)),
            "ATTENDEE" => {
                let address = value
                    .strip_prefix("mailto:")
                    .or_else(|| value.strip_prefix("MAILTO:"))
                    .unwrap_or(value)
                    .to_string();
                let name = params
                    .iter()
                    .find(|(k, _)| k == "CN")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| address.clone());
                attendees.push(Attendee { name, address });
            }
            _ => {}
        }
    }

    let uid = uid.ok_or_else(|| CalendarError::Ical("VEVENT without UID".to_string()))?;
    let start = start.ok_or_else(|| CalendarError::Ical(format!("Event {} has no DTSTART", uid)))?;

    Ok(CalendarEvent {
        uid,
        summary,
        description,
        start,
        end: end.unwrap_or(start),
        location,
        attendees,
        rrule,
        exdates,
    })
}
