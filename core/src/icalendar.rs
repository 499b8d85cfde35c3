//! iCalendar codec: splits a `VCALENDAR` document into `VEVENT` blocks,
//! extracts the handful of properties the sync engine cares about, and
//! reassembles events back into a single publishable calendar (spec §4.2).

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::{CalEvent, EventTimestamp};

const PRODID: &str = "-//caldav-ics-sync//EN";

/// Unfolds RFC 5545 §3.1 line continuations: a CRLF or LF followed by a
/// single space or tab joins to the previous logical line.
fn unfold_lines(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(normalized.len());
    for line in normalized.split('\n') {
        if (line.starts_with(' ') || line.starts_with('\t')) && !out.is_empty() {
            out.push_str(&line[1..]);
        } else {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
    }
    out
}

/// Strips trailing CR/LF runs and collapses `\r\n`/`\n` to a single `\n`
/// form for stable byte comparison (spec §4.2 canonicalization).
pub fn canonicalize(body: &str) -> String {
    body.replace("\r\n", "\n").trim_end_matches('\n').to_string()
}

/// Lines whose values change every time a server re-saves an otherwise
/// identical event; excluded from the update-detection equality check so a
/// bump of one of these alone does not trigger a spurious re-push (spec
/// §4.3 supplement). The stored/republished `raw_body` is never touched by
/// this — only the comparison the differ makes uses it.
const VOLATILE_PROPERTIES: &[&str] = &["DTSTAMP", "SEQUENCE", "LAST-MODIFIED", "CREATED"];

/// Canonicalizes `body` for the differ's equality check: unfolds
/// continuation lines, drops any line whose property name is in
/// [`VOLATILE_PROPERTIES`], then applies [`canonicalize`].
pub fn canonicalize_for_diff(body: &str) -> String {
    let unfolded = unfold_lines(body);
    let filtered: String = unfolded
        .lines()
        .filter(|line| {
            let trimmed = line.trim_end_matches('\r');
            let name = trimmed.split_once(':').map(|(n, _)| n).unwrap_or(trimmed);
            let name = name.split(';').next().unwrap_or(name).to_ascii_uppercase();
            !VOLATILE_PROPERTIES.contains(&name.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n");
    canonicalize(&filtered)
}

/// Splits an ICS document into its parsed `VEVENT` blocks.
///
/// Events missing a `UID` are dropped; the caller is expected to log a
/// warning per spec §4.2 ("skip with a warning logged into the cycle error
/// list") — this function only returns the clean list.
pub fn split_events(document: &str) -> Vec<CalEvent> {
    let unfolded = unfold_lines(document);
    let mut events = Vec::new();
    let mut lines = unfolded.lines().peekable();
    let mut current: Option<Vec<&str>> = None;

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end_matches('\r');
        if trimmed.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(vec![trimmed]);
        } else if trimmed.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(mut block) = current.take() {
                block.push(trimmed);
                if let Some(event) = parse_event_block(&block) {
                    events.push(event);
                }
            }
        } else if let Some(block) = current.as_mut() {
            block.push(trimmed);
        }
    }

    events
}

fn parse_event_block(lines: &[&str]) -> Option<CalEvent> {
    let mut uid: Option<String> = None;
    let mut dtstart: Option<EventTimestamp> = None;
    let mut dtend_or_duration: Option<String> = None;
    let mut last_modified: Option<EventTimestamp> = None;

    for line in lines {
        let Some((name_params, value)) = line.split_once(':') else {
            continue;
        };
        let name = name_params.split(';').next().unwrap_or(name_params).to_ascii_uppercase();
        match name.as_str() {
            "UID" => uid = Some(value.trim().to_string()),
            "DTSTART" => dtstart = parse_timestamp(value.trim()),
            "DTEND" => dtend_or_duration = Some(value.trim().to_string()),
            "DURATION" => dtend_or_duration = dtend_or_duration.or_else(|| Some(value.trim().to_string())),
            "LAST-MODIFIED" => last_modified = parse_timestamp(value.trim()),
            _ => {}
        }
    }

    let uid = uid?;
    let raw_body = canonicalize(&format!("{}\r\n", lines.join("\r\n")));

    Some(CalEvent {
        uid,
        dtstart,
        dtend_or_duration,
        last_modified,
        raw_body,
    })
}

/// Recognizes `YYYYMMDDTHHMMSSZ`, `YYYYMMDDTHHMMSS` (floating), and
/// `YYYYMMDD` (all-day) per spec §4.2. Anything else is left uninterpreted.
fn parse_timestamp(value: &str) -> Option<EventTimestamp> {
    if let Some(stripped) = value.strip_suffix('Z') {
        if stripped.len() == 15 {
            let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
            return Some(EventTimestamp::Utc(Utc.from_utc_datetime(&naive)));
        }
    }
    if value.len() == 15 && value.contains('T') {
        let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
        return Some(EventTimestamp::Floating(naive));
    }
    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(EventTimestamp::AllDay(date));
    }
    None
}

/// Reassembles a set of events into one publishable `VCALENDAR` document
/// (spec §4.2). Event ordering is the caller's responsibility.
pub fn build_calendar<'a>(events: impl IntoIterator<Item = &'a CalEvent>) -> String {
    let mut out = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:");
    out.push_str(PRODID);
    out.push_str("\r\nCALSCALE:GREGORIAN\r\n");
    for event in events {
        out.push_str(&event.raw_body.replace('\n', "\r\n"));
        out.push_str("\r\n");
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}
