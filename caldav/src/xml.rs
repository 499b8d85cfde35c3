//! Namespace-oblivious multistatus XML handling (spec §4.1).
//!
//! The reader walks the tree by local element name only — `response`,
//! `href`, `calendar-data`, `resourcetype`, `collection`, `displayname` —
//! ignoring whatever namespace prefix a given server happens to use. This
//! is the explicit Feishu-compatibility lever: a body must never be
//! rejected because it fails strict iCalendar or WebDAV schema validation.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use caldavsync_core::SyncError;

/// One `<d:response>` entry describing a calendar resource and its body.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub href: String,
    pub calendar_data: String,
}

/// One child resource discovered under `PROPFIND Depth: 1`.
#[derive(Debug, Clone)]
pub struct PropfindEntry {
    pub href: String,
    pub display_name: Option<String>,
    pub is_calendar_collection: bool,
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Builds the `PROPFIND` body requesting `resourcetype` and `displayname`,
/// used both for collection-type probing (`Depth: 0`) and child discovery
/// (`Depth: 1`).
pub fn propfind_body() -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut propfind = BytesStart::new("d:propfind");
    propfind.push_attribute(("xmlns:d", "DAV:"));
    writer.write_event(Event::Start(propfind)).ok();
    writer.write_event(Event::Start(BytesStart::new("d:prop"))).ok();
    write_empty(&mut writer, "d:displayname");
    write_empty(&mut writer, "d:resourcetype");
    writer.write_event(Event::End(BytesEnd::new("d:prop"))).ok();
    writer.write_event(Event::End(BytesEnd::new("d:propfind"))).ok();
    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

/// Builds the `calendar-query` REPORT body selecting every `VEVENT`
/// unconditionally (no time-range filter — filtering is the differ's job).
pub fn calendar_query_body() -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", "DAV:"));
    query.push_attribute(("xmlns:c", "urn:ietf:params:xml:ns:caldav"));
    writer.write_event(Event::Start(query)).ok();

    writer.write_event(Event::Start(BytesStart::new("d:prop"))).ok();
    write_empty(&mut writer, "d:getetag");
    write_empty(&mut writer, "c:calendar-data");
    writer.write_event(Event::End(BytesEnd::new("d:prop"))).ok();

    writer.write_event(Event::Start(BytesStart::new("c:filter"))).ok();
    let mut vcal = BytesStart::new("c:comp-filter");
    vcal.push_attribute(("name", "VCALENDAR"));
    writer.write_event(Event::Start(vcal)).ok();
    let mut vevent = BytesStart::new("c:comp-filter");
    vevent.push_attribute(("name", "VEVENT"));
    writer.write_event(Event::Empty(vevent)).ok();
    writer.write_event(Event::End(BytesEnd::new("c:comp-filter"))).ok();
    writer.write_event(Event::End(BytesEnd::new("c:filter"))).ok();

    writer.write_event(Event::End(BytesEnd::new("c:calendar-query"))).ok();
    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

fn write_empty(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    writer.write_event(Event::Empty(BytesStart::new(name))).ok();
}

/// Parses a `calendar-query`/`calendar-multiget` multistatus response,
/// extracting every `(href, calendar-data)` pair regardless of namespace
/// prefix. `calendar-data` text is returned unchanged so downstream
/// iCalendar parsing sees original server bytes (spec §4.1).
pub fn parse_report_multistatus(xml: &str) -> Result<Vec<ReportEntry>, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut entries = Vec::new();
    let mut href: Option<String> = None;
    let mut calendar_data = String::new();
    let mut current_element: Option<String> = None;
    let mut in_response = false;
    let mut buf = Vec::new();
    let mut saw_any_element = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                saw_any_element = true;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        in_response = true;
                        href = None;
                        calendar_data.clear();
                    }
                    "href" | "calendar-data" => current_element = Some(local_name(&name).to_string()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" && in_response {
                    if let Some(h) = href.take() {
                        entries.push(ReportEntry {
                            href: h,
                            calendar_data: std::mem::take(&mut calendar_data),
                        });
                    }
                    in_response = false;
                }
                current_element = None;
            }
            Ok(Event::Text(e)) | Ok(Event::CData(e)) => {
                let text = text_of(e);
                match current_element.as_deref() {
                    Some("href") => href = Some(text),
                    Some("calendar-data") => calendar_data.push_str(&text),
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(err) => return Err(SyncError::MalformedXml(err.to_string())),
        }
        buf.clear();
    }

    if !saw_any_element {
        return Err(SyncError::MalformedXml("empty or non-XML response body".to_string()));
    }

    Ok(entries)
}

fn text_of(event: impl AsTextEvent) -> String {
    event.unescape_or_raw()
}

trait AsTextEvent {
    fn unescape_or_raw(self) -> String;
}

impl<'a> AsTextEvent for quick_xml::events::BytesText<'a> {
    fn unescape_or_raw(self) -> String {
        self.unescape().map(|c| c.into_owned()).unwrap_or_else(|_| {
            String::from_utf8_lossy(self.as_ref()).into_owned()
        })
    }
}

impl<'a> AsTextEvent for quick_xml::events::BytesCData<'a> {
    fn unescape_or_raw(self) -> String {
        String::from_utf8_lossy(self.as_ref()).into_owned()
    }
}

/// Parses a `PROPFIND` response (Depth 0 or 1), extracting `displayname`
/// and whether each resource's `resourcetype` includes `calendar`.
pub fn parse_propfind_multistatus(xml: &str) -> Result<Vec<PropfindEntry>, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut href: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut is_calendar = false;
    let mut in_response = false;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();
    let mut saw_any_element = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                saw_any_element = true;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        in_response = true;
                        href = None;
                        display_name = None;
                        is_calendar = false;
                    }
                    "href" | "displayname" => current_element = Some(local_name(&name).to_string()),
                    "calendar" => is_calendar = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" && in_response {
                    if let Some(h) = href.take() {
                        entries.push(PropfindEntry {
                            href: h,
                            display_name: display_name.take(),
                            is_calendar_collection: is_calendar,
                        });
                    }
                    in_response = false;
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                let text = text_of(e);
                match current_element.as_deref() {
                    Some("href") => href = Some(text),
                    Some("displayname") => display_name = Some(text),
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(err) => return Err(SyncError::MalformedXml(err.to_string())),
        }
        buf.clear();
    }

    if !saw_any_element {
        return Err(SyncError::MalformedXml("empty or non-XML response body".to_string()));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTISTATUS: &str = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/cal/u1.ics</D:href>
    <D:propstat>
      <D:prop>
        <C:calendar-data>BEGIN:VEVENT
UID:u1
END:VEVENT</C:calendar-data>
      </D:prop>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn extracts_href_and_calendar_data_regardless_of_prefix() {
        let entries = parse_report_multistatus(MULTISTATUS).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "/cal/u1.ics");
        assert!(entries[0].calendar_data.contains("UID:u1"));
    }

    #[test]
    fn rejects_completely_empty_body() {
        let err = parse_report_multistatus("").unwrap_err();
        assert!(matches!(err, SyncError::MalformedXml(_)));
    }

    #[test]
    fn propfind_parses_calendar_collection_flag() {
        let xml = r#"<d:multistatus xmlns:d="DAV:">
          <d:response>
            <d:href>/cal/</d:href>
            <d:propstat><d:prop>
              <d:displayname>Work</d:displayname>
              <d:resourcetype><d:collection/><cal:calendar xmlns:cal="urn:ietf:params:xml:ns:caldav"/></d:resourcetype>
            </d:prop></d:propstat>
          </d:response>
        </d:multistatus>"#;
        let entries = parse_propfind_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_calendar_collection);
        assert_eq!(entries[0].display_name.as_deref(), Some("Work"));
    }
}
