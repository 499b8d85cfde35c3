//! Core domain models for caldav-ics-sync (spec §3)
//!
//! These are pure value types with no I/O. The config store (`caldavsync-store`)
//! owns the actual row representation and converts to/from these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DestinationId, SourceId};

/// Outcome of the most recently attempted sync cycle for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// HTTP Basic credentials held by a unit for talking to its CalDAV server.
///
/// Stored in plaintext at rest per spec §7 — this is a documented product
/// decision, not an oversight. Never implement `Debug`/`Display` here beyond
/// the derived `Debug`, and never pass a `Credentials` value to `tracing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A configured pull from a CalDAV collection, republished as an ICS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    /// URL-safe token; unique across sources. Matches `^[A-Za-z0-9._-]+$`.
    pub ics_path: String,
    pub caldav_base_url: String,
    /// Optional named calendar collection to restrict discovery to. When
    /// unset the source fans out across every discovered calendar
    /// collection under the principal (see SPEC_FULL.md's multi-calendar
    /// supplement).
    pub calendar_name: Option<String>,
    pub credentials: Credentials,
    /// 0 disables the timer; manual trigger only.
    pub sync_interval_secs: u64,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// `ics_path` must be non-empty and match `^[A-Za-z0-9._-]+$` (spec §3).
    pub fn validate_ics_path(path: &str) -> bool {
        !path.is_empty()
            && path
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }
}

/// A configured push from a remote ICS URL into a CalDAV calendar collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub name: String,
    pub remote_ics_url: String,
    pub caldav_base_url: String,
    pub calendar_name: String,
    pub credentials: Credentials,
    /// Spec requires >= 1 for destinations at the UI layer; the engine
    /// still treats 0 as manual-only defensively (spec §3).
    pub sync_interval_secs: u64,
    pub sync_all: bool,
    pub keep_local: bool,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An in-flight event parsed out of an iCalendar document (spec §3).
///
/// Never persisted as such; it lives only for the duration of one sync
/// cycle. Equality for update-detection is `raw_body` after canonicalization
/// (see `icalendar::canonicalize`), not structural equality of this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalEvent {
    pub uid: String,
    pub dtstart: Option<EventTimestamp>,
    pub dtend_or_duration: Option<String>,
    pub last_modified: Option<EventTimestamp>,
    /// Canonical bytes of the `BEGIN:VEVENT...END:VEVENT` block, CRLF line-folded.
    pub raw_body: String,
}

/// A parsed `DTSTART`/`LAST-MODIFIED` value. Timezone interpretation beyond
/// UTC/floating/all-day is explicitly out of scope (spec §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTimestamp {
    Utc(DateTime<Utc>),
    /// No timezone offset in the source data ("floating" time per RFC 5545).
    Floating(chrono::NaiveDateTime),
    /// `DTSTART;VALUE=DATE:YYYYMMDD`, midnight local with no TZ semantics.
    AllDay(chrono::NaiveDate),
}

impl EventTimestamp {
    /// Best-effort comparison against a UTC instant for the past-event
    /// filter (spec §4.3). Floating and all-day timestamps are compared as
    /// if they were UTC, since no timezone database resolution is in scope.
    pub fn is_before(&self, now: DateTime<Utc>) -> bool {
        match self {
            EventTimestamp::Utc(dt) => *dt < now,
            EventTimestamp::Floating(ndt) => *ndt < now.naive_utc(),
            EventTimestamp::AllDay(d) => {
                d.and_hms_opt(0, 0, 0).map(|dt| dt < now.naive_utc()).unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ics_path_accepts_url_safe_tokens() {
        assert!(Source::validate_ics_path("work-calendar_2026.ics"));
        assert!(Source::validate_ics_path("a"));
    }

    #[test]
    fn ics_path_rejects_empty_and_slashes() {
        assert!(!Source::validate_ics_path(""));
        assert!(!Source::validate_ics_path("a/b"));
        assert!(!Source::validate_ics_path("a b"));
    }

    #[test]
    fn all_day_timestamp_compares_at_midnight() {
        let now = Utc::now();
        let yesterday = (now - chrono::Duration::days(1)).date_naive();
        let ts = EventTimestamp::AllDay(yesterday);
        assert!(ts.is_before(now));
    }
}
