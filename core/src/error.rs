//! Error taxonomy shared by the CalDAV client, the iCalendar codec, and the
//! differ/merger (spec §7).

use thiserror::Error;

/// Errors surfaced by a sync cycle.
///
/// All variants are string-serialized into `last_sync_error` for display in
/// the UI; none carry structured detail across the API boundary beyond the
/// message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("malformed multistatus xml: {0}")]
    MalformedXml(String),

    #[error("malformed icalendar data: {0}")]
    MalformedIcs(String),

    #[error("upstream error {status}: {snippet}")]
    Upstream { status: u16, snippet: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
