//! Differ/merger: computes the create/update/keep/delete plan for mirroring
//! a remote ICS feed into a CalDAV collection (spec §4.3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::CalEvent;

/// One existing CalDAV resource, keyed by the `uid` parsed out of its body.
#[derive(Debug, Clone)]
pub struct LocalEvent {
    pub uid: String,
    pub href: String,
    pub raw_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOperation {
    /// Upload a brand new event.
    Create { uid: String, body: String },
    /// Overwrite an existing resource's body.
    Update { uid: String, href: String, body: String },
    /// Remote and local bodies are canonically equal; nothing to do.
    Skip { uid: String },
    /// Local-only event retained because `keep_local` is set.
    Keep { uid: String, href: String },
    /// Local-only event removed because `keep_local` is unset.
    Delete { uid: String, href: String },
}

impl PlannedOperation {
    pub fn uid(&self) -> &str {
        match self {
            PlannedOperation::Create { uid, .. }
            | PlannedOperation::Update { uid, .. }
            | PlannedOperation::Skip { uid }
            | PlannedOperation::Keep { uid, .. }
            | PlannedOperation::Delete { uid, .. } => uid,
        }
    }

    /// Whether this operation requires a network call against the CalDAV
    /// client (`Skip`/`Keep` are pure no-ops).
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            PlannedOperation::Create { .. } | PlannedOperation::Update { .. } | PlannedOperation::Delete { .. }
        )
    }
}

/// Policy flags carried by a destination (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct DiffPolicy {
    pub sync_all: bool,
    pub keep_local: bool,
}

/// Computes the ordered plan for one destination sync cycle.
///
/// Ordering matches spec §4.3: creates/updates first (uid-ascending), then
/// deletes (uid-ascending), so a transient empty collection is never
/// observable to subscribers mid-cycle. `skip`/`keep` entries are included
/// in the returned plan for observability but carry no network action.
pub fn plan(
    remote_events: &[CalEvent],
    local_events: &[LocalEvent],
    now: DateTime<Utc>,
    policy: DiffPolicy,
) -> Vec<PlannedOperation> {
    let remote_by_uid: BTreeMap<&str, &CalEvent> = remote_events
        .iter()
        .filter(|event| policy.sync_all || !is_past(event, now))
        .map(|event| (event.uid.as_str(), event))
        .collect();

    let local_by_uid: BTreeMap<&str, &LocalEvent> =
        local_events.iter().map(|event| (event.uid.as_str(), event)).collect();

    let mut creates_and_updates = Vec::new();
    let mut deletes = Vec::new();

    for (uid, remote) in &remote_by_uid {
        match local_by_uid.get(uid) {
            None => creates_and_updates.push(PlannedOperation::Create {
                uid: uid.to_string(),
                body: remote.raw_body.clone(),
            }),
            Some(local) => {
                if crate::icalendar::canonicalize_for_diff(&remote.raw_body)
                    == crate::icalendar::canonicalize_for_diff(&local.raw_body)
                {
                    creates_and_updates.push(PlannedOperation::Skip { uid: uid.to_string() });
                } else {
                    creates_and_updates.push(PlannedOperation::Update {
                        uid: uid.to_string(),
                        href: local.href.clone(),
                        body: remote.raw_body.clone(),
                    });
                }
            }
        }
    }

    for (uid, local) in &local_by_uid {
        if remote_by_uid.contains_key(uid) {
            continue;
        }
        if policy.keep_local {
            deletes.push(PlannedOperation::Keep {
                uid: uid.to_string(),
                href: local.href.clone(),
            });
        } else {
            deletes.push(PlannedOperation::Delete {
                uid: uid.to_string(),
                href: local.href.clone(),
            });
        }
    }

    creates_and_updates.sort_by(|a, b| a.uid().cmp(b.uid()));
    deletes.sort_by(|a, b| a.uid().cmp(b.uid()));

    creates_and_updates.into_iter().chain(deletes).collect()
}

fn is_past(event: &CalEvent, now: DateTime<Utc>) -> bool {
    match &event.dtstart {
        Some(ts) => ts.is_before(now),
        // "cannot be proven past" — an event with no usable dtstart is kept.
        None => false,
    }
}

/// Outcome of executing a plan against the CalDAV client (spec §4.3/§8 S6).
#[derive(Debug, Clone, Default)]
pub struct SyncCycleSummary {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub skipped: u32,
    pub kept: u32,
    pub errors: Vec<(String, String)>,
}

impl SyncCycleSummary {
    pub fn record_success(&mut self, op: &PlannedOperation) {
        match op {
            PlannedOperation::Create { .. } => self.created += 1,
            PlannedOperation::Update { .. } => self.updated += 1,
            PlannedOperation::Delete { .. } => self.deleted += 1,
            PlannedOperation::Skip { .. } => self.skipped += 1,
            PlannedOperation::Keep { .. } => self.kept += 1,
        }
    }

    pub fn record_failure(&mut self, op: &PlannedOperation, error: impl ToString) {
        self.errors.push((op.uid().to_string(), error.to_string()));
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Joins the accumulated errors into a single message, truncated at
    /// ~2 KB as `last_sync_error` requires (spec §4.3).
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let joined = self
            .errors
            .iter()
            .map(|(uid, err)| format!("{uid}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(if joined.len() > 2048 {
            let cut = joined.char_indices().map(|(i, _)| i).take_while(|&i| i <= 2048).last().unwrap_or(0);
            format!("{}…", &joined[..cut])
        } else {
            joined
        })
    }
}
