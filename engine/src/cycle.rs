//! One complete execution of a source or destination sync, from CalDAV
//! round trips through status recording (spec §4.4 cycle outlines).

use caldavsync_caldav::{CalDavClient, PutIntent};
use caldavsync_core::{
    differ::{self, DiffPolicy, LocalEvent},
    icalendar, Destination, Source, SyncError, SyncResult,
};
use caldavsync_store::{destinations, sources};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::publisher::IcsPublisher;

/// Runs one source pull cycle: discover, list, concatenate, publish
/// (spec §4.4 "Cycle outline for a source").
///
/// `cancel` is checked only immediately before the final status write: the
/// CalDAV round trips themselves are not interruptible mid-flight (spec
/// §4.4/§5), but if the unit was deleted while this cycle was in flight the
/// resulting status update is discarded rather than resurrecting a
/// just-deleted record.
pub async fn run_source_cycle(
    pool: &SqlitePool,
    publisher: &IcsPublisher,
    source: &Source,
    cancel: &CancellationToken,
) -> SyncResult<()> {
    let result = pull_and_build(source).await;

    if cancel.is_cancelled() {
        return result.map(|_| ());
    }

    match result {
        Ok(body) => {
            let content_type = "text/calendar; charset=utf-8";
            sources::record_success(pool, source.id, &body, content_type).await?;
            publisher.publish(source.ics_path.clone(), content_type.to_string(), body.into_bytes(), Utc::now());
            Ok(())
        }
        Err(err) => {
            sources::record_failure(pool, source.id, &err.to_string()).await?;
            Err(err)
        }
    }
}

/// Pulls every event the source's configuration selects and rebuilds a
/// single calendar body from them. When `calendar_name` is unset the
/// source has no single collection to pull from, so every calendar
/// collection discovered under `caldav_base_url` is pulled and
/// concatenated (spec §4.4 "no calendar_name configured" supplement).
async fn pull_and_build(source: &Source) -> SyncResult<String> {
    let client = CalDavClient::new(source.credentials.clone())?;

    let calendar_urls = match source.calendar_name.as_deref() {
        Some(name) => vec![client.discover_calendar_url(&source.caldav_base_url, Some(name)).await?],
        None => client.discover_calendar_urls(&source.caldav_base_url).await?,
    };

    let mut events = Vec::new();
    for calendar_url in &calendar_urls {
        let remote = client.list_events(calendar_url).await?;
        events.extend(remote.iter().flat_map(|event| icalendar::split_events(&event.raw_body)));
    }

    Ok(icalendar::build_calendar(&events))
}

/// Runs one destination push cycle: download, split, diff, apply
/// (spec §4.4 "Cycle outline for a destination"). `cancel` is checked the
/// same way as in `run_source_cycle`.
pub async fn run_destination_cycle(
    pool: &SqlitePool,
    http: &reqwest::Client,
    destination: &Destination,
    cancel: &CancellationToken,
) -> SyncResult<()> {
    let result = push_cycle(http, destination).await;

    if cancel.is_cancelled() {
        return result.map(|_| ());
    }

    match result {
        Ok(summary) if summary.is_ok() => {
            destinations::record_success(pool, destination.id).await?;
            Ok(())
        }
        Ok(summary) => {
            let message = summary.error_message().unwrap_or_default();
            destinations::record_failure(pool, destination.id, &message).await?;
            Err(SyncError::Internal(message))
        }
        Err(err) => {
            destinations::record_failure(pool, destination.id, &err.to_string()).await?;
            Err(err)
        }
    }
}

async fn push_cycle(http: &reqwest::Client, destination: &Destination) -> SyncResult<differ::SyncCycleSummary> {
    let remote_text = fetch_remote_ics(http, &destination.remote_ics_url).await?;
    let remote_events = icalendar::split_events(&remote_text);

    let client = CalDavClient::new(destination.credentials.clone())?;
    let calendar_url = client
        .discover_calendar_url(&destination.caldav_base_url, Some(&destination.calendar_name))
        .await?;
    let local_remote_events = client.list_events(&calendar_url).await?;
    let local_events: Vec<LocalEvent> = local_remote_events
        .iter()
        .filter_map(|event| {
            icalendar::split_events(&event.raw_body).into_iter().next().map(|parsed| LocalEvent {
                uid: parsed.uid,
                href: event.href.clone(),
                raw_body: parsed.raw_body,
            })
        })
        .collect();

    let policy = DiffPolicy { sync_all: destination.sync_all, keep_local: destination.keep_local };
    let plan = differ::plan(&remote_events, &local_events, Utc::now(), policy);

    let mut summary = differ::SyncCycleSummary::default();
    for op in &plan {
        if !op.is_actionable() {
            summary.record_success(op);
            continue;
        }
        let outcome = apply_operation(&client, &calendar_url, op).await;
        match outcome {
            Ok(()) => summary.record_success(op),
            Err(err) => summary.record_failure(op, err),
        }
    }

    Ok(summary)
}

async fn apply_operation(
    client: &CalDavClient,
    calendar_url: &str,
    op: &differ::PlannedOperation,
) -> SyncResult<()> {
    match op {
        differ::PlannedOperation::Create { uid, body } => {
            client.put_event(calendar_url, uid, body, PutIntent::Create).await?;
            Ok(())
        }
        differ::PlannedOperation::Update { uid, body, .. } => {
            client.put_event(calendar_url, uid, body, PutIntent::Overwrite).await?;
            Ok(())
        }
        differ::PlannedOperation::Delete { href, .. } => client.delete_event(href).await,
        differ::PlannedOperation::Skip { .. } | differ::PlannedOperation::Keep { .. } => Ok(()),
    }
}

/// Downloads the remote ICS feed. Content-type tolerant: `text/calendar`
/// and `text/plain` are both accepted (spec §4.4 step 2); no
/// authentication is attempted.
async fn fetch_remote_ics(http: &reqwest::Client, url: &str) -> SyncResult<String> {
    let response = http.get(url).send().await.map_err(|e| SyncError::Network(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Upstream { status: status.as_u16(), snippet: String::new() });
    }
    response.text().await.map_err(|e| SyncError::Network(e.to_string()))
}
