//! CalDAV protocol client: discovery, listing, fetching, uploading, and
//! deleting events over raw WebDAV verbs, with quirk-retry handling for
//! non-conforming servers (spec §4.1).

use std::time::Duration;

use caldavsync_core::{Credentials, SyncError, SyncResult};
use reqwest::{Method, StatusCode};

use crate::xml::{self, ReportEntry};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single fetched CalDAV resource: its href and verbatim body bytes.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub href: String,
    pub raw_body: String,
}

/// Whether a `put_event` call is creating a brand new resource or
/// overwriting an existing one (spec §4.1 — `If-None-Match: *` applies
/// only to creates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutIntent {
    Create,
    Overwrite,
}

pub struct CalDavClient {
    http: reqwest::Client,
    credentials: Credentials,
}

impl CalDavClient {
    pub fn new(credentials: Credentials) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        Ok(Self { http, credentials })
    }

    #[cfg(test)]
    pub fn with_timeout(credentials: Credentials, timeout: Duration) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        Ok(Self { http, credentials })
    }

    /// Best-effort calendar URL discovery (spec §4.1). If `base` itself is
    /// a calendar collection, it is used directly; otherwise a `Depth: 1`
    /// `PROPFIND` is issued and the child whose `displayname` matches
    /// `calendar_name` is returned.
    pub async fn discover_calendar_url(&self, base: &str, calendar_name: Option<&str>) -> SyncResult<String> {
        let body = xml::propfind_body();
        if let Ok((final_url, response_body)) = self
            .request_with_quirk_retry(Method::from_bytes(b"PROPFIND").unwrap(), base, Some(&body), &[("Depth", "0")])
            .await
        {
            if let Ok(entries) = xml::parse_propfind_multistatus(&response_body) {
                if entries.first().map(|e| e.is_calendar_collection).unwrap_or(false) {
                    return Ok(final_url);
                }
            }
        }

        let (resolved_base, listing) = self
            .request_with_quirk_retry(Method::from_bytes(b"PROPFIND").unwrap(), base, Some(&body), &[("Depth", "1")])
            .await?;
        let entries = xml::parse_propfind_multistatus(&listing)
            .map_err(|_| SyncError::MalformedXml("propfind listing unparseable".to_string()))?;

        let Some(name) = calendar_name else {
            return entries
                .into_iter()
                .find(|e| e.is_calendar_collection)
                .map(|e| join_url(&resolved_base, &e.href))
                .ok_or_else(|| SyncError::NotFound(format!("no calendar collection under {base}")));
        };

        entries
            .into_iter()
            .find(|e| e.is_calendar_collection && e.display_name.as_deref() == Some(name))
            .map(|e| join_url(&resolved_base, &e.href))
            .ok_or_else(|| SyncError::NotFound(format!("calendar '{name}' not found under {base}")))
    }

    /// Discovers every calendar collection under `base` (spec §4.4 source
    /// cycle, "no calendar_name configured" case). Unlike
    /// `discover_calendar_url`, this never matches by display name and
    /// never short-circuits on `base` itself being a collection — it
    /// always lists children via a `Depth: 1` `PROPFIND` and returns every
    /// one that is a calendar collection.
    pub async fn discover_calendar_urls(&self, base: &str) -> SyncResult<Vec<String>> {
        let body = xml::propfind_body();
        let (resolved_base, listing) = self
            .request_with_quirk_retry(Method::from_bytes(b"PROPFIND").unwrap(), base, Some(&body), &[("Depth", "1")])
            .await?;
        let entries = xml::parse_propfind_multistatus(&listing)
            .map_err(|_| SyncError::MalformedXml("propfind listing unparseable".to_string()))?;

        let urls: Vec<String> =
            entries.into_iter().filter(|e| e.is_calendar_collection).map(|e| join_url(&resolved_base, &e.href)).collect();

        if urls.is_empty() {
            return Err(SyncError::NotFound(format!("no calendar collections under {base}")));
        }
        Ok(urls)
    }

    /// Issues a `calendar-query` REPORT and returns every event body
    /// verbatim — no iCalendar parsing happens at this layer (spec §4.1).
    pub async fn list_events(&self, calendar_url: &str) -> SyncResult<Vec<RemoteEvent>> {
        let body = xml::calendar_query_body();
        let (_, xml_body) = self
            .request_with_quirk_retry(Method::from_bytes(b"REPORT").unwrap(), calendar_url, Some(&body), &[("Depth", "1")])
            .await?;
        let entries: Vec<ReportEntry> = xml::parse_report_multistatus(&xml_body)?;
        Ok(entries
            .into_iter()
            .map(|e| RemoteEvent { href: e.href, raw_body: e.calendar_data })
            .collect())
    }

    /// `GET`s a single event body by href.
    pub async fn fetch_event(&self, href: &str) -> SyncResult<String> {
        let response = self.send(reqwest::Method::GET, href, None, &[]).await?;
        self.body_or_error(response).await
    }

    /// `PUT`s a single event to `{calendar_url}/{uid}.ics`, returning the
    /// resulting href. Uses `If-None-Match: *` for `PutIntent::Create`.
    pub async fn put_event(&self, calendar_url: &str, uid: &str, body: &str, intent: PutIntent) -> SyncResult<String> {
        let href = format!("{}/{}.ics", calendar_url.trim_end_matches('/'), sanitize_uid(uid));
        let mut headers = vec![("Content-Type", "text/calendar; charset=utf-8".to_string())];
        if intent == PutIntent::Create {
            headers.push(("If-None-Match", "*".to_string()));
        }
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let response = self
            .request_with_quirk_retry(reqwest::Method::PUT, &href, Some(body), &header_refs)
            .await;

        match response {
            Ok(_) => Ok(href),
            Err(err) => Err(err),
        }
    }

    /// `DELETE`s a single event resource.
    pub async fn delete_event(&self, href: &str) -> SyncResult<()> {
        self.request_with_quirk_retry(reqwest::Method::DELETE, href, None, &[]).await?;
        Ok(())
    }

    /// Sends `method` against `url`, retrying exactly once with the
    /// trailing slash toggled if the first attempt returns 404 or 405
    /// (spec §4.1 slash-toggle retry). Returns `(final_url, body_text)`.
    async fn request_with_quirk_retry(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> SyncResult<(String, String)> {
        let response = self.send(method.clone(), url, body, extra_headers).await?;
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::METHOD_NOT_ALLOWED {
            let toggled = toggle_slash(url);
            let retry = self.send(method, &toggled, body, extra_headers).await?;
            let status = retry.status();
            let text = self.body_or_error(retry).await?;
            return if status.is_success() || status.is_redirection() {
                Ok((toggled, text))
            } else {
                Err(status_to_error(status, &text))
            };
        }
        let status = response.status();
        let text = self.body_or_error(response).await?;
        if status.is_success() || status.is_redirection() {
            Ok((url.to_string(), text))
        } else {
            Err(status_to_error(status, &text))
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> SyncResult<reqwest::Response> {
        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password));
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        if let Some(b) = body {
            builder = builder.body(b.to_string());
        }
        builder.send().await.map_err(|e| SyncError::Network(e.to_string()))
    }

    async fn body_or_error(&self, response: reqwest::Response) -> SyncResult<String> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        let text = response.text().await.unwrap_or_default();
        if status.is_success() || status.is_redirection() {
            Ok(text)
        } else {
            Err(status_to_error(status, &text))
        }
    }
}

fn status_to_error(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => SyncError::NotFound(body.chars().take(200).collect()),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => SyncError::Conflict(body.chars().take(200).collect()),
        other => SyncError::Upstream { status: other.as_u16(), snippet: body.chars().take(200).collect() },
    }
}

/// Toggles the trailing slash on a URL's path component: adds one if
/// absent, removes one if present (spec §4.1).
pub fn toggle_slash(url: &str) -> String {
    if let Some(stripped) = url.strip_suffix('/') {
        stripped.to_string()
    } else {
        format!("{url}/")
    }
}

fn join_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match reqwest::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => format!("{}{}", base.trim_end_matches('/'), href),
    }
}

fn sanitize_uid(uid: &str) -> String {
    uid.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
