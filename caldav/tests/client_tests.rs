//! Integration tests against an in-process axum mock CalDAV server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use caldavsync_caldav::{CalDavClient, PutIntent};
use caldavsync_core::Credentials;

struct MockState {
    propfind_body: String,
    report_body: String,
    put_status: StatusCode,
    require_trailing_slash: bool,
}

async fn caldav_handler(State(state): State<Arc<MockState>>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    if state.require_trailing_slash && !path.ends_with('/') && req.method().as_str() != "GET" {
        return StatusCode::NOT_FOUND.into_response();
    }
    match req.method().as_str() {
        "PROPFIND" => (StatusCode::MULTI_STATUS, state.propfind_body.clone()).into_response(),
        "REPORT" => (StatusCode::MULTI_STATUS, state.report_body.clone()).into_response(),
        "PUT" => (state.put_status, "").into_response(),
        "DELETE" => StatusCode::NO_CONTENT.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn start_mock_server(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new().fallback(any(caldav_handler)).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn mock_propfind_response(href: &str, is_calendar: bool, display_name: &str) -> String {
    let resourcetype = if is_calendar {
        r#"<d:collection/><c:calendar/>"#
    } else {
        r#"<d:collection/>"#
    };
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>{href}</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>{resourcetype}</d:resourcetype>
        <d:displayname>{display_name}</d:displayname>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#
    )
}

fn mock_propfind_multi_response(children: &[(&str, bool, &str)]) -> String {
    let mut responses = String::new();
    for (href, is_calendar, display_name) in children {
        let resourcetype = if *is_calendar { r#"<d:collection/><c:calendar/>"# } else { r#"<d:collection/>"# };
        responses.push_str(&format!(
            r#"<d:response>
  <d:href>{href}</d:href>
  <d:propstat>
    <d:prop>
      <d:resourcetype>{resourcetype}</d:resourcetype>
      <d:displayname>{display_name}</d:displayname>
    </d:prop>
  </d:propstat>
</d:response>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">{responses}</d:multistatus>"#
    )
}

fn mock_report_response(events: &[(&str, &str)]) -> String {
    let mut responses = String::new();
    for (uid, body) in events {
        responses.push_str(&format!(
            r#"<d:response>
  <d:href>/cal/{uid}.ics</d:href>
  <d:propstat>
    <d:prop><c:calendar-data>{body}</c:calendar-data></d:prop>
  </d:propstat>
</d:response>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">{responses}</d:multistatus>"#
    )
}

fn creds() -> Credentials {
    Credentials { username: "alice".to_string(), password: "hunter2".to_string() }
}

#[tokio::test]
async fn discover_calendar_url_finds_named_child() {
    let propfind = mock_propfind_response("/dav/", false, "root");
    let state = Arc::new(MockState {
        propfind_body: propfind,
        report_body: String::new(),
        put_status: StatusCode::CREATED,
        require_trailing_slash: false,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();
    let base = format!("http://{addr}/dav");

    // The mock always returns the same multistatus for every PROPFIND
    // depth, and it reports the root as non-calendar, so discovery should
    // fall through to depth-1 child search and report NotFound since the
    // mock's single response isn't named to match — exercising the
    // not-found path end to end.
    let result = client.discover_calendar_url(&base, Some("work")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn discover_calendar_urls_returns_every_calendar_collection() {
    let propfind = mock_propfind_multi_response(&[
        ("/dav/work/", true, "Work"),
        ("/dav/notes/", false, "Notes"),
        ("/dav/home/", true, "Home"),
    ]);
    let state = Arc::new(MockState {
        propfind_body: propfind,
        report_body: String::new(),
        put_status: StatusCode::CREATED,
        require_trailing_slash: false,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();
    let base = format!("http://{addr}/dav");

    let urls = client.discover_calendar_urls(&base).await.unwrap();
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().any(|u| u.ends_with("/dav/work/")));
    assert!(urls.iter().any(|u| u.ends_with("/dav/home/")));
}

#[tokio::test]
async fn list_events_returns_verbatim_bodies() {
    let events = vec![("u1", "BEGIN:VEVENT\r\nUID:u1\r\nEND:VEVENT")];
    let state = Arc::new(MockState {
        propfind_body: String::new(),
        report_body: mock_report_response(&events),
        put_status: StatusCode::CREATED,
        require_trailing_slash: false,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();

    let remote = client.list_events(&format!("http://{addr}/cal")).await.unwrap();
    assert_eq!(remote.len(), 1);
    assert!(remote[0].raw_body.contains("UID:u1"));
    assert_eq!(remote[0].href, "/cal/u1.ics");
}

#[tokio::test]
async fn list_events_retries_once_on_slash_quirk() {
    let events = vec![("u1", "BEGIN:VEVENT\r\nUID:u1\r\nEND:VEVENT")];
    let state = Arc::new(MockState {
        propfind_body: String::new(),
        report_body: mock_report_response(&events),
        put_status: StatusCode::CREATED,
        require_trailing_slash: true,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();

    // Base has no trailing slash; the mock 404s until one is added.
    let remote = client.list_events(&format!("http://{addr}/cal")).await.unwrap();
    assert_eq!(remote.len(), 1);
}

#[tokio::test]
async fn put_event_builds_uid_based_href() {
    let state = Arc::new(MockState {
        propfind_body: String::new(),
        report_body: String::new(),
        put_status: StatusCode::CREATED,
        require_trailing_slash: false,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();

    let href = client
        .put_event(&format!("http://{addr}/cal"), "u1", "BEGIN:VEVENT\r\nUID:u1\r\nEND:VEVENT", PutIntent::Create)
        .await
        .unwrap();
    assert!(href.ends_with("/u1.ics"));
}

#[tokio::test]
async fn delete_event_succeeds_on_no_content() {
    let state = Arc::new(MockState {
        propfind_body: String::new(),
        report_body: String::new(),
        put_status: StatusCode::CREATED,
        require_trailing_slash: false,
    });
    let addr = start_mock_server(state).await;
    let client = CalDavClient::new(creds()).unwrap();

    client.delete_event(&format!("http://{addr}/cal/u1.ics")).await.unwrap();
}
