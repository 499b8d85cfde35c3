//! ICS publisher: a read-only map from `ics_path` to the most recently
//! published calendar body (spec §4.5).
//!
//! Shared between the scheduler (writer, one entry per successful source
//! cycle) and the HTTP layer (reader, one lookup per `GET /ics/{path}`).
//! Guarded by a short-lived lock around the map rather than a true
//! lock-free copy-on-write swap — the map is small (one entry per source)
//! and writes are infrequent relative to reads, so the extra machinery
//! buys little here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PublishedIcs {
    pub content_type: String,
    pub body: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct IcsPublisher {
    inner: Arc<RwLock<HashMap<String, PublishedIcs>>>,
}

impl IcsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the entry for `path` (spec §4.5 "updated
    /// atomically at the end of each successful source sync").
    pub fn publish(&self, path: String, content_type: String, body: Vec<u8>, last_modified: DateTime<Utc>) {
        let mut guard = self.inner.write().expect("ics publisher lock poisoned");
        guard.insert(path, PublishedIcs { content_type, body, last_modified });
    }

    /// Lookup is case-sensitive; a missing path yields `None` (404 at the
    /// HTTP layer).
    pub fn get(&self, path: &str) -> Option<PublishedIcs> {
        self.inner.read().expect("ics publisher lock poisoned").get(path).cloned()
    }

    /// Drops the entry when its source is deleted or its `ics_path` changes.
    pub fn remove(&self, path: &str) {
        self.inner.write().expect("ics publisher lock poisoned").remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_sensitive() {
        let publisher = IcsPublisher::new();
        publisher.publish("Work".to_string(), "text/calendar".to_string(), b"BODY".to_vec(), Utc::now());
        assert!(publisher.get("Work").is_some());
        assert!(publisher.get("work").is_none());
    }

    #[test]
    fn missing_path_yields_none() {
        let publisher = IcsPublisher::new();
        assert!(publisher.get("nope").is_none());
    }

    #[test]
    fn publish_overwrites_previous_entry_atomically() {
        let publisher = IcsPublisher::new();
        publisher.publish("work".to_string(), "text/calendar".to_string(), b"OLD".to_vec(), Utc::now());
        publisher.publish("work".to_string(), "text/calendar".to_string(), b"NEW".to_vec(), Utc::now());
        assert_eq!(publisher.get("work").unwrap().body, b"NEW");
    }

    #[test]
    fn remove_drops_entry() {
        let publisher = IcsPublisher::new();
        publisher.publish("work".to_string(), "text/calendar".to_string(), b"BODY".to_vec(), Utc::now());
        publisher.remove("work");
        assert!(publisher.get("work").is_none());
    }
}
