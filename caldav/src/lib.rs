//! CalDAV protocol client built on raw WebDAV verbs (spec §4.1).

pub mod client;
pub mod xml;

pub use client::{CalDavClient, PutIntent, RemoteEvent};
