//! Type-safe wrappers for domain identifiers
//!
//! These newtypes prevent mixing source ids with destination ids at compile
//! time, the way the teacher's `UserId`/`CalendarId`/`EventId` wrappers keep
//! its own identifier families apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source's unique monotonic integer id (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SourceId {
    fn from(id: i64) -> Self {
        SourceId(id)
    }
}

impl From<SourceId> for i64 {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

/// A destination's unique monotonic integer id (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        DestinationId(id)
    }
}

impl From<DestinationId> for i64 {
    fn from(id: DestinationId) -> Self {
        id.0
    }
}
