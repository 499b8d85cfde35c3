//! caldav-ics-sync core — domain logic and models
//!
//! This crate contains pure domain logic with no network or disk I/O:
//! identifiers, the source/destination data model, the iCalendar codec, and
//! the differ/merger. Everything that touches the network or a database
//! lives in `caldavsync-caldav`, `caldavsync-store`, and
//! `caldavsync-engine`. The one exception is `config`, which reads process
//! environment variables at bootstrap — shared here since both the `api`
//! and `server` crates need it.

pub mod config;
pub mod differ;
pub mod error;
pub mod icalendar;
pub mod models;
pub mod types;

pub use config::Config;
pub use differ::{plan, DiffPolicy, LocalEvent, PlannedOperation, SyncCycleSummary};
pub use error::{SyncError, SyncResult};
pub use models::{CalEvent, Credentials, Destination, EventTimestamp, Source, SyncStatus};
pub use types::{DestinationId, SourceId};
