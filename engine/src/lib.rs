//! Sync engine: per-unit scheduling, one cycle's worth of CalDAV/ICS work,
//! and the published-ICS cache the HTTP layer reads from (spec §4.4, §4.5).

pub mod cycle;
pub mod publisher;
pub mod scheduler;

pub use publisher::{IcsPublisher, PublishedIcs};
pub use scheduler::{Scheduler, TriggerOutcome, UnitKey};
