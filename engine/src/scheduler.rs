//! Per-unit background scheduler: one task per source/destination, a
//! timer, an at-most-one-concurrent-cycle discipline, and a manual
//! trigger channel (spec §4.4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use caldavsync_core::{Destination, DestinationId, Source, SourceId};
use caldavsync_store::{destinations, sources};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cycle;
use crate::publisher::IcsPublisher;

/// Outcome of a manual trigger request (spec §4.4 `try_trigger`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

/// Identifies a schedulable unit across both source and destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKey {
    Source(SourceId),
    Destination(DestinationId),
}

struct UnitHandle {
    cancel: CancellationToken,
    trigger_tx: tokio::sync::mpsc::Sender<()>,
    /// Shared with the task loop so `try_trigger` can claim the
    /// at-most-one-concurrent-cycle slot itself and answer
    /// `AlreadyRunning` immediately, without waiting for the task to come
    /// back around to its `select!` (spec §4.4 "the engine itself exposes
    /// `try_trigger() -> {Started, AlreadyRunning}`" — the decision must be
    /// made at claim time, not deferred to whenever the channel drains).
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns every running per-unit task. Registration/deregistration mutate
/// the map directly; the map itself lives behind a `Mutex` because
/// mutation is rare relative to the steady-state ticking inside each task.
#[derive(Clone)]
pub struct Scheduler {
    pool: SqlitePool,
    publisher: IcsPublisher,
    http: reqwest::Client,
    units: Arc<Mutex<HashMap<UnitKey, UnitHandle>>>,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, publisher: IcsPublisher) -> Self {
        Self {
            pool,
            publisher,
            http: reqwest::Client::new(),
            units: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn publisher(&self) -> &IcsPublisher {
        &self.publisher
    }

    /// Starts (or restarts with a new interval) the task for a source.
    /// Re-registering an already-running unit cancels and joins the old
    /// task first (spec §4.4 "Reload on mutation").
    pub async fn register_source(&self, id: SourceId, interval_secs: u64) {
        self.deregister(UnitKey::Source(id)).await;
        let (cancel, trigger_tx, running, task) = self.spawn_source_task(id, interval_secs);
        self.units.lock().await.insert(UnitKey::Source(id), UnitHandle { cancel, trigger_tx, running, task });
    }

    pub async fn register_destination(&self, id: DestinationId, interval_secs: u64) {
        self.deregister(UnitKey::Destination(id)).await;
        let (cancel, trigger_tx, running, task) = self.spawn_destination_task(id, interval_secs);
        self.units.lock().await.insert(UnitKey::Destination(id), UnitHandle { cancel, trigger_tx, running, task });
    }

    /// Cancels and joins a unit's task (spec §4.4 "Cancellation" — the
    /// task is joined before the record leaves the store).
    pub async fn deregister(&self, key: UnitKey) {
        let handle = self.units.lock().await.remove(&key);
        if let Some(handle) = handle {
            handle.cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle.task).await;
        }
    }

    /// Cancels and joins every running unit. Used on process shutdown so no
    /// cycle is left mid-flight when the runtime exits.
    pub async fn shutdown(&self) {
        let handles: Vec<UnitHandle> = self.units.lock().await.drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            handle.cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle.task).await;
        }
    }

    /// Requests an immediate cycle for `key`. The at-most-one-concurrent
    /// slot is claimed right here, synchronously with the caller, so an
    /// overlapping trigger observes `AlreadyRunning` immediately rather
    /// than being queued behind the in-flight cycle and only finding out
    /// once it's too late to matter (spec §8 invariant 3).
    pub async fn try_trigger(&self, key: UnitKey) -> Option<TriggerOutcome> {
        let (running, tx) = {
            let units = self.units.lock().await;
            let handle = units.get(&key)?;
            (handle.running.clone(), handle.trigger_tx.clone())
        };

        if running.swap(true, Ordering::SeqCst) {
            return Some(TriggerOutcome::AlreadyRunning);
        }

        if tx.send(()).await.is_err() {
            running.store(false, Ordering::SeqCst);
            return None;
        }
        Some(TriggerOutcome::Started)
    }

    fn spawn_source_task(
        &self,
        id: SourceId,
        interval_secs: u64,
    ) -> (CancellationToken, tokio::sync::mpsc::Sender<()>, Arc<AtomicBool>, tokio::task::JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(4);
        let running = Arc::new(AtomicBool::new(false));
        let pool = self.pool.clone();
        let publisher = self.publisher.clone();
        let cancel_clone = cancel.clone();
        let running_clone = running.clone();

        let cancel_for_cycle = cancel.clone();
        let task = tokio::spawn(async move {
            run_unit_loop(interval_secs, cancel_clone, trigger_rx, running_clone, move || {
                let pool = pool.clone();
                let publisher = publisher.clone();
                let cancel = cancel_for_cycle.clone();
                async move {
                    match sources::get(&pool, id).await {
                        Ok(source) => {
                            if let Err(err) = cycle::run_source_cycle(&pool, &publisher, &source, &cancel).await {
                                warn!(source_id = %id, error = %err, "source sync cycle failed");
                            }
                        }
                        Err(err) => warn!(source_id = %id, error = %err, "source disappeared before cycle ran"),
                    }
                }
            })
            .await;
        });

        (cancel, trigger_tx, running, task)
    }

    fn spawn_destination_task(
        &self,
        id: DestinationId,
        interval_secs: u64,
    ) -> (CancellationToken, tokio::sync::mpsc::Sender<()>, Arc<AtomicBool>, tokio::task::JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(4);
        let running = Arc::new(AtomicBool::new(false));
        let pool = self.pool.clone();
        let http = self.http.clone();
        let cancel_clone = cancel.clone();
        let running_clone = running.clone();

        let cancel_for_cycle = cancel.clone();
        let task = tokio::spawn(async move {
            run_unit_loop(interval_secs, cancel_clone, trigger_rx, running_clone, move || {
                let pool = pool.clone();
                let http = http.clone();
                let cancel = cancel_for_cycle.clone();
                async move {
                    match destinations::get(&pool, id).await {
                        Ok(destination) => {
                            if let Err(err) = cycle::run_destination_cycle(&pool, &http, &destination, &cancel).await {
                                warn!(destination_id = %id, error = %err, "destination sync cycle failed");
                            }
                        }
                        Err(err) => warn!(destination_id = %id, error = %err, "destination disappeared before cycle ran"),
                    }
                }
            })
            .await;
        });

        (cancel, trigger_tx, running, task)
    }
}

/// The task body shared by source and destination schedules: waits on the
/// timer, a manual trigger, or cancellation (spec §4.4). `running` is
/// claimed by the timer arm itself, or by `Scheduler::try_trigger` ahead of
/// sending on `trigger_rx` — by the time a trigger message is dequeued
/// here, the slot is already held, so this loop only needs to release it
/// once the cycle finishes.
async fn run_unit_loop<F, Fut>(
    interval_secs: u64,
    cancel: CancellationToken,
    mut trigger_rx: tokio::sync::mpsc::Receiver<()>,
    running: Arc<AtomicBool>,
    run_cycle: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut timer = (interval_secs > 0).then(|| tokio::time::interval(Duration::from_secs(interval_secs.max(1))));
    if let Some(timer) = timer.as_mut() {
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("unit task cancelled");
                break;
            }

            Some(()) = trigger_rx.recv() => {
                run_cycle().await;
                running.store(false, Ordering::SeqCst);
            }

            _ = async {
                match timer.as_mut() {
                    Some(timer) => { timer.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if running.swap(true, Ordering::SeqCst) {
                    continue;
                }
                run_cycle().await;
                running.store(false, Ordering::SeqCst);
            }
        }
    }
}
