//! Expiry Engine: keeps every entry's `validity_days` meaning "days remaining".
//!
//! Recomputation derives the remaining days from the creation time and the
//! immutable validity window, so it is idempotent: running it twice within
//! the same day, or once after the device slept through several midnights,
//! gives the same result as one run per elapsed day.
//!
//! The scheduler fires at the next local midnight and then every 24 hours.
//! It never fires more often than that. Missed ticks are skipped, and
//! `on_resume` covers the time the process was suspended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::vault::repository::EntryRepository;

/// Interval between recomputations after the first midnight.
pub const RECOMPUTE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

struct ScheduledTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ExpiryEngine {
    repository: Arc<EntryRepository>,
    last_run: Arc<RwLock<Option<DateTime<Utc>>>>,
    runs: Arc<AtomicU64>,
    task: Mutex<Option<ScheduledTask>>,
}

impl ExpiryEngine {
    pub fn new(repository: Arc<EntryRepository>) -> Self {
        Self {
            repository,
            last_run: Arc::new(RwLock::new(None)),
            runs: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Recompute every entry against `now` and persist the collection.
    pub async fn recompute_at(&self, now: DateTime<Utc>) -> Result<usize> {
        recompute(&self.repository, &self.last_run, &self.runs, now).await
    }

    pub async fn recompute_now(&self) -> Result<usize> {
        self.recompute_at(Utc::now()).await
    }

    /// Catch up after the app returns from a suspension.
    pub async fn on_resume(&self) -> Result<usize> {
        info!("Recomputing validity after resume");
        self.recompute_now().await
    }

    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.read().await
    }

    /// Number of completed recomputations since this engine was created.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|task| !task.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Start the daily schedule. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut slot = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            warn!("Expiry engine already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let repository = Arc::clone(&self.repository);
        let last_run = Arc::clone(&self.last_run);
        let runs = Arc::clone(&self.runs);

        let handle = tokio::spawn(async move {
            let first = duration_until_next_midnight(&Local::now());
            debug!("Next validity recomputation in {:?}", first);

            tokio::select! {
                _ = tokio::time::sleep(first) => {}
                _ = shutdown_rx.changed() => {
                    debug!("Expiry engine stopped before first run");
                    return;
                }
            }

            // The first tick completes immediately, i.e. at midnight.
            let mut ticker = tokio::time::interval(RECOMPUTE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = recompute(&repository, &last_run, &runs, Utc::now()).await {
                            error!("Scheduled validity recomputation failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Expiry engine stopping");
                        break;
                    }
                }
            }
        });

        *slot = Some(ScheduledTask {
            shutdown_tx,
            handle,
        });
        info!("Expiry engine started");
    }

    /// Cancel the schedule and wait for the task to wind down.
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
            info!("Expiry engine stopped");
        }
    }
}

impl Drop for ExpiryEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.handle.abort();
            }
        }
    }
}

async fn recompute(
    repository: &EntryRepository,
    last_run: &RwLock<Option<DateTime<Utc>>>,
    runs: &AtomicU64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let changed = repository.recompute_expiry(now.timestamp_millis()).await?;
    *last_run.write().await = Some(now);
    runs.fetch_add(1, Ordering::Relaxed);
    debug!("Recomputed validity, {} entries changed", changed);
    Ok(changed)
}

/// Time from `now` until the following midnight in `now`'s time zone.
pub fn duration_until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        // A DST jump can skip midnight; earliest() is None then.
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest());

    match next_midnight {
        Some(next) => next
            .signed_duration_since(now.clone())
            .to_std()
            .unwrap_or(Duration::ZERO),
        None => RECOMPUTE_INTERVAL,
    }
}
