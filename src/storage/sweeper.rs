//! Expiry Sweeper
//!
//! Background task that periodically evicts expired sessions and flushes the
//! snapshot when the map changed.

use super::SessionStore;
use crate::error::{Error, Result};
use crate::persistence::SnapshotFile;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest accepted sweep period; `tokio::time::interval` rejects zero
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Background expiry task
#[derive(Debug)]
pub struct ExpirySweeper {
    store: SessionStore,
    persistence: Option<Arc<SnapshotFile>>,
    interval: Duration,
    flush_timeout: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper without persistence. `interval` is raised to
    /// [`MIN_SWEEP_INTERVAL`] if shorter.
    pub fn new(store: SessionStore, interval: Duration) -> Self {
        Self {
            store,
            persistence: None,
            interval: interval.max(MIN_SWEEP_INTERVAL),
            flush_timeout: Duration::from_secs(5),
        }
    }

    /// Flush to `file` after evictions, giving each write `flush_timeout`
    pub fn with_persistence(mut self, file: Arc<SnapshotFile>, flush_timeout: Duration) -> Self {
        self.persistence = Some(file);
        self.flush_timeout = flush_timeout;
        self
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// One sweep cycle. Returns the number of evicted sessions.
    ///
    /// The snapshot is flushed when entries were evicted, or when the file
    /// lags behind the store (batched policy, or an earlier failed write).
    pub async fn sweep_once(&self) -> usize {
        let outcome = self.store.sweep();
        if outcome.removed > 0 {
            debug!(removed = outcome.removed, "Swept expired sessions");
        }

        let Some(file) = &self.persistence else {
            return outcome.removed;
        };

        let lagging = file
            .last_generation()
            .map(|g| g < outcome.generation)
            .unwrap_or(true);

        let (generation, entries) = match outcome.snapshot {
            Some(entries) => (outcome.generation, entries),
            None if lagging => self.store.versioned_snapshot(),
            None => return outcome.removed,
        };

        let metrics = self.store.metrics();
        match file
            .flush_with_deadline(generation, entries, self.flush_timeout)
            .await
        {
            Ok(true) => metrics.record_flush(true),
            Ok(false) => {}
            Err(e) => {
                metrics.record_flush(false);
                warn!(error = %e, generation, "Sweeper flush failed");
            }
        }

        outcome.removed
    }

    /// Spawn the sweeper as a background task
    pub fn spawn(self) -> SweeperHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        SweeperHandle { shutdown, task }
    }
}

/// Handle to a running sweeper
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the sweeper to stop and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task.await.map_err(|e| Error::Join(e.to_string()))
    }
}
