//! Session Service
//!
//! Process bootstrap around the store: restores the snapshot exactly once,
//! starts the expiry sweeper, and tears both down in order on shutdown.

mod config;

pub use config::Config;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::persistence::{LoadOutcome, SnapshotFile};
use crate::storage::{ExpirySweeper, SessionStore, SweeperHandle};
use std::sync::Arc;
use tracing::{error, info};

/// Running session store with its background sweeper
#[derive(Debug)]
pub struct SessionService {
    config: Config,
    store: SessionStore,
    persistence: Option<Arc<SnapshotFile>>,
    sweeper: SweeperHandle,
    restored: usize,
    snapshot_corrupted: bool,
}

impl SessionService {
    /// Start on the system clock. Must be called from within a Tokio runtime.
    pub fn start(config: Config) -> Self {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    pub fn start_with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let persistence = config
            .persistence_enabled
            .then(|| Arc::new(SnapshotFile::new(&config.snapshot_path)));

        let mut builder = SessionStore::builder()
            .with_clock(clock)
            .with_metrics(Arc::new(Metrics::new()));
        if let Some(file) = &persistence {
            builder = builder.with_persistence(file.clone(), config.flush_policy);
        }
        let store = builder.build();

        // Restore before any caller can reach the store
        let outcome = match &persistence {
            Some(file) => file.load(),
            None => LoadOutcome::Missing,
        };
        let snapshot_corrupted = outcome.is_corrupted();
        let entries = outcome.into_entries();
        let restored = entries.len();
        store.restore(entries);

        // A missing or set-aside file already matches the empty store, so the
        // first write waits for a real change
        if let Some(file) = &persistence {
            file.mark_synced(store.generation());
        }

        let mut sweeper = ExpirySweeper::new(store.clone(), config.sweep_interval);
        if let Some(file) = &persistence {
            sweeper = sweeper.with_persistence(file.clone(), config.flush_timeout);
        }
        let sweeper = sweeper.spawn();

        info!(
            restored,
            persistence = config.persistence_enabled,
            flush_policy = %config.flush_policy,
            "Session service started"
        );

        Self {
            config,
            store,
            persistence,
            sweeper,
            restored,
            snapshot_corrupted,
        }
    }

    /// Handle for transport-layer callers
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entries restored from the snapshot at startup
    pub fn restored(&self) -> usize {
        self.restored
    }

    /// Whether the startup snapshot was unreadable and ignored
    pub fn snapshot_corrupted(&self) -> bool {
        self.snapshot_corrupted
    }

    /// Stop and join the sweeper, then write a final snapshot.
    ///
    /// The final flush runs even if the sweeper task failed; that failure is
    /// returned afterwards.
    pub async fn shutdown(self) -> Result<()> {
        let sweeper_result = self.sweeper.shutdown().await;
        if let Err(e) = &sweeper_result {
            error!(error = %e, "Expiry sweeper terminated abnormally");
        }

        let flush_result = match &self.persistence {
            Some(file) => {
                let (generation, entries) = self.store.versioned_snapshot();
                file.flush_with_deadline(generation, entries, self.config.flush_timeout)
                    .await
            }
            None => Ok(false),
        };
        match &flush_result {
            Ok(true) => self.store.metrics().record_flush(true),
            Ok(false) => {}
            Err(e) => {
                self.store.metrics().record_flush(false);
                error!(error = %e, "Final snapshot flush failed");
            }
        }

        info!(metrics = %self.store.metrics().summary(), "Session service stopped");
        flush_result?;
        sweeper_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::FlushPolicy;
    use crate::storage::Payload;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn payload(user: &str) -> Payload {
        json!({ "user": user }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_restart_restores_sessions() {
        let dir = tempdir().unwrap();
        let config = Config::default().with_snapshot_path(dir.path().join("sessions.json"));

        let service = SessionService::start(config.clone());
        assert_eq!(service.restored(), 0);
        service.store().create("tok", payload("alice"), Some(Duration::from_secs(3600)));
        service.store().create("forever", payload("bob"), None);
        service.shutdown().await.unwrap();

        let service = SessionService::start(config);
        assert_eq!(service.restored(), 2);
        assert_eq!(service.store().get("tok"), Some(payload("alice")));
        assert_eq!(service.store().get("forever"), Some(payload("bob")));
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batched_policy_flushes_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let config = Config::default()
            .with_snapshot_path(&path)
            .with_flush_policy(FlushPolicy::Batched)
            .with_sweep_interval(Duration::from_secs(3600));

        let service = SessionService::start(config);
        // Let the sweeper's immediate first tick settle
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.store().create("tok", payload("alice"), None);
        service.shutdown().await.unwrap();

        let entries = SnapshotFile::new(&path).load().into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "tok");
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_keeps_batched_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let config = Config::default()
            .with_snapshot_path(&path)
            .with_flush_policy(FlushPolicy::Batched)
            .with_sweep_interval(Duration::ZERO);
        assert!(config.sweep_interval > Duration::ZERO);

        let service = SessionService::start(config);
        service.store().create("tok", payload("alice"), None);
        service.shutdown().await.unwrap();

        let entries = SnapshotFile::new(&path).load().into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "tok");
    }

    #[tokio::test]
    async fn test_cold_start_does_not_write_empty_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let config = Config::default()
            .with_snapshot_path(&path)
            .with_sweep_interval(Duration::from_millis(10));

        let service = SessionService::start(config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!path.exists());

        service.store().create("tok", payload("alice"), None);
        assert!(path.exists());
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let service = SessionService::start(Config::default().with_snapshot_path(&path));
        assert!(service.snapshot_corrupted());
        assert!(service.store().is_empty());

        service.store().create("tok", payload("alice"), None);
        assert_eq!(service.store().get("tok"), Some(payload("alice")));
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept_after_restore() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let clock = Arc::new(ManualClock::default());
        let config = Config::default()
            .with_snapshot_path(&path)
            .with_sweep_interval(Duration::from_millis(10));

        let service = SessionService::start_with_clock(config.clone(), clock.clone());
        service.store().create("short", payload("alice"), Some(Duration::from_secs(5)));
        service.store().create("keep", payload("bob"), None);
        service.shutdown().await.unwrap();

        clock.advance(Duration::from_secs(10));
        let service = SessionService::start_with_clock(config, clock);
        assert_eq!(service.restored(), 2);

        for _ in 0..100 {
            if service.store().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.store().len(), 1);
        service.shutdown().await.unwrap();

        let entries = SnapshotFile::new(&path).load().into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "keep");
    }

    #[test]
    fn test_in_memory_service() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();

        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let service = SessionService::start(
            Config::default().with_snapshot_path(&path).without_persistence(),
        );
        service.store().create("tok", payload("alice"), None);

        tokio_test::block_on(service.shutdown()).unwrap();
        assert!(!path.exists());
    }
}
