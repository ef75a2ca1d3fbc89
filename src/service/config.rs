//! Service Configuration

use crate::persistence::FlushPolicy;
use crate::storage::MIN_SWEEP_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Snapshot file location
    pub snapshot_path: PathBuf,

    /// Load and flush the snapshot (false = purely in-memory)
    pub persistence_enabled: bool,

    /// When mutations reach the snapshot
    pub flush_policy: FlushPolicy,

    /// Upper bound for a background or shutdown flush
    pub flush_timeout: Duration,

    /// Expiry sweeper interval
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./data/sessions.json"),
            persistence_enabled: true,
            flush_policy: FlushPolicy::WriteThrough,
            flush_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Set the snapshot file location
    pub fn with_snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Keep sessions in memory only
    pub fn without_persistence(mut self) -> Self {
        self.persistence_enabled = false;
        self
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Set sweeper interval, raised to [`MIN_SWEEP_INTERVAL`] if shorter
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }
}
