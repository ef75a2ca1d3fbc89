//! Snapshot Persistence
//!
//! Full-state JSON snapshot of the session map, replaced atomically on every
//! flush.

use crate::error::{Error, Result};
use crate::storage::{Payload, SessionEntry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Snapshot file format:
/// a JSON object keyed by token, each value holding
/// `payload`, `created_at` and an optional `expires_at` (RFC 3339).
///
/// Older files name the payload `user_data` and store timestamps as
/// fractional Unix seconds; both are accepted on load.
#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    #[serde(default, alias = "user_data")]
    payload: Payload,
    #[serde(deserialize_with = "timestamp::required")]
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    expires_at: Option<DateTime<Utc>>,
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Rfc3339(DateTime<Utc>),
        UnixSeconds(f64),
    }

    impl Timestamp {
        fn into_datetime<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
            match self {
                Timestamp::Rfc3339(t) => Ok(t),
                Timestamp::UnixSeconds(secs) => {
                    let whole = secs.floor();
                    if !whole.is_finite() || whole.abs() > i64::MAX as f64 {
                        return Err(E::custom(format!("timestamp {} out of range", secs)));
                    }
                    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
                    DateTime::from_timestamp(whole as i64, nanos)
                        .ok_or_else(|| E::custom(format!("timestamp {} out of range", secs)))
                }
            }
        }
    }

    pub(super) fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Timestamp::deserialize(deserializer)?.into_datetime()
    }

    pub(super) fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Timestamp>::deserialize(deserializer)?
            .map(Timestamp::into_datetime)
            .transpose()
    }
}

#[derive(Debug, Serialize)]
struct SnapshotRecordRef<'a> {
    payload: &'a Payload,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Result of reading the snapshot at startup
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// No snapshot on disk (cold start)
    Missing,
    Loaded(Vec<SessionEntry>),
    /// Snapshot was unreadable; the store starts empty
    Corrupted { reason: String },
}

impl LoadOutcome {
    /// Entries to restore; empty unless a valid snapshot was read
    pub fn into_entries(self) -> Vec<SessionEntry> {
        match self {
            LoadOutcome::Loaded(entries) => entries,
            LoadOutcome::Missing | LoadOutcome::Corrupted { .. } => Vec::new(),
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, LoadOutcome::Corrupted { .. })
    }
}

/// Snapshot writer/reader
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    /// Serializes flushes; holds the store generation last written
    last_generation: Mutex<Option<u64>>,
}

impl SnapshotFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            last_generation: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generation of the most recent successful generation-tracked flush
    pub fn last_generation(&self) -> Option<u64> {
        *self.last_generation.lock()
    }

    /// Record that the file already reflects `generation`, e.g. right after it
    /// was loaded and restored.
    pub fn mark_synced(&self, generation: u64) {
        let mut last = self.last_generation.lock();
        if last.map(|g| g < generation).unwrap_or(true) {
            *last = Some(generation);
        }
    }

    /// Write `entries` unconditionally, outside generation ordering
    #[cfg(test)]
    pub(crate) fn flush(&self, entries: &[SessionEntry]) -> Result<()> {
        let _guard = self.last_generation.lock();
        self.write_atomic(entries)
    }

    /// Write `entries` taken at store `generation`. Returns `false` without
    /// touching the disk when a newer generation was already written.
    pub fn flush_generation(&self, generation: u64, entries: &[SessionEntry]) -> Result<bool> {
        let mut last = self.last_generation.lock();
        if last.map(|g| g >= generation).unwrap_or(false) {
            debug!(generation, "Skipping stale snapshot flush");
            return Ok(false);
        }

        self.write_atomic(entries)?;
        *last = Some(generation);
        Ok(true)
    }

    /// Run [`flush_generation`](Self::flush_generation) on the blocking pool,
    /// giving up after `deadline`.
    ///
    /// A write that misses the deadline keeps running in the background and
    /// still holds the flush lock, so later flushes cannot interleave with it.
    pub async fn flush_with_deadline(
        self: &Arc<Self>,
        generation: u64,
        entries: Vec<SessionEntry>,
        deadline: Duration,
    ) -> Result<bool> {
        let file = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || file.flush_generation(generation, &entries));

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Join(e.to_string())),
            Err(_) => Err(Error::FlushTimeout(deadline)),
        }
    }

    fn write_atomic(&self, entries: &[SessionEntry]) -> Result<()> {
        let document: BTreeMap<&str, SnapshotRecordRef<'_>> = entries
            .iter()
            .map(|e| {
                (
                    e.token.as_str(),
                    SnapshotRecordRef {
                        payload: &e.payload,
                        created_at: e.created_at,
                        expires_at: e.expires_at,
                    },
                )
            })
            .collect();
        let bytes = serde_json::to_vec_pretty(&document)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.write_error(e))?;

        // Temp file lives next to the target so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_error(e))?;
        tmp.write_all(&bytes).map_err(|e| self.write_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_error(e.error))?;

        debug!(path = %self.path.display(), entries = entries.len(), "Snapshot written");
        Ok(())
    }

    /// Load the snapshot. Never fails: a missing file is a cold start and a
    /// malformed one is reported and treated as empty.
    pub fn load(&self) -> LoadOutcome {
        match self.read() {
            Ok(None) => {
                info!(path = %self.path.display(), "No snapshot found, starting fresh");
                LoadOutcome::Missing
            }
            Ok(Some(entries)) => {
                info!(path = %self.path.display(), entries = entries.len(), "Snapshot loaded");
                LoadOutcome::Loaded(entries)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable snapshot, starting with an empty store");
                self.quarantine();
                LoadOutcome::Corrupted {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn read(&self) -> Result<Option<Vec<SessionEntry>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corruption(e)),
        };

        let document: BTreeMap<String, SnapshotRecord> =
            serde_json::from_slice(&bytes).map_err(|e| self.corruption(e))?;

        let entries = document
            .into_iter()
            .map(|(token, record)| SessionEntry {
                token,
                payload: record.payload,
                created_at: record.created_at,
                expires_at: record.expires_at,
            })
            .collect();

        Ok(Some(entries))
    }

    /// Move a bad snapshot aside so the next flush does not overwrite it
    fn quarantine(&self) {
        let target = self.quarantine_path();
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(path = %target.display(), "Moved unreadable snapshot aside"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "Could not move unreadable snapshot aside"),
        }
    }

    pub(crate) fn quarantine_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    fn write_error(&self, source: io::Error) -> Error {
        Error::PersistenceWrite {
            path: self.path.clone(),
            source,
        }
    }

    fn corruption(&self, reason: impl std::fmt::Display) -> Error {
        Error::PersistenceCorruption {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
