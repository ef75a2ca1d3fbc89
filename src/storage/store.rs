//! In-Memory Session Store
//!
//! Token → entry map behind a single exclusive lock. Every operation holds
//! the lock for its full duration; snapshot writes happen after it is
//! released, on a copy taken inside the critical section.

use super::entry::{Payload, SessionEntry};
use crate::admin::{self, SessionSummary};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::persistence::{FlushPolicy, SnapshotFile};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<String, SessionEntry>,
    /// Bumped by every mutation, used to order snapshot flushes
    generation: u64,
}

impl State {
    fn entries(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self.sessions.values().cloned().collect();
        entries.sort_by(|a, b| a.token.cmp(&b.token));
        entries
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    persistence: Option<Arc<SnapshotFile>>,
    flush_policy: FlushPolicy,
    metrics: Arc<Metrics>,
}

/// Copy of the map awaiting a write-through flush
type PendingFlush = Option<(u64, Vec<SessionEntry>)>;

enum Lookup {
    Hit(Payload),
    Expired,
    Miss,
}

/// Result of one sweep pass
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub removed: usize,
    /// Store generation after the sweep
    pub generation: u64,
    /// State right after eviction, present only when something was removed
    pub snapshot: Option<Vec<SessionEntry>>,
}

/// Builder for [`SessionStore`]
#[derive(Debug)]
pub struct StoreBuilder {
    clock: Arc<dyn Clock>,
    persistence: Option<Arc<SnapshotFile>>,
    flush_policy: FlushPolicy,
    metrics: Arc<Metrics>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            persistence: None,
            flush_policy: FlushPolicy::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

impl StoreBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a snapshot file. Under [`FlushPolicy::WriteThrough`] every
    /// mutation is flushed before the call returns.
    pub fn with_persistence(mut self, file: Arc<SnapshotFile>, policy: FlushPolicy) -> Self {
        self.persistence = Some(file);
        self.flush_policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> SessionStore {
        SessionStore {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                clock: self.clock,
                persistence: self.persistence,
                flush_policy: self.flush_policy,
                metrics: self.metrics,
            }),
        }
    }
}

/// Thread-safe session store handle. Clones share the same map.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// In-memory store on the system clock, without persistence
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Insert or replace the session for `token`. A zero or absent `ttl`
    /// never expires.
    pub fn create(&self, token: impl Into<String>, payload: Payload, ttl: Option<Duration>) {
        let start = Instant::now();
        let token = token.into();

        let pending = {
            let mut state = self.inner.state.lock();
            let entry = SessionEntry::new(token.clone(), payload, self.inner.clock.now(), ttl);
            state.sessions.insert(token, entry);
            state.generation += 1;
            self.pending_flush(&state)
        };

        self.flush_now(pending);
        self.inner.metrics.record_operation("create", start.elapsed());
    }

    /// Payload of a live session. An expired entry is evicted in the same
    /// critical section that observed it.
    pub fn get(&self, token: &str) -> Option<Payload> {
        let start = Instant::now();

        let (result, pending) = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();

            let lookup = match state.sessions.get(token) {
                Some(entry) if entry.is_live_at(now) => Lookup::Hit(entry.payload.clone()),
                Some(_) => Lookup::Expired,
                None => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(payload) => (Some(payload), None),
                Lookup::Miss => (None, None),
                Lookup::Expired => {
                    state.sessions.remove(token);
                    state.generation += 1;
                    self.inner.metrics.record_lazy_eviction();
                    debug!(token, "Evicted expired session on read");
                    (None, self.pending_flush(&state))
                }
            }
        };

        self.flush_now(pending);
        self.inner.metrics.record_operation("get", start.elapsed());
        result
    }

    /// Like [`get`](Self::get), but a missing session is an [`Error::NotFound`]
    pub fn fetch(&self, token: &str) -> Result<Payload> {
        self.get(token)
            .ok_or_else(|| Error::NotFound(token.to_string()))
    }

    /// Remove the session if present. Returns whether it existed.
    pub fn delete(&self, token: &str) -> bool {
        let start = Instant::now();

        let (existed, pending) = {
            let mut state = self.inner.state.lock();
            if state.sessions.remove(token).is_some() {
                state.generation += 1;
                (true, self.pending_flush(&state))
            } else {
                (false, None)
            }
        };

        self.flush_now(pending);
        self.inner.metrics.record_operation("delete", start.elapsed());
        existed
    }

    /// Point-in-time copy of every entry, including expired ones not yet
    /// swept, ordered by token.
    pub fn snapshot(&self) -> Vec<SessionEntry> {
        self.inner.state.lock().entries()
    }

    /// Snapshot together with the generation it reflects
    pub fn versioned_snapshot(&self) -> (u64, Vec<SessionEntry>) {
        let state = self.inner.state.lock();
        (state.generation, state.entries())
    }

    /// Replace the whole map. Meant for startup, before callers are admitted.
    pub fn restore(&self, entries: impl IntoIterator<Item = SessionEntry>) {
        let mut state = self.inner.state.lock();
        state.sessions = entries
            .into_iter()
            .map(|e| (e.token.clone(), e))
            .collect();
        state.generation += 1;
        debug!(entries = state.sessions.len(), "Store restored");
    }

    /// Evict every expired entry under one lock acquisition
    pub fn sweep(&self) -> SweepOutcome {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now();

        let before = state.sessions.len();
        state.sessions.retain(|_, entry| entry.is_live_at(now));
        let removed = before - state.sessions.len();

        let snapshot = if removed > 0 {
            state.generation += 1;
            self.inner.metrics.record_swept(removed);
            Some(state.entries())
        } else {
            None
        };

        SweepOutcome {
            removed,
            generation: state.generation,
            snapshot,
        }
    }

    /// Administrative view with remaining lifetime and status
    pub fn listing(&self) -> Vec<SessionSummary> {
        let (now, entries) = {
            let state = self.inner.state.lock();
            (self.inner.clock.now(), state.entries())
        };
        admin::listing(&entries, now)
    }

    /// Number of entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.inner.flush_policy
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    fn pending_flush(&self, state: &State) -> PendingFlush {
        match (&self.inner.persistence, self.inner.flush_policy) {
            (Some(_), FlushPolicy::WriteThrough) => Some((state.generation, state.entries())),
            _ => None,
        }
    }

    /// Persistence failures are logged and counted, never surfaced to the
    /// mutating caller.
    fn flush_now(&self, pending: PendingFlush) {
        let (Some(file), Some((generation, entries))) = (&self.inner.persistence, pending) else {
            return;
        };

        match file.flush_generation(generation, &entries) {
            Ok(true) => self.inner.metrics.record_flush(true),
            Ok(false) => {}
            Err(e) => {
                self.inner.metrics.record_flush(false);
                warn!(error = %e, generation, "Write-through flush failed, in-memory state kept");
            }
        }
    }
}
