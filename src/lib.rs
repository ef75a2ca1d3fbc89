//! sessionkv - In-Memory Session Store
//!
//! Token-keyed session payloads with TTL expiry, a background sweeper and
//! durable JSON snapshots that survive restarts.

pub mod admin;
pub mod clock;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod service;
pub mod storage;

pub use admin::{SessionStatus, SessionSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use persistence::{FlushPolicy, LoadOutcome, SnapshotFile};
pub use service::{Config, SessionService};
pub use storage::{ExpirySweeper, Payload, SessionEntry, SessionStore, SweeperHandle};
