//! Storage Engine
//!
//! In-memory session map with TTL expiry and a background sweeper.

mod entry;
mod store;
mod sweeper;

pub use entry::{Payload, SessionEntry};
pub use store::{SessionStore, StoreBuilder, SweepOutcome};
pub use sweeper::{ExpirySweeper, SweeperHandle, MIN_SWEEP_INTERVAL};
