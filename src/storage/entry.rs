//! Session Entry
//!
//! A single token's payload plus its creation and expiry timestamps.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Caller-defined session data
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Entry in the store with payload and expiration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub token: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    /// `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionEntry {
    /// Build an entry created at `now`. A zero or absent `ttl` never expires.
    pub fn new(
        token: impl Into<String>,
        payload: Payload,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Self {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));

        Self {
            token: token.into(),
            payload,
            created_at: now,
            expires_at,
        }
    }

    /// An entry is live until its expiry instant, exclusive.
    #[inline]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t > now).unwrap_or(true)
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_live_at(now)
    }

    /// Time left before expiry, clamped to zero. `None` for entries without expiry.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|t| (t - now).to_std().unwrap_or(Duration::ZERO))
    }
}
