//! Administrative Listing
//!
//! Read-only view of the session map for operators: remaining lifetime and
//! status derived from a snapshot.

use crate::storage::{Payload, SessionEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Derived session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Active,
    Expired,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// One row of the listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub token: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// `expires_at - now` clamped to zero; `None` for sessions without expiry
    pub remaining_secs: Option<u64>,
    pub status: SessionStatus,
}

impl SessionSummary {
    pub fn from_entry(entry: &SessionEntry, now: DateTime<Utc>) -> Self {
        let status = if entry.is_live_at(now) {
            SessionStatus::Active
        } else {
            SessionStatus::Expired
        };

        Self {
            token: entry.token.clone(),
            payload: entry.payload.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            remaining_secs: entry.remaining_at(now).map(|d| d.as_secs()),
            status,
        }
    }
}

/// Summarise every entry of a snapshot as seen at `now`
pub fn listing(entries: &[SessionEntry], now: DateTime<Utc>) -> Vec<SessionSummary> {
    entries
        .iter()
        .map(|e| SessionSummary::from_entry(e, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_listing_status_and_remaining() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let payload = json!({"user": "alice"}).as_object().cloned().unwrap();
        let entries = vec![
            SessionEntry::new("short", payload.clone(), t0, Some(Duration::from_secs(5))),
            SessionEntry::new("long", payload.clone(), t0, Some(Duration::from_secs(300))),
            SessionEntry::new("forever", payload, t0, None),
        ];

        let rows = listing(&entries, t0 + chrono::Duration::seconds(10));

        assert_eq!(rows[0].status, SessionStatus::Expired);
        assert_eq!(rows[0].remaining_secs, Some(0));
        assert_eq!(rows[1].status, SessionStatus::Active);
        assert_eq!(rows[1].remaining_secs, Some(290));
        assert_eq!(rows[2].status, SessionStatus::Active);
        assert_eq!(rows[2].remaining_secs, None);
    }

    #[test]
    fn test_summary_serializes() {
        let entry = SessionEntry::new("tok", Payload::new(), DateTime::<Utc>::UNIX_EPOCH, None);
        let row = SessionSummary::from_entry(&entry, DateTime::<Utc>::UNIX_EPOCH);

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["status"], json!("Active"));
        assert!(value.get("expires_at").is_none());
    }
}
