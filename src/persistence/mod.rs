//! Persistence Module
//!
//! Durable JSON snapshot of the session map.

mod snapshot;

pub use snapshot::{LoadOutcome, SnapshotFile};

use std::fmt;
use std::str::FromStr;

/// When mutations reach the snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Flush after every mutation (every change durable, highest I/O cost)
    #[default]
    WriteThrough,
    /// Flush from the sweeper and on shutdown (fewer writes, brief durability gap)
    Batched,
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPolicy::WriteThrough => write!(f, "write-through"),
            FlushPolicy::Batched => write!(f, "batched"),
        }
    }
}

impl FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "write-through" | "writethrough" | "always" => Ok(FlushPolicy::WriteThrough),
            "batched" | "sweep" => Ok(FlushPolicy::Batched),
            other => Err(format!(
                "unknown flush policy '{}', expected 'write-through' or 'batched'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_policy_parse() {
        assert_eq!("write-through".parse(), Ok(FlushPolicy::WriteThrough));
        assert_eq!("Batched".parse(), Ok(FlushPolicy::Batched));
        assert!("sometimes".parse::<FlushPolicy>().is_err());
        assert_eq!(FlushPolicy::Batched.to_string(), "batched");
    }
}
