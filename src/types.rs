//! Shared primitive types for logical time, keys, and values.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Logical versioning timestamp in milliseconds.
pub type Timestamp = u64;
/// Wall-clock epoch milliseconds, used for audit ordering only.
pub type WallClockMs = u64;
/// Opaque stored value. `None` at a version position is a tombstone.
pub type Value = Vec<u8>;

/// Sentinel for "no timestamp touched yet" and for the minimum of an empty set.
pub const TIMESTAMP_INFINITY: Timestamp = Timestamp::MAX;

/// Name of the root branch.
pub const MASTER_BRANCH: &str = "master";

/// Keyspace used when callers do not name one.
pub const DEFAULT_KEYSPACE: &str = "default";

/// A key qualified by the keyspace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedKey {
    /// Keyspace name.
    pub keyspace: String,
    /// Key within the keyspace.
    pub key: String,
}

impl QualifiedKey {
    /// Builds a qualified key from its parts.
    pub fn new(keyspace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.keyspace, self.key)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> WallClockMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
