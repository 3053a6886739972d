//! Dateback operation log model and its persisted form.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{DatebackError, DatebackResult},
    types::{QualifiedKey, TIMESTAMP_INFINITY, Timestamp, WallClockMs, now_ms},
};

/// Version number for serialized [`StoredOperationEnvelope`] payloads.
pub const OPERATION_FORMAT_VERSION: u16 = 1;

/// Globally unique identifier of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, e.g. one read back from a dump.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payload of one logical edit.
///
/// Purge ranges are half-open: `[from_timestamp, to_timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// A single version of a key was removed.
    PurgeEntry {
        /// Version timestamp that was purged.
        timestamp: Timestamp,
        /// Keyspace of the purged key.
        keyspace: String,
        /// Purged key.
        key: String,
    },
    /// Versions of a key within a range were removed.
    PurgeKey {
        /// Keyspace of the purged key.
        keyspace: String,
        /// Purged key.
        key: String,
        /// Inclusive lower bound of purged versions.
        from_timestamp: Timestamp,
        /// Exclusive upper bound of purged versions.
        to_timestamp: Timestamp,
    },
    /// Versions of every key in a keyspace within a range were removed.
    PurgeKeyspace {
        /// Purged keyspace.
        keyspace: String,
        /// Inclusive lower bound of purged versions.
        from_timestamp: Timestamp,
        /// Exclusive upper bound of purged versions.
        to_timestamp: Timestamp,
    },
    /// Whole commits were removed.
    PurgeCommits {
        /// Timestamps of the purged commits.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// Entries were written at a past timestamp.
    InjectEntries {
        /// Target timestamp of the injection.
        timestamp: Timestamp,
        /// Keys written by the injection.
        injected_keys: BTreeSet<QualifiedKey>,
        /// True when commit metadata at the timestamp was overwritten.
        commit_metadata_override: bool,
    },
    /// A single version of a key was rewritten.
    TransformEntry {
        /// Keyspace of the transformed key.
        keyspace: String,
        /// Transformed key.
        key: String,
        /// Timestamps of the rewritten versions.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// Every version of a key was passed through a transformation.
    TransformValuesOfKey {
        /// Keyspace of the transformed key.
        keyspace: String,
        /// Transformed key.
        key: String,
        /// Timestamps of the rewritten versions.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// The entry set of one commit was rewritten.
    TransformCommit {
        /// Timestamp of the rewritten commit.
        commit_timestamp: Timestamp,
    },
    /// Every value in a keyspace was passed through a transformation.
    TransformValuesOfKeyspace {
        /// Transformed keyspace.
        keyspace: String,
        /// Lowest timestamp at which a value changed.
        earliest_affected_timestamp: Timestamp,
    },
    /// Metadata of one commit was replaced.
    UpdateCommitMetadata {
        /// Timestamp of the updated commit.
        commit_timestamp: Timestamp,
    },
}

impl OperationKind {
    /// Whether a read at logical time `timestamp` observes this edit.
    ///
    /// Monotonic for every variant except [`OperationKind::UpdateCommitMetadata`], which
    /// only affects its own commit.
    pub fn affects_timestamp(&self, timestamp: Timestamp) -> bool {
        match self {
            Self::UpdateCommitMetadata { commit_timestamp } => timestamp == *commit_timestamp,
            Self::PurgeCommits { commit_timestamps }
            | Self::TransformEntry {
                commit_timestamps, ..
            }
            | Self::TransformValuesOfKey {
                commit_timestamps, ..
            } => commit_timestamps
                .first()
                .is_some_and(|min| timestamp >= *min),
            Self::PurgeEntry { .. }
            | Self::PurgeKey { .. }
            | Self::PurgeKeyspace { .. }
            | Self::InjectEntries { .. }
            | Self::TransformCommit { .. }
            | Self::TransformValuesOfKeyspace { .. } => {
                timestamp >= self.earliest_affected_timestamp()
            }
        }
    }

    /// Lowest logical timestamp touched by this edit, [`TIMESTAMP_INFINITY`] for empty sets.
    pub fn earliest_affected_timestamp(&self) -> Timestamp {
        match self {
            Self::PurgeEntry { timestamp, .. } | Self::InjectEntries { timestamp, .. } => {
                *timestamp
            }
            Self::PurgeKey { from_timestamp, .. } | Self::PurgeKeyspace { from_timestamp, .. } => {
                *from_timestamp
            }
            Self::PurgeCommits { commit_timestamps }
            | Self::TransformEntry {
                commit_timestamps, ..
            }
            | Self::TransformValuesOfKey {
                commit_timestamps, ..
            } => commit_timestamps
                .first()
                .copied()
                .unwrap_or(TIMESTAMP_INFINITY),
            Self::TransformCommit { commit_timestamp }
            | Self::UpdateCommitMetadata { commit_timestamp } => *commit_timestamp,
            Self::TransformValuesOfKeyspace {
                earliest_affected_timestamp,
                ..
            } => *earliest_affected_timestamp,
        }
    }

    /// Short variant name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PurgeEntry { .. } => "PurgeEntry",
            Self::PurgeKey { .. } => "PurgeKey",
            Self::PurgeKeyspace { .. } => "PurgeKeyspace",
            Self::PurgeCommits { .. } => "PurgeCommits",
            Self::InjectEntries { .. } => "InjectEntries",
            Self::TransformEntry { .. } => "TransformEntry",
            Self::TransformValuesOfKey { .. } => "TransformValuesOfKey",
            Self::TransformCommit { .. } => "TransformCommit",
            Self::TransformValuesOfKeyspace { .. } => "TransformValuesOfKeyspace",
            Self::UpdateCommitMetadata { .. } => "UpdateCommitMetadata",
        }
    }

    fn validate(&self) -> DatebackResult<()> {
        match self {
            Self::PurgeEntry { keyspace, key, .. }
            | Self::TransformEntry { keyspace, key, .. }
            | Self::TransformValuesOfKey { keyspace, key, .. } => {
                require_name("keyspace", keyspace)?;
                require_name("key", key)
            }
            Self::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            } => {
                require_name("keyspace", keyspace)?;
                require_name("key", key)?;
                require_range(*from_timestamp, *to_timestamp)
            }
            Self::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            } => {
                require_name("keyspace", keyspace)?;
                require_range(*from_timestamp, *to_timestamp)
            }
            Self::InjectEntries { injected_keys, .. } => {
                for qk in injected_keys {
                    require_name("keyspace", &qk.keyspace)?;
                    require_name("key", &qk.key)?;
                }
                Ok(())
            }
            Self::TransformValuesOfKeyspace { keyspace, .. } => require_name("keyspace", keyspace),
            Self::PurgeCommits { .. }
            | Self::TransformCommit { .. }
            | Self::UpdateCommitMetadata { .. } => Ok(()),
        }
    }
}

pub(crate) fn require_name(what: &str, value: &str) -> DatebackResult<()> {
    if value.is_empty() {
        return Err(DatebackError::precondition(format!("{what} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_range(from: Timestamp, to: Timestamp) -> DatebackResult<()> {
    if from > to {
        return Err(DatebackError::precondition(format!(
            "range start {from} is after range end {to}"
        )));
    }
    Ok(())
}

/// Immutable audit record of one dateback edit.
///
/// Equality and hashing consider the [`OperationId`] only.
#[derive(Debug, Clone)]
pub struct DatebackOperation {
    id: OperationId,
    branch: String,
    wall_clock_time: WallClockMs,
    kind: OperationKind,
}

impl DatebackOperation {
    /// Creates a record with a fresh id stamped with the current wall-clock time.
    pub fn new(branch: impl Into<String>, kind: OperationKind) -> DatebackResult<Self> {
        Self::restore(OperationId::generate(), branch, now_ms(), kind)
    }

    /// Rebuilds a record from previously persisted parts, validating them like a fresh one.
    pub fn restore(
        id: OperationId,
        branch: impl Into<String>,
        wall_clock_time: WallClockMs,
        kind: OperationKind,
    ) -> DatebackResult<Self> {
        let branch = branch.into();
        require_name("branch", &branch)?;
        kind.validate()?;
        Ok(Self {
            id,
            branch,
            wall_clock_time,
            kind,
        })
    }

    /// Unique id of this record.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Branch on which the edit was performed.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Wall-clock creation time in epoch milliseconds.
    pub fn wall_clock_time(&self) -> WallClockMs {
        self.wall_clock_time
    }

    /// Edit payload.
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// See [`OperationKind::affects_timestamp`].
    pub fn affects_timestamp(&self, timestamp: Timestamp) -> bool {
        self.kind.affects_timestamp(timestamp)
    }

    /// See [`OperationKind::earliest_affected_timestamp`].
    pub fn earliest_affected_timestamp(&self) -> Timestamp {
        self.kind.earliest_affected_timestamp()
    }
}

impl PartialEq for DatebackOperation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DatebackOperation {}

impl Hash for DatebackOperation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for DatebackOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.kind.name(), self.branch)?;
        match &self.kind {
            OperationKind::PurgeEntry {
                timestamp,
                keyspace,
                key,
            } => write!(f, "{keyspace}->{key}@{timestamp}"),
            OperationKind::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            } => write!(f, "{keyspace}->{key} [{from_timestamp}, {to_timestamp})"),
            OperationKind::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            } => write!(f, "{keyspace} [{from_timestamp}, {to_timestamp})"),
            OperationKind::PurgeCommits { commit_timestamps } => {
                write!(f, "{commit_timestamps:?}")
            }
            OperationKind::InjectEntries {
                timestamp,
                injected_keys,
                commit_metadata_override,
            } => write!(
                f,
                "{} key(s)@{timestamp}, metadata override: {commit_metadata_override}",
                injected_keys.len()
            ),
            OperationKind::TransformEntry {
                keyspace,
                key,
                commit_timestamps,
            }
            | OperationKind::TransformValuesOfKey {
                keyspace,
                key,
                commit_timestamps,
            } => write!(f, "{keyspace}->{key}@{commit_timestamps:?}"),
            OperationKind::TransformCommit { commit_timestamp }
            | OperationKind::UpdateCommitMetadata { commit_timestamp } => {
                write!(f, "@{commit_timestamp}")
            }
            OperationKind::TransformValuesOfKeyspace {
                keyspace,
                earliest_affected_timestamp,
            } => write!(f, "{keyspace} from {earliest_affected_timestamp}"),
        }
    }
}

/// Stable on-disk shape of an [`OperationKind`].
///
/// Tags never change once written. Retired shapes stay readable and are upcast on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistedKind {
    /// Current purge-entry shape.
    PurgeEntry {
        /// Version timestamp.
        timestamp: Timestamp,
        /// Keyspace name.
        keyspace: String,
        /// Key name.
        key: String,
    },
    /// Current purge-key shape.
    PurgeKey {
        /// Keyspace name.
        keyspace: String,
        /// Key name.
        key: String,
        /// Inclusive lower bound.
        from_timestamp: Timestamp,
        /// Exclusive upper bound.
        to_timestamp: Timestamp,
    },
    /// Current purge-keyspace shape.
    PurgeKeyspace {
        /// Keyspace name.
        keyspace: String,
        /// Inclusive lower bound.
        from_timestamp: Timestamp,
        /// Exclusive upper bound.
        to_timestamp: Timestamp,
    },
    /// Current purge-commits shape.
    PurgeCommits {
        /// Commit timestamps.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// Current inject shape.
    InjectEntries {
        /// Target timestamp.
        timestamp: Timestamp,
        /// Injected keys.
        injected_keys: BTreeSet<QualifiedKey>,
        /// Metadata override flag.
        commit_metadata_override: bool,
    },
    /// Current transform-entry shape, one or more commit timestamps.
    #[serde(rename = "transform_entry_v2")]
    TransformEntry {
        /// Keyspace name.
        keyspace: String,
        /// Key name.
        key: String,
        /// Rewritten version timestamps.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// Retired transform-entry shape carrying a single commit timestamp. Read-only.
    #[serde(rename = "transform_entry")]
    LegacyTransformEntry {
        /// Keyspace name.
        keyspace: String,
        /// Key name.
        key: String,
        /// Rewritten version timestamp.
        commit_timestamp: Timestamp,
    },
    /// Current transform-values-of-key shape.
    TransformValuesOfKey {
        /// Keyspace name.
        keyspace: String,
        /// Key name.
        key: String,
        /// Rewritten version timestamps.
        commit_timestamps: BTreeSet<Timestamp>,
    },
    /// Current transform-commit shape.
    TransformCommit {
        /// Commit timestamp.
        commit_timestamp: Timestamp,
    },
    /// Current transform-values-of-keyspace shape.
    TransformValuesOfKeyspace {
        /// Keyspace name.
        keyspace: String,
        /// Lowest changed timestamp.
        earliest_affected_timestamp: Timestamp,
    },
    /// Current update-commit-metadata shape.
    UpdateCommitMetadata {
        /// Commit timestamp.
        commit_timestamp: Timestamp,
    },
}

impl PersistedKind {
    /// Stable tag written to storage.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PurgeEntry { .. } => "purge_entry",
            Self::PurgeKey { .. } => "purge_key",
            Self::PurgeKeyspace { .. } => "purge_keyspace",
            Self::PurgeCommits { .. } => "purge_commits",
            Self::InjectEntries { .. } => "inject_entries",
            Self::TransformEntry { .. } => "transform_entry_v2",
            Self::LegacyTransformEntry { .. } => "transform_entry",
            Self::TransformValuesOfKey { .. } => "transform_values_of_key",
            Self::TransformCommit { .. } => "transform_commit",
            Self::TransformValuesOfKeyspace { .. } => "transform_values_of_keyspace",
            Self::UpdateCommitMetadata { .. } => "update_commit_metadata",
        }
    }

    /// Upcasts into the live model. Retired shapes map onto their successor.
    pub fn into_kind(self) -> OperationKind {
        match self {
            Self::PurgeEntry {
                timestamp,
                keyspace,
                key,
            } => OperationKind::PurgeEntry {
                timestamp,
                keyspace,
                key,
            },
            Self::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            } => OperationKind::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            },
            Self::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            } => OperationKind::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            },
            Self::PurgeCommits { commit_timestamps } => {
                OperationKind::PurgeCommits { commit_timestamps }
            }
            Self::InjectEntries {
                timestamp,
                injected_keys,
                commit_metadata_override,
            } => OperationKind::InjectEntries {
                timestamp,
                injected_keys,
                commit_metadata_override,
            },
            Self::TransformEntry {
                keyspace,
                key,
                commit_timestamps,
            } => OperationKind::TransformEntry {
                keyspace,
                key,
                commit_timestamps,
            },
            Self::LegacyTransformEntry {
                keyspace,
                key,
                commit_timestamp,
            } => OperationKind::TransformEntry {
                keyspace,
                key,
                commit_timestamps: BTreeSet::from([commit_timestamp]),
            },
            Self::TransformValuesOfKey {
                keyspace,
                key,
                commit_timestamps,
            } => OperationKind::TransformValuesOfKey {
                keyspace,
                key,
                commit_timestamps,
            },
            Self::TransformCommit { commit_timestamp } => {
                OperationKind::TransformCommit { commit_timestamp }
            }
            Self::TransformValuesOfKeyspace {
                keyspace,
                earliest_affected_timestamp,
            } => OperationKind::TransformValuesOfKeyspace {
                keyspace,
                earliest_affected_timestamp,
            },
            Self::UpdateCommitMetadata { commit_timestamp } => {
                OperationKind::UpdateCommitMetadata { commit_timestamp }
            }
        }
    }
}

impl From<&OperationKind> for PersistedKind {
    fn from(kind: &OperationKind) -> Self {
        match kind.clone() {
            OperationKind::PurgeEntry {
                timestamp,
                keyspace,
                key,
            } => Self::PurgeEntry {
                timestamp,
                keyspace,
                key,
            },
            OperationKind::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            } => Self::PurgeKey {
                keyspace,
                key,
                from_timestamp,
                to_timestamp,
            },
            OperationKind::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            } => Self::PurgeKeyspace {
                keyspace,
                from_timestamp,
                to_timestamp,
            },
            OperationKind::PurgeCommits { commit_timestamps } => {
                Self::PurgeCommits { commit_timestamps }
            }
            OperationKind::InjectEntries {
                timestamp,
                injected_keys,
                commit_metadata_override,
            } => Self::InjectEntries {
                timestamp,
                injected_keys,
                commit_metadata_override,
            },
            OperationKind::TransformEntry {
                keyspace,
                key,
                commit_timestamps,
            } => Self::TransformEntry {
                keyspace,
                key,
                commit_timestamps,
            },
            OperationKind::TransformValuesOfKey {
                keyspace,
                key,
                commit_timestamps,
            } => Self::TransformValuesOfKey {
                keyspace,
                key,
                commit_timestamps,
            },
            OperationKind::TransformCommit { commit_timestamp } => {
                Self::TransformCommit { commit_timestamp }
            }
            OperationKind::TransformValuesOfKeyspace {
                keyspace,
                earliest_affected_timestamp,
            } => Self::TransformValuesOfKeyspace {
                keyspace,
                earliest_affected_timestamp,
            },
            OperationKind::UpdateCommitMetadata { commit_timestamp } => {
                Self::UpdateCommitMetadata { commit_timestamp }
            }
        }
    }
}

/// Journal row: record identity plus persisted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOperation {
    /// Record id.
    pub id: OperationId,
    /// Branch of the edit.
    pub branch: String,
    /// Wall-clock creation time.
    pub wall_clock_time: WallClockMs,
    /// Tagged payload.
    pub operation: PersistedKind,
}

impl StoredOperation {
    /// Validates and upcasts into a live record.
    pub fn into_operation(self) -> DatebackResult<DatebackOperation> {
        DatebackOperation::restore(
            self.id,
            self.branch,
            self.wall_clock_time,
            self.operation.into_kind(),
        )
    }
}

impl From<&DatebackOperation> for StoredOperation {
    fn from(op: &DatebackOperation) -> Self {
        Self {
            id: op.id,
            branch: op.branch.clone(),
            wall_clock_time: op.wall_clock_time,
            operation: PersistedKind::from(&op.kind),
        }
    }
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOperationEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped record.
    pub stored: StoredOperation,
}

impl StoredOperationEnvelope {
    /// Constructs an envelope using [`OPERATION_FORMAT_VERSION`].
    pub fn new(stored: StoredOperation) -> Self {
        Self {
            format_version: OPERATION_FORMAT_VERSION,
            stored,
        }
    }
}
