use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::DatebackResult,
    types::{QualifiedKey, Timestamp, Value},
};

/// Changed logical timestamps reported by a backend primitive. Empty means no-op.
pub type ChangedTimestamps = BTreeSet<Timestamp>;

/// Entries of one commit. `None` values are tombstones.
pub type CommitEntries = BTreeMap<QualifiedKey, Option<Value>>;

/// Outcome of a per-value transformation callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueTransformation {
    /// Keep the stored value untouched.
    Unchanged,
    /// Replace the stored value.
    Replace(Value),
    /// Replace the stored value with a tombstone.
    Delete,
}

/// Predicate over one version of a key: `(timestamp, value)`.
pub type VersionPredicate<'a> = dyn Fn(Timestamp, Option<&Value>) -> bool + 'a;
/// Predicate over one version within a keyspace: `(key, timestamp, value)`.
pub type KeyspaceVersionPredicate<'a> = dyn Fn(&str, Timestamp, Option<&Value>) -> bool + 'a;
/// Transformation of a single version: `value -> outcome`.
pub type EntryTransform<'a> = dyn Fn(Option<&Value>) -> ValueTransformation + 'a;
/// Transformation of every version of a key: `(timestamp, value) -> outcome`.
pub type KeyValuesTransform<'a> = dyn Fn(Timestamp, &Value) -> ValueTransformation + 'a;
/// Transformation of a whole commit: `entries -> entries`.
pub type CommitTransform<'a> = dyn Fn(&CommitEntries) -> CommitEntries + 'a;
/// Transformation of every value in a keyspace: `(key, timestamp, value) -> outcome`.
pub type KeyspaceValuesTransform<'a> = dyn Fn(&str, Timestamp, &Value) -> ValueTransformation + 'a;

/// Temporal key/value storage engine rewritten by dateback sessions.
///
/// Every `dateback_*` primitive touches only versions stored on `branch` itself and
/// returns the logical timestamps it changed.
pub trait TemporalBackend: Send + Sync {
    /// Head time of `branch`.
    fn now(&self, branch: &str) -> DatebackResult<Timestamp>;
    /// Value of a key visible on `branch` at `timestamp`.
    fn get(
        &self,
        branch: &str,
        timestamp: Timestamp,
        keyspace: &str,
        key: &str,
    ) -> DatebackResult<Option<Value>>;
    /// Live keys of a keyspace on `branch` at `timestamp`.
    fn key_set(
        &self,
        branch: &str,
        timestamp: Timestamp,
        keyspace: &str,
    ) -> DatebackResult<BTreeSet<String>>;
    /// Keyspaces holding at least one live key on `branch` at `timestamp`.
    fn keyspaces(&self, branch: &str, timestamp: Timestamp) -> DatebackResult<BTreeSet<String>>;
    /// Ordinary commit at a fresh head timestamp.
    fn commit(
        &self,
        branch: &str,
        entries: &CommitEntries,
        metadata: Option<Value>,
    ) -> DatebackResult<Timestamp>;

    /// Removes the version of a key stored exactly at `timestamp`.
    fn dateback_purge_entry(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Removes every version of a key matching `predicate`.
    fn dateback_purge_key(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        predicate: &VersionPredicate<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Removes every version in a keyspace matching `predicate`.
    fn dateback_purge_keyspace(
        &self,
        branch: &str,
        keyspace: &str,
        predicate: &KeyspaceVersionPredicate<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Removes whole commits with all their entries and metadata.
    fn dateback_purge_commits(
        &self,
        branch: &str,
        commit_timestamps: &BTreeSet<Timestamp>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Writes `entries` at `timestamp`, optionally setting commit metadata.
    ///
    /// Existing metadata is only replaced when `override_commit_metadata` is set.
    fn dateback_inject(
        &self,
        branch: &str,
        timestamp: Timestamp,
        entries: &CommitEntries,
        commit_metadata: Option<Value>,
        override_commit_metadata: bool,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Rewrites the version of a key stored exactly at `timestamp`.
    fn dateback_transform_entry(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
        transform: &EntryTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Rewrites every non-tombstone version of a key.
    fn dateback_transform_values_of_key(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        transform: &KeyValuesTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Replaces the entry set of the commit at `commit_timestamp`.
    fn dateback_transform_commit(
        &self,
        branch: &str,
        commit_timestamp: Timestamp,
        transform: &CommitTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Rewrites every non-tombstone version in a keyspace.
    fn dateback_transform_values_of_keyspace(
        &self,
        branch: &str,
        keyspace: &str,
        transform: &KeyspaceValuesTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Replaces the metadata of the commit at `commit_timestamp`.
    fn dateback_update_commit_metadata(
        &self,
        branch: &str,
        commit_timestamp: Timestamp,
        metadata: Option<Value>,
    ) -> DatebackResult<ChangedTimestamps>;
    /// Finalizes storage structures of `branch` from `earliest_touched` onwards.
    fn dateback_cleanup(&self, branch: &str, earliest_touched: Timestamp) -> DatebackResult<()>;
    /// Storage compaction hook run after every dateback.
    fn compact(&self, branch: &str) -> DatebackResult<()>;
}

/// Read-only view of branch ancestry.
pub trait BranchRegistry: Send + Sync {
    /// Whether `branch` exists.
    fn exists(&self, branch: &str) -> bool;
    /// Ancestors of `branch`, root first, excluding `branch` itself.
    fn origins(&self, branch: &str) -> DatebackResult<Vec<String>>;
    /// Logical time at which `branch` diverged from its parent. Zero for the root.
    fn branching_timestamp(&self, branch: &str) -> DatebackResult<Timestamp>;
}

/// Cache and secondary-index invalidation hooks.
pub trait StoreMaintenance: Send + Sync {
    /// Drops every read cache entry.
    fn clear_read_caches(&self);
    /// Drops every cached query result.
    fn clear_query_cache(&self);
    /// Flags every secondary index for a rebuild.
    fn mark_all_indices_dirty(&self);
}
