use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::{
    backend::traits::{ChangedTimestamps, CommitEntries, ValueTransformation},
    core::{lock::AccessMode, view::BranchView},
    error::{DatebackError, DatebackResult},
    op::{DatebackOperation, OperationKind, require_name, require_range},
    types::{QualifiedKey, TIMESTAMP_INFINITY, Timestamp, Value},
};

use super::manager::DatebackManager;

/// Single-use handle through which one dateback callback rewrites a branch.
///
/// Every mutation that changes history lowers the earliest touched timestamp. Reads are
/// only served strictly below it, since anything at or after it may be half rewritten.
pub struct DatebackSession<'m> {
    manager: &'m DatebackManager,
    branch: String,
    earliest_touched: Timestamp,
    operations_logged: usize,
    closed: bool,
}

impl<'m> DatebackSession<'m> {
    pub(crate) fn new(manager: &'m DatebackManager, branch: impl Into<String>) -> Self {
        Self {
            manager,
            branch: branch.into(),
            earliest_touched: TIMESTAMP_INFINITY,
            operations_logged: 0,
            closed: false,
        }
    }

    /// Branch this session rewrites.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Lowest timestamp changed so far, [`TIMESTAMP_INFINITY`] while nothing changed.
    pub fn earliest_touched_timestamp(&self) -> Timestamp {
        self.earliest_touched
    }

    /// Highest timestamp that is still safe to read, `None` once timestamp zero was touched.
    pub fn highest_untouched_timestamp(&self) -> Option<Timestamp> {
        self.earliest_touched.checked_sub(1)
    }

    /// Number of records this session appended to the log.
    pub fn operations_logged(&self) -> usize {
        self.operations_logged
    }

    /// Whether [`DatebackSession::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the session and runs [`DatebackSession::cleanup`]. Idempotent.
    pub fn close(&mut self) -> DatebackResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(
            branch = %self.branch,
            operations = self.operations_logged,
            "closing dateback session"
        );
        self.cleanup()
    }

    /// Lets the backend finalize storage from the earliest touched timestamp onwards.
    pub(crate) fn cleanup(&mut self) -> DatebackResult<()> {
        if self.earliest_touched == TIMESTAMP_INFINITY {
            return Ok(());
        }
        self.manager
            .backend()
            .dateback_cleanup(&self.branch, self.earliest_touched)?;
        self.earliest_touched = TIMESTAMP_INFINITY;
        Ok(())
    }

    // Reads

    /// Value of a key at `timestamp`, which must lie below every touched timestamp.
    pub fn get(
        &self,
        timestamp: Timestamp,
        keyspace: &str,
        key: &str,
    ) -> DatebackResult<Option<Value>> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_name("key", key)?;
        self.read_view(timestamp)?.get(keyspace, key)
    }

    /// Live keys of a keyspace at `timestamp`.
    pub fn key_set(
        &self,
        timestamp: Timestamp,
        keyspace: &str,
    ) -> DatebackResult<BTreeSet<String>> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        self.read_view(timestamp)?.key_set(keyspace)
    }

    /// Keyspaces with live keys at `timestamp`.
    pub fn keyspaces(&self, timestamp: Timestamp) -> DatebackResult<BTreeSet<String>> {
        self.ensure_open()?;
        self.read_view(timestamp)?.keyspaces()
    }

    // Purges

    /// Purges the version of a key stored exactly at `timestamp`.
    pub fn purge_entry(
        &mut self,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_name("key", key)?;
        let changed = self.manager.backend().dateback_purge_entry(
            &self.branch,
            keyspace,
            key,
            timestamp,
        )?;
        self.record(&changed, |_| OperationKind::PurgeEntry {
            timestamp,
            keyspace: keyspace.to_string(),
            key: key.to_string(),
        })
    }

    /// Purges every version of a key.
    pub fn purge_key(&mut self, keyspace: &str, key: &str) -> DatebackResult<bool> {
        self.purge_key_where(keyspace, key, |_, _| true)
    }

    /// Purges the versions of a key for which `predicate(timestamp, value)` holds.
    pub fn purge_key_where(
        &mut self,
        keyspace: &str,
        key: &str,
        predicate: impl Fn(Timestamp, Option<&Value>) -> bool,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_name("key", key)?;
        let changed = self.manager.backend().dateback_purge_key(
            &self.branch,
            keyspace,
            key,
            &predicate,
        )?;
        self.record(&changed, |changed| {
            let (from_timestamp, to_timestamp) = tight_range(changed);
            OperationKind::PurgeKey {
                keyspace: keyspace.to_string(),
                key: key.to_string(),
                from_timestamp,
                to_timestamp,
            }
        })
    }

    /// Purges the versions of a key within `[from, to)`.
    pub fn purge_key_between(
        &mut self,
        keyspace: &str,
        key: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_range(from, to)?;
        self.purge_key_where(keyspace, key, |timestamp, _| from <= timestamp && timestamp < to)
    }

    /// Purges every version in a keyspace within `[from, to)`.
    pub fn purge_keyspace(
        &mut self,
        keyspace: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_range(from, to)?;
        let changed = self.manager.backend().dateback_purge_keyspace(
            &self.branch,
            keyspace,
            &|_, timestamp, _| from <= timestamp && timestamp < to,
        )?;
        self.record(&changed, |changed| {
            let (from_timestamp, to_timestamp) = tight_range(changed);
            OperationKind::PurgeKeyspace {
                keyspace: keyspace.to_string(),
                from_timestamp,
                to_timestamp,
            }
        })
    }

    /// Purges the whole commit at `timestamp`.
    pub fn purge_commit(&mut self, timestamp: Timestamp) -> DatebackResult<bool> {
        self.purge_commits(&BTreeSet::from([timestamp]))
    }

    /// Purges whole commits.
    pub fn purge_commits(&mut self, timestamps: &BTreeSet<Timestamp>) -> DatebackResult<bool> {
        self.ensure_open()?;
        let changed = self
            .manager
            .backend()
            .dateback_purge_commits(&self.branch, timestamps)?;
        self.record(&changed, |changed| OperationKind::PurgeCommits {
            commit_timestamps: changed.clone(),
        })
    }

    // Injects

    /// Writes one value at a past timestamp. `None` writes a tombstone.
    pub fn inject(
        &mut self,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
        value: Option<Value>,
    ) -> DatebackResult<bool> {
        self.inject_with_metadata(keyspace, key, timestamp, value, None, false)
    }

    /// Writes one value at a past timestamp together with commit metadata.
    pub fn inject_with_metadata(
        &mut self,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
        value: Option<Value>,
        commit_metadata: Option<Value>,
        override_commit_metadata: bool,
    ) -> DatebackResult<bool> {
        let entries = BTreeMap::from([(QualifiedKey::new(keyspace, key), value)]);
        self.inject_entries_with_metadata(
            timestamp,
            entries,
            commit_metadata,
            override_commit_metadata,
        )
    }

    /// Writes several values at one past timestamp.
    pub fn inject_entries(
        &mut self,
        timestamp: Timestamp,
        entries: CommitEntries,
    ) -> DatebackResult<bool> {
        self.inject_entries_with_metadata(timestamp, entries, None, false)
    }

    /// Writes several values at one past timestamp together with commit metadata.
    ///
    /// Metadata already stored at `timestamp` is only replaced when
    /// `override_commit_metadata` is set.
    pub fn inject_entries_with_metadata(
        &mut self,
        timestamp: Timestamp,
        entries: CommitEntries,
        commit_metadata: Option<Value>,
        override_commit_metadata: bool,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        if entries.is_empty() {
            return Err(DatebackError::precondition("inject requires at least one entry"));
        }
        for qk in entries.keys() {
            require_name("keyspace", &qk.keyspace)?;
            require_name("key", &qk.key)?;
        }
        self.check_inject_target(timestamp)?;

        let changed = self.manager.backend().dateback_inject(
            &self.branch,
            timestamp,
            &entries,
            commit_metadata,
            override_commit_metadata,
        )?;
        self.record(&changed, |_| OperationKind::InjectEntries {
            timestamp,
            injected_keys: entries.keys().cloned().collect(),
            commit_metadata_override: override_commit_metadata,
        })
    }

    // Transforms

    /// Rewrites the version of a key stored exactly at `timestamp`.
    pub fn transform_entry(
        &mut self,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
        transform: impl Fn(Option<&Value>) -> ValueTransformation,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_name("key", key)?;
        let changed = self.manager.backend().dateback_transform_entry(
            &self.branch,
            keyspace,
            key,
            timestamp,
            &transform,
        )?;
        self.record(&changed, |changed| OperationKind::TransformEntry {
            keyspace: keyspace.to_string(),
            key: key.to_string(),
            commit_timestamps: changed.clone(),
        })
    }

    /// Passes every stored value of a key through `transform(timestamp, value)`.
    pub fn transform_values_of_key(
        &mut self,
        keyspace: &str,
        key: &str,
        transform: impl Fn(Timestamp, &Value) -> ValueTransformation,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        require_name("key", key)?;
        let changed = self.manager.backend().dateback_transform_values_of_key(
            &self.branch,
            keyspace,
            key,
            &transform,
        )?;
        self.record(&changed, |changed| OperationKind::TransformValuesOfKey {
            keyspace: keyspace.to_string(),
            key: key.to_string(),
            commit_timestamps: changed.clone(),
        })
    }

    /// Replaces the entries of the commit at `timestamp` with `transform(entries)`.
    ///
    /// Keys missing from the returned map are purged from the commit.
    pub fn transform_commit(
        &mut self,
        timestamp: Timestamp,
        transform: impl Fn(&CommitEntries) -> CommitEntries,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        let changed = self.manager.backend().dateback_transform_commit(
            &self.branch,
            timestamp,
            &transform,
        )?;
        self.record(&changed, |_| OperationKind::TransformCommit {
            commit_timestamp: timestamp,
        })
    }

    /// Passes every stored value of a keyspace through `transform(key, timestamp, value)`.
    pub fn transform_values_of_keyspace(
        &mut self,
        keyspace: &str,
        transform: impl Fn(&str, Timestamp, &Value) -> ValueTransformation,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        require_name("keyspace", keyspace)?;
        let changed = self.manager.backend().dateback_transform_values_of_keyspace(
            &self.branch,
            keyspace,
            &transform,
        )?;
        self.record(&changed, |changed| OperationKind::TransformValuesOfKeyspace {
            keyspace: keyspace.to_string(),
            earliest_affected_timestamp: changed.first().copied().unwrap_or(TIMESTAMP_INFINITY),
        })
    }

    /// Replaces the metadata of the commit at `timestamp`.
    pub fn update_commit_metadata(
        &mut self,
        timestamp: Timestamp,
        metadata: Option<Value>,
    ) -> DatebackResult<bool> {
        self.ensure_open()?;
        let changed = self.manager.backend().dateback_update_commit_metadata(
            &self.branch,
            timestamp,
            metadata,
        )?;
        self.record(&changed, |_| OperationKind::UpdateCommitMetadata {
            commit_timestamp: timestamp,
        })
    }

    fn ensure_open(&self) -> DatebackResult<()> {
        if self.closed {
            return Err(DatebackError::illegal_state(format!(
                "dateback session on branch '{}' is closed",
                self.branch
            )));
        }
        Ok(())
    }

    fn read_view(&self, timestamp: Timestamp) -> DatebackResult<BranchView<'m>> {
        match self.highest_untouched_timestamp() {
            Some(highest) if timestamp <= highest => Ok(BranchView::new(
                self.manager.backend(),
                self.manager.lock(),
                self.branch.clone(),
                timestamp,
                AccessMode::Dateback,
            )),
            _ => Err(DatebackError::IllegalState(format!(
                "cannot read branch '{}' at {timestamp}: history from {} onwards is being rewritten",
                self.branch, self.earliest_touched
            ))),
        }
    }

    fn check_inject_target(&self, timestamp: Timestamp) -> DatebackResult<()> {
        let head = self.manager.backend().now(&self.branch)?;
        if timestamp > head {
            return Err(DatebackError::FutureTimestamp {
                branch: self.branch.clone(),
                timestamp,
                head,
            });
        }
        if self.branch != self.manager.config().root_branch {
            let branching_timestamp = self.manager.branches().branching_timestamp(&self.branch)?;
            if timestamp < branching_timestamp {
                return Err(DatebackError::PreBranchTimestamp {
                    branch: self.branch.clone(),
                    timestamp,
                    branching_timestamp,
                });
            }
        }
        Ok(())
    }

    fn record(
        &mut self,
        changed: &ChangedTimestamps,
        kind: impl FnOnce(&ChangedTimestamps) -> OperationKind,
    ) -> DatebackResult<bool> {
        let Some(earliest) = changed.first().copied() else {
            return Ok(false);
        };
        self.earliest_touched = self.earliest_touched.min(earliest);
        let op = DatebackOperation::new(self.branch.clone(), kind(changed))?;
        self.manager.append_to_log(&op)?;
        self.operations_logged += 1;
        Ok(true)
    }
}

impl Drop for DatebackSession<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(branch = %self.branch, error = %err, "dateback session cleanup failed");
        }
    }
}

fn tight_range(changed: &ChangedTimestamps) -> (Timestamp, Timestamp) {
    let from = changed.first().copied().unwrap_or(0);
    let to = changed.last().map(|last| last.saturating_add(1)).unwrap_or(from);
    (from, to)
}
