use std::collections::BTreeSet;

use crate::{
    backend::traits::TemporalBackend,
    error::DatebackResult,
    types::{Timestamp, Value},
};

use super::lock::{AccessMode, ExclusiveLock};

/// Read-only view of one branch frozen at a logical timestamp.
///
/// Every read re-checks the exclusive lock for the duration of the backend call, so an
/// ordinary view opened before a dateback starts refuses to serve reads until it ends.
pub struct BranchView<'a> {
    backend: &'a dyn TemporalBackend,
    lock: &'a ExclusiveLock,
    branch: String,
    timestamp: Timestamp,
    mode: AccessMode,
}

impl<'a> BranchView<'a> {
    pub(crate) fn new(
        backend: &'a dyn TemporalBackend,
        lock: &'a ExclusiveLock,
        branch: impl Into<String>,
        timestamp: Timestamp,
        mode: AccessMode,
    ) -> Self {
        Self {
            backend,
            lock,
            branch: branch.into(),
            timestamp,
            mode,
        }
    }

    /// Branch this view reads.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Logical timestamp this view reads at.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// True for views opened from inside a dateback session.
    pub fn is_dateback_view(&self) -> bool {
        self.mode == AccessMode::Dateback
    }

    /// Value of `key` in `keyspace`, `None` when absent or deleted.
    pub fn get(&self, keyspace: &str, key: &str) -> DatebackResult<Option<Value>> {
        let _access = self.lock.check_access(self.mode)?;
        self.backend.get(&self.branch, self.timestamp, keyspace, key)
    }

    /// Live keys of `keyspace`.
    pub fn key_set(&self, keyspace: &str) -> DatebackResult<BTreeSet<String>> {
        let _access = self.lock.check_access(self.mode)?;
        self.backend.key_set(&self.branch, self.timestamp, keyspace)
    }

    /// Keyspaces with at least one live key.
    pub fn keyspaces(&self) -> DatebackResult<BTreeSet<String>> {
        let _access = self.lock.check_access(self.mode)?;
        self.backend.keyspaces(&self.branch, self.timestamp)
    }
}
