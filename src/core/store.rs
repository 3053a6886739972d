use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{
    backend::traits::{
        BranchRegistry, ChangedTimestamps, CommitEntries, CommitTransform, EntryTransform,
        KeyValuesTransform, KeyspaceValuesTransform, KeyspaceVersionPredicate, StoreMaintenance,
        TemporalBackend, ValueTransformation, VersionPredicate,
    },
    error::{DatebackError, DatebackResult},
    types::{MASTER_BRANCH, QualifiedKey, Timestamp, Value, now_ms},
};

type Versions = BTreeMap<Timestamp, Option<Value>>;

#[derive(Debug, Clone)]
struct BranchState {
    parent: Option<String>,
    branching_timestamp: Timestamp,
    head: Timestamp,
    commits: BTreeMap<Timestamp, Option<Value>>,
    versions: BTreeMap<QualifiedKey, Versions>,
}

impl BranchState {
    fn root() -> Self {
        Self::child(None, 0)
    }

    fn child(parent: Option<String>, branching_timestamp: Timestamp) -> Self {
        Self {
            parent,
            branching_timestamp,
            head: branching_timestamp,
            commits: BTreeMap::new(),
            versions: BTreeMap::new(),
        }
    }

    fn prune_empty_keys(&mut self) {
        self.versions.retain(|_, versions| !versions.is_empty());
    }
}

#[derive(Debug, Default)]
struct StoreState {
    branches: HashMap<String, BranchState>,
}

impl StoreState {
    fn branch(&self, name: &str) -> DatebackResult<&BranchState> {
        self.branches
            .get(name)
            .ok_or_else(|| DatebackError::BranchNotFound(name.to_string()))
    }

    fn branch_mut(&mut self, name: &str) -> DatebackResult<&mut BranchState> {
        self.branches
            .get_mut(name)
            .ok_or_else(|| DatebackError::BranchNotFound(name.to_string()))
    }

    /// Walks the branch and its ancestors, clamping the read time at each branch point.
    fn resolve(
        &self,
        branch: &str,
        timestamp: Timestamp,
        qk: &QualifiedKey,
    ) -> DatebackResult<Option<Value>> {
        let mut current = self.branch(branch)?;
        let mut at = timestamp;
        loop {
            if let Some((_, value)) = current
                .versions
                .get(qk)
                .and_then(|versions| versions.range(..=at).next_back())
            {
                return Ok(value.clone());
            }
            match &current.parent {
                Some(parent) => {
                    at = at.min(current.branching_timestamp);
                    current = self.branch(parent)?;
                }
                None => return Ok(None),
            }
        }
    }

    fn chain(&self, branch: &str) -> DatebackResult<Vec<&BranchState>> {
        let mut out = Vec::new();
        let mut current = self.branch(branch)?;
        out.push(current);
        while let Some(parent) = &current.parent {
            current = self.branch(parent)?;
            out.push(current);
        }
        Ok(out)
    }

    fn key_set(
        &self,
        branch: &str,
        timestamp: Timestamp,
        keyspace: &str,
    ) -> DatebackResult<BTreeSet<String>> {
        let mut candidates = BTreeSet::new();
        for state in self.chain(branch)? {
            for qk in state.versions.keys().filter(|qk| qk.keyspace == keyspace) {
                candidates.insert(qk.clone());
            }
        }
        let mut out = BTreeSet::new();
        for qk in candidates {
            if self.resolve(branch, timestamp, &qk)?.is_some() {
                out.insert(qk.key);
            }
        }
        Ok(out)
    }
}

/// Counters of maintenance hooks invoked on an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceStats {
    /// Calls to [`StoreMaintenance::clear_read_caches`].
    pub read_cache_clears: usize,
    /// Calls to [`StoreMaintenance::clear_query_cache`].
    pub query_cache_clears: usize,
    /// Calls to [`StoreMaintenance::mark_all_indices_dirty`].
    pub index_dirty_marks: usize,
    /// Calls to [`TemporalBackend::compact`].
    pub compactions: usize,
}

#[derive(Debug, Default)]
struct MaintenanceCounters {
    read_cache_clears: AtomicUsize,
    query_cache_clears: AtomicUsize,
    index_dirty_marks: AtomicUsize,
    compactions: AtomicUsize,
}

/// Serializable image of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// Keyspace name.
    pub keyspace: String,
    /// Key name.
    pub key: String,
    /// Version timestamp.
    pub timestamp: Timestamp,
    /// Stored value, `None` for a tombstone.
    pub value: Option<Value>,
}

/// Serializable image of one commit header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSnapshot {
    /// Commit timestamp.
    pub timestamp: Timestamp,
    /// Commit metadata.
    pub metadata: Option<Value>,
}

/// Serializable image of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    /// Branch name.
    pub name: String,
    /// Parent branch, `None` for the root.
    pub parent: Option<String>,
    /// Timestamp the branch forked at.
    pub branching_timestamp: Timestamp,
    /// Latest commit time.
    pub head: Timestamp,
    /// Commit headers.
    pub commits: Vec<CommitSnapshot>,
    /// Every stored version.
    pub versions: Vec<VersionSnapshot>,
}

/// Serializable image of a whole [`InMemoryStore`], ordered parents first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Branch images.
    pub branches: Vec<BranchSnapshot>,
}

/// In-memory reference implementation of the temporal backend, branch registry and
/// maintenance hooks.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    counters: MaintenanceCounters,
    cleanups: Mutex<Vec<(String, Timestamp)>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a store holding an empty `master` branch.
    pub fn new() -> Self {
        let mut state = StoreState::default();
        state
            .branches
            .insert(MASTER_BRANCH.to_string(), BranchState::root());
        Self {
            state: RwLock::new(state),
            counters: MaintenanceCounters::default(),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    /// Rebuilds a store from [`InMemoryStore::export_snapshot`] output.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> DatebackResult<Self> {
        let mut state = StoreState::default();
        for branch in snapshot.branches {
            if let Some(parent) = &branch.parent {
                if !state.branches.contains_key(parent) {
                    return Err(DatebackError::Backend(format!(
                        "snapshot lists branch '{}' before its parent '{parent}'",
                        branch.name
                    )));
                }
            }
            let mut restored = BranchState::child(branch.parent, branch.branching_timestamp);
            restored.head = branch.head;
            for commit in branch.commits {
                restored.commits.insert(commit.timestamp, commit.metadata);
            }
            for version in branch.versions {
                restored
                    .versions
                    .entry(QualifiedKey::new(version.keyspace, version.key))
                    .or_default()
                    .insert(version.timestamp, version.value);
            }
            state.branches.insert(branch.name, restored);
        }
        if !state.branches.contains_key(MASTER_BRANCH) {
            return Err(DatebackError::Backend(
                "snapshot has no master branch".to_string(),
            ));
        }
        Ok(Self {
            state: RwLock::new(state),
            counters: MaintenanceCounters::default(),
            cleanups: Mutex::new(Vec::new()),
        })
    }

    /// Exports every branch, parents before children.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let state = self.state.read();
        let mut names: Vec<&String> = state.branches.keys().collect();
        names.sort_by_key(|name| (depth(&state, name), (*name).clone()));

        let branches = names
            .into_iter()
            .filter_map(|name| {
                let branch = state.branches.get(name)?;
                Some(BranchSnapshot {
                    name: name.clone(),
                    parent: branch.parent.clone(),
                    branching_timestamp: branch.branching_timestamp,
                    head: branch.head,
                    commits: branch
                        .commits
                        .iter()
                        .map(|(timestamp, metadata)| CommitSnapshot {
                            timestamp: *timestamp,
                            metadata: metadata.clone(),
                        })
                        .collect(),
                    versions: branch
                        .versions
                        .iter()
                        .flat_map(|(qk, versions)| {
                            versions.iter().map(move |(timestamp, value)| VersionSnapshot {
                                keyspace: qk.keyspace.clone(),
                                key: qk.key.clone(),
                                timestamp: *timestamp,
                                value: value.clone(),
                            })
                        })
                        .collect(),
                })
            })
            .collect();

        StoreSnapshotV1 { branches }
    }

    /// Creates `name` as a child of `parent`, branching at the parent's head.
    pub fn create_branch(&self, name: &str, parent: &str) -> DatebackResult<Timestamp> {
        let head = self.state.read().branch(parent)?.head;
        self.create_branch_at(name, parent, head)
    }

    /// Creates `name` as a child of `parent`, branching at `branching_timestamp`.
    pub fn create_branch_at(
        &self,
        name: &str,
        parent: &str,
        branching_timestamp: Timestamp,
    ) -> DatebackResult<Timestamp> {
        let mut state = self.state.write();
        if state.branches.contains_key(name) {
            return Err(DatebackError::precondition(format!(
                "branch '{name}' already exists"
            )));
        }
        let parent_head = state.branch(parent)?.head;
        if branching_timestamp > parent_head {
            return Err(DatebackError::precondition(format!(
                "branching timestamp {branching_timestamp} is after head {parent_head} of '{parent}'"
            )));
        }
        state.branches.insert(
            name.to_string(),
            BranchState::child(Some(parent.to_string()), branching_timestamp),
        );
        Ok(branching_timestamp)
    }

    /// Ordinary commit at an explicit timestamp strictly after the branch head.
    pub fn commit_at(
        &self,
        branch: &str,
        timestamp: Timestamp,
        entries: &CommitEntries,
        metadata: Option<Value>,
    ) -> DatebackResult<Timestamp> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        if timestamp <= branch_state.head {
            return Err(DatebackError::precondition(format!(
                "commit timestamp {timestamp} is not after head {} of '{branch}'",
                branch_state.head
            )));
        }
        for (qk, value) in entries {
            branch_state
                .versions
                .entry(qk.clone())
                .or_default()
                .insert(timestamp, value.clone());
        }
        branch_state.commits.insert(timestamp, metadata);
        branch_state.head = timestamp;
        Ok(timestamp)
    }

    /// Metadata stored with the commit at `timestamp`, if the commit exists.
    pub fn commit_metadata(
        &self,
        branch: &str,
        timestamp: Timestamp,
    ) -> DatebackResult<Option<Option<Value>>> {
        Ok(self.state.read().branch(branch)?.commits.get(&timestamp).cloned())
    }

    /// Timestamps of every commit stored on `branch` itself.
    pub fn commit_timestamps(&self, branch: &str) -> DatebackResult<BTreeSet<Timestamp>> {
        Ok(self
            .state
            .read()
            .branch(branch)?
            .commits
            .keys()
            .copied()
            .collect())
    }

    /// Version timestamps of one key stored on `branch` itself, tombstones included.
    pub fn version_timestamps(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
    ) -> DatebackResult<BTreeSet<Timestamp>> {
        Ok(self
            .state
            .read()
            .branch(branch)?
            .versions
            .get(&QualifiedKey::new(keyspace, key))
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    /// Snapshot of the maintenance counters.
    pub fn maintenance_stats(&self) -> MaintenanceStats {
        MaintenanceStats {
            read_cache_clears: self.counters.read_cache_clears.load(Ordering::Acquire),
            query_cache_clears: self.counters.query_cache_clears.load(Ordering::Acquire),
            index_dirty_marks: self.counters.index_dirty_marks.load(Ordering::Acquire),
            compactions: self.counters.compactions.load(Ordering::Acquire),
        }
    }

    /// Every `(branch, earliest_touched)` pair passed to [`TemporalBackend::dateback_cleanup`].
    pub fn cleanups(&self) -> Vec<(String, Timestamp)> {
        self.cleanups.lock().clone()
    }
}

fn depth(state: &StoreState, name: &str) -> usize {
    state.chain(name).map(|chain| chain.len()).unwrap_or(0)
}

fn apply_transformation(slot: &mut Option<Value>, outcome: ValueTransformation) -> bool {
    match outcome {
        ValueTransformation::Unchanged => false,
        ValueTransformation::Replace(value) => {
            if slot.as_ref() == Some(&value) {
                return false;
            }
            *slot = Some(value);
            true
        }
        ValueTransformation::Delete => slot.take().is_some(),
    }
}

fn require_name(what: &str, value: &str) -> DatebackResult<()> {
    if value.is_empty() {
        return Err(DatebackError::precondition(format!("{what} must not be empty")));
    }
    Ok(())
}

impl TemporalBackend for InMemoryStore {
    fn now(&self, branch: &str) -> DatebackResult<Timestamp> {
        Ok(self.state.read().branch(branch)?.head)
    }

    fn get(
        &self,
        branch: &str,
        timestamp: Timestamp,
        keyspace: &str,
        key: &str,
    ) -> DatebackResult<Option<Value>> {
        self.state
            .read()
            .resolve(branch, timestamp, &QualifiedKey::new(keyspace, key))
    }

    fn key_set(
        &self,
        branch: &str,
        timestamp: Timestamp,
        keyspace: &str,
    ) -> DatebackResult<BTreeSet<String>> {
        self.state.read().key_set(branch, timestamp, keyspace)
    }

    fn keyspaces(&self, branch: &str, timestamp: Timestamp) -> DatebackResult<BTreeSet<String>> {
        let state = self.state.read();
        let mut names = BTreeSet::new();
        for branch_state in state.chain(branch)? {
            for qk in branch_state.versions.keys() {
                names.insert(qk.keyspace.clone());
            }
        }
        let mut out = BTreeSet::new();
        for keyspace in names {
            if !state.key_set(branch, timestamp, &keyspace)?.is_empty() {
                out.insert(keyspace);
            }
        }
        Ok(out)
    }

    fn commit(
        &self,
        branch: &str,
        entries: &CommitEntries,
        metadata: Option<Value>,
    ) -> DatebackResult<Timestamp> {
        let head = self.state.read().branch(branch)?.head;
        let timestamp = now_ms().max(head.saturating_add(1));
        self.commit_at(branch, timestamp, entries, metadata)
    }

    fn dateback_purge_entry(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let removed = branch_state
            .versions
            .get_mut(&QualifiedKey::new(keyspace, key))
            .and_then(|versions| versions.remove(&timestamp))
            .is_some();
        branch_state.prune_empty_keys();
        Ok(if removed {
            BTreeSet::from([timestamp])
        } else {
            BTreeSet::new()
        })
    }

    fn dateback_purge_key(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        predicate: &VersionPredicate<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = BTreeSet::new();
        if let Some(versions) = branch_state
            .versions
            .get_mut(&QualifiedKey::new(keyspace, key))
        {
            versions.retain(|timestamp, value| {
                let purge = predicate(*timestamp, value.as_ref());
                if purge {
                    changed.insert(*timestamp);
                }
                !purge
            });
        }
        branch_state.prune_empty_keys();
        Ok(changed)
    }

    fn dateback_purge_keyspace(
        &self,
        branch: &str,
        keyspace: &str,
        predicate: &KeyspaceVersionPredicate<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = BTreeSet::new();
        for (qk, versions) in branch_state
            .versions
            .iter_mut()
            .filter(|(qk, _)| qk.keyspace == keyspace)
        {
            versions.retain(|timestamp, value| {
                let purge = predicate(&qk.key, *timestamp, value.as_ref());
                if purge {
                    changed.insert(*timestamp);
                }
                !purge
            });
        }
        branch_state.prune_empty_keys();
        Ok(changed)
    }

    fn dateback_purge_commits(
        &self,
        branch: &str,
        commit_timestamps: &BTreeSet<Timestamp>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = BTreeSet::new();
        for timestamp in commit_timestamps {
            if branch_state.commits.remove(timestamp).is_some() {
                changed.insert(*timestamp);
            }
            for versions in branch_state.versions.values_mut() {
                if versions.remove(timestamp).is_some() {
                    changed.insert(*timestamp);
                }
            }
        }
        branch_state.prune_empty_keys();
        Ok(changed)
    }

    fn dateback_inject(
        &self,
        branch: &str,
        timestamp: Timestamp,
        entries: &CommitEntries,
        commit_metadata: Option<Value>,
        override_commit_metadata: bool,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = false;
        for (qk, value) in entries {
            let versions = branch_state.versions.entry(qk.clone()).or_default();
            if versions.get(&timestamp) != Some(value) {
                versions.insert(timestamp, value.clone());
                changed = true;
            }
        }

        match branch_state.commits.get_mut(&timestamp) {
            None => {
                if changed || commit_metadata.is_some() {
                    branch_state.commits.insert(timestamp, commit_metadata);
                    changed = true;
                }
            }
            Some(existing) => {
                let replace = override_commit_metadata || existing.is_none();
                if let Some(metadata) = commit_metadata.filter(|_| replace) {
                    if existing.as_ref() != Some(&metadata) {
                        *existing = Some(metadata);
                        changed = true;
                    }
                }
            }
        }

        Ok(if changed {
            BTreeSet::from([timestamp])
        } else {
            BTreeSet::new()
        })
    }

    fn dateback_transform_entry(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        timestamp: Timestamp,
        transform: &EntryTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let Some(slot) = branch_state
            .versions
            .get_mut(&QualifiedKey::new(keyspace, key))
            .and_then(|versions| versions.get_mut(&timestamp))
        else {
            return Ok(BTreeSet::new());
        };
        let outcome = transform(slot.as_ref());
        Ok(if apply_transformation(slot, outcome) {
            BTreeSet::from([timestamp])
        } else {
            BTreeSet::new()
        })
    }

    fn dateback_transform_values_of_key(
        &self,
        branch: &str,
        keyspace: &str,
        key: &str,
        transform: &KeyValuesTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = BTreeSet::new();
        if let Some(versions) = branch_state
            .versions
            .get_mut(&QualifiedKey::new(keyspace, key))
        {
            for (timestamp, slot) in versions.iter_mut() {
                let Some(value) = slot.as_ref() else {
                    continue;
                };
                let outcome = transform(*timestamp, value);
                if apply_transformation(slot, outcome) {
                    changed.insert(*timestamp);
                }
            }
        }
        Ok(changed)
    }

    fn dateback_transform_commit(
        &self,
        branch: &str,
        commit_timestamp: Timestamp,
        transform: &CommitTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        if !branch_state.commits.contains_key(&commit_timestamp) {
            return Ok(BTreeSet::new());
        }

        let current: CommitEntries = branch_state
            .versions
            .iter()
            .filter_map(|(qk, versions)| {
                versions
                    .get(&commit_timestamp)
                    .map(|value| (qk.clone(), value.clone()))
            })
            .collect();
        let replacement = transform(&current);
        for qk in replacement.keys() {
            require_name("keyspace", &qk.keyspace)?;
            require_name("key", &qk.key)?;
        }

        let mut changed = false;
        for qk in current.keys().filter(|qk| !replacement.contains_key(*qk)) {
            if let Some(versions) = branch_state.versions.get_mut(qk) {
                versions.remove(&commit_timestamp);
                changed = true;
            }
        }
        for (qk, value) in replacement {
            if current.get(&qk) != Some(&value) {
                branch_state
                    .versions
                    .entry(qk)
                    .or_default()
                    .insert(commit_timestamp, value);
                changed = true;
            }
        }
        branch_state.prune_empty_keys();

        Ok(if changed {
            BTreeSet::from([commit_timestamp])
        } else {
            BTreeSet::new()
        })
    }

    fn dateback_transform_values_of_keyspace(
        &self,
        branch: &str,
        keyspace: &str,
        transform: &KeyspaceValuesTransform<'_>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let mut changed = BTreeSet::new();
        for (qk, versions) in branch_state
            .versions
            .iter_mut()
            .filter(|(qk, _)| qk.keyspace == keyspace)
        {
            for (timestamp, slot) in versions.iter_mut() {
                let Some(value) = slot.as_ref() else {
                    continue;
                };
                let outcome = transform(&qk.key, *timestamp, value);
                if apply_transformation(slot, outcome) {
                    changed.insert(*timestamp);
                }
            }
        }
        Ok(changed)
    }

    fn dateback_update_commit_metadata(
        &self,
        branch: &str,
        commit_timestamp: Timestamp,
        metadata: Option<Value>,
    ) -> DatebackResult<ChangedTimestamps> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        let Some(existing) = branch_state.commits.get_mut(&commit_timestamp) else {
            return Ok(BTreeSet::new());
        };
        if *existing == metadata {
            return Ok(BTreeSet::new());
        }
        *existing = metadata;
        Ok(BTreeSet::from([commit_timestamp]))
    }

    fn dateback_cleanup(&self, branch: &str, earliest_touched: Timestamp) -> DatebackResult<()> {
        let mut state = self.state.write();
        let branch_state = state.branch_mut(branch)?;
        branch_state.prune_empty_keys();

        let live: BTreeSet<Timestamp> = branch_state
            .versions
            .values()
            .flat_map(|versions| versions.range(earliest_touched..).map(|(ts, _)| *ts))
            .collect();
        branch_state.commits.retain(|timestamp, metadata| {
            *timestamp < earliest_touched || metadata.is_some() || live.contains(timestamp)
        });

        self.cleanups
            .lock()
            .push((branch.to_string(), earliest_touched));
        Ok(())
    }

    fn compact(&self, branch: &str) -> DatebackResult<()> {
        self.state.write().branch_mut(branch)?.prune_empty_keys();
        self.counters.compactions.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl BranchRegistry for InMemoryStore {
    fn exists(&self, branch: &str) -> bool {
        self.state.read().branches.contains_key(branch)
    }

    fn origins(&self, branch: &str) -> DatebackResult<Vec<String>> {
        let state = self.state.read();
        let mut out = Vec::new();
        let mut current = state.branch(branch)?;
        while let Some(parent) = &current.parent {
            out.push(parent.clone());
            current = state.branch(parent)?;
        }
        out.reverse();
        Ok(out)
    }

    fn branching_timestamp(&self, branch: &str) -> DatebackResult<Timestamp> {
        Ok(self.state.read().branch(branch)?.branching_timestamp)
    }
}

impl StoreMaintenance for InMemoryStore {
    fn clear_read_caches(&self) {
        self.counters.read_cache_clears.fetch_add(1, Ordering::AcqRel);
    }

    fn clear_query_cache(&self) {
        self.counters.query_cache_clears.fetch_add(1, Ordering::AcqRel);
    }

    fn mark_all_indices_dirty(&self) {
        self.counters.index_dirty_marks.fetch_add(1, Ordering::AcqRel);
    }
}
