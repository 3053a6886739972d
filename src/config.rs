//! Runtime configuration for the dateback manager.

use crate::types::MASTER_BRANCH;

/// Tunables of a [`crate::engine::manager::DatebackManager`].
#[derive(Debug, Clone)]
pub struct DatebackConfig {
    /// Name of the root branch, which has no branching timestamp constraint.
    pub root_branch: String,
    /// Capacity of the broadcast channel behind
    /// [`crate::engine::manager::DatebackManager::subscribe`].
    pub event_channel_capacity: usize,
    /// Waiting longer than this for the exclusive lock emits a warning. Zero disables it.
    pub lock_wait_warn_ms: u64,
}

impl Default for DatebackConfig {
    fn default() -> Self {
        Self {
            root_branch: MASTER_BRANCH.to_string(),
            event_channel_capacity: 1024,
            lock_wait_warn_ms: 5_000,
        }
    }
}
