//! Dateback lifecycle event payloads.

use crate::{op::OperationId, types::Timestamp};

/// Events broadcast by a [`crate::engine::manager::DatebackManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatebackEvent {
    /// A session opened on a branch.
    Started {
        /// Rewritten branch.
        branch: String,
    },
    /// A mutation changed history and was logged.
    OperationLogged {
        /// Id of the new log record.
        id: OperationId,
        /// Rewritten branch.
        branch: String,
        /// Lowest timestamp the edit touched.
        earliest_affected_timestamp: Timestamp,
    },
    /// The session closed and maintenance ran.
    Finished {
        /// Rewritten branch.
        branch: String,
        /// Records logged by the session.
        operations_logged: usize,
        /// Whether the callback returned successfully.
        succeeded: bool,
    },
}
