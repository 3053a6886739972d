//! Error taxonomy shared by the session, the manager and the backends.

use thiserror::Error;

use crate::persist::PersistError;
use crate::types::Timestamp;

/// Errors raised by dateback operations.
#[derive(Debug, Error)]
pub enum DatebackError {
    /// Malformed argument, rejected before any backend call.
    #[error("precondition violated: {0}")]
    Precondition(String),
    /// The named branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    /// Operation not permitted in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Inject target lies after the branch head.
    #[error("cannot inject at {timestamp} on branch '{branch}': head is at {head}")]
    FutureTimestamp {
        /// Target branch.
        branch: String,
        /// Requested inject timestamp.
        timestamp: Timestamp,
        /// Branch head at call time.
        head: Timestamp,
    },
    /// Inject target lies before the branch was created.
    #[error(
        "cannot inject at {timestamp} on branch '{branch}': branch starts at {branching_timestamp}"
    )]
    PreBranchTimestamp {
        /// Target branch.
        branch: String,
        /// Requested inject timestamp.
        timestamp: Timestamp,
        /// Branching timestamp of the target branch.
        branching_timestamp: Timestamp,
    },
    /// A collaborator failed while serving the request.
    #[error("backend failure: {0}")]
    Backend(String),
    /// The operation log storage failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl DatebackError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }
}

/// Result alias for dateback operations.
pub type DatebackResult<T> = Result<T, DatebackError>;
