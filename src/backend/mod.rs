//! Contracts of the collaborators rewritten and invalidated by a dateback.

/// Backend, branch registry, and maintenance traits.
pub mod traits;
