//! Store-side building blocks: exclusivity, read views, and the in-memory reference store.

/// Process-wide exclusive lock and transaction gate.
pub mod lock;
/// In-memory temporal backend, branch registry, and maintenance recorder.
pub mod store;
/// Read-only branch views at a fixed timestamp.
pub mod view;
