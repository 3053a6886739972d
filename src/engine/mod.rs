//! Dateback sessions, their orchestration and their event stream.

/// Lifecycle event payloads.
pub mod events;
/// Session orchestration, maintenance, and log queries.
pub mod manager;
/// Single-use edit handle.
pub mod session;
