//! Dateback engine for a bitemporal, branch-aware key/value store.
//!
//! A dateback rewrites already-committed history (purges, injects, transforms) under a
//! store-wide exclusive lock and records every effective edit in an append-only
//! operation log that can be queried with branch ancestry in mind.
//!
//! # Examples
//!
//! ```
//! use std::{collections::BTreeMap, sync::Arc};
//!
//! use dateback::{
//!     core::store::InMemoryStore,
//!     engine::manager::DatebackManager,
//!     types::{MASTER_BRANCH, QualifiedKey},
//! };
//!
//! let store = Arc::new(InMemoryStore::new());
//! let manager = DatebackManager::in_memory(Arc::clone(&store));
//!
//! let entries = BTreeMap::from([(
//!     QualifiedKey::new("default", "Hello"),
//!     Some(b"World".to_vec()),
//! )]);
//! let t1 = manager.commit(MASTER_BRANCH, &entries, None).expect("commit");
//!
//! let purged = manager
//!     .dateback(MASTER_BRANCH, |session| {
//!         session.purge_entry("default", "Hello", t1)
//!     })
//!     .expect("dateback");
//! assert!(purged);
//!
//! let view = manager.view(MASTER_BRANCH, t1).expect("view");
//! assert_eq!(view.get("default", "Hello").expect("get"), None);
//! assert_eq!(manager.all_performed_dateback_operations().expect("log").len(), 1);
//! ```
#![warn(missing_docs)]

/// Collaborator contracts.
pub mod backend;
/// Runtime configuration.
pub mod config;
/// Exclusive lock, read views, and the in-memory reference store.
pub mod core;
/// Sessions, manager, and lifecycle events.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Operation log model and persisted form.
pub mod op;
/// Operation log storage.
pub mod persist;
/// Shared primitive types.
pub mod types;

pub use engine::{manager::DatebackManager, session::DatebackSession};
