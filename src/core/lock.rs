use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::{
    error::{DatebackError, DatebackResult},
    types::{WallClockMs, now_ms},
};

/// Identity of the current holder of the [`ExclusiveLock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerToken {
    /// Unique id of the dateback invocation.
    pub session_id: Uuid,
    /// Thread running the dateback callback.
    pub thread: ThreadId,
    /// Branch being rewritten.
    pub branch: String,
    /// Wall-clock acquisition time.
    pub acquired_at: WallClockMs,
}

/// Who is asking to touch the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Regular transaction; refused while a dateback runs.
    Ordinary,
    /// Read issued from inside the running dateback session.
    Dateback,
}

/// Process-wide single-writer barrier.
///
/// Ordinary operations hold the shared side of `gate` for as long as they touch the
/// backend; a dateback holds the exclusive side, so it starts only once every in-flight
/// ordinary operation has finished. `owner` is set exactly while the exclusive side is held.
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    gate: RwLock<()>,
    owner: Mutex<Option<OwnerToken>>,
}

impl ExclusiveLock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other dateback and no ordinary operation is running, then installs
    /// a fresh owner token for `branch`.
    ///
    /// Fails instead of deadlocking when the calling thread already owns the lock.
    pub fn acquire(&self, branch: &str) -> DatebackResult<ExclusiveGuard<'_>> {
        let me = thread::current().id();
        if self.owner().is_some_and(|token| token.thread == me) {
            return Err(DatebackError::illegal_state(
                "a dateback is already running on this thread",
            ));
        }

        let exclusive = self.gate.write();
        let token = OwnerToken {
            session_id: Uuid::new_v4(),
            thread: me,
            branch: branch.to_string(),
            acquired_at: now_ms(),
        };
        *self.owner.lock() = Some(token.clone());
        Ok(ExclusiveGuard {
            lock: self,
            token,
            _exclusive: exclusive,
        })
    }

    /// Current holder, if any.
    pub fn owner(&self) -> Option<OwnerToken> {
        self.owner.lock().clone()
    }

    /// True while a dateback holds the lock.
    pub fn is_held(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Admits one access to the store.
    ///
    /// Ordinary access fails immediately while a dateback holds or is waiting for the lock;
    /// otherwise the returned guard keeps any dateback out until it is dropped. Dateback
    /// access is always admitted.
    pub fn check_access(&self, mode: AccessMode) -> DatebackResult<AccessGuard<'_>> {
        if mode == AccessMode::Dateback {
            return Ok(AccessGuard { _shared: None });
        }
        match self.gate.try_read() {
            Some(shared) => Ok(AccessGuard {
                _shared: Some(shared),
            }),
            None => Err(DatebackError::IllegalState(match self.owner() {
                Some(token) => format!(
                    "transactions are blocked while a dateback runs on branch '{}'",
                    token.branch
                ),
                None => "transactions are blocked while a dateback starts".to_string(),
            })),
        }
    }
}

/// Shared admission to the store; an ordinary one holds off datebacks until dropped.
#[derive(Debug)]
#[must_use = "the access ends as soon as the guard is dropped"]
pub struct AccessGuard<'a> {
    _shared: Option<RwLockReadGuard<'a, ()>>,
}

/// Releases the [`ExclusiveLock`] on drop.
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    lock: &'a ExclusiveLock,
    token: OwnerToken,
    _exclusive: RwLockWriteGuard<'a, ()>,
}

impl ExclusiveGuard<'_> {
    /// Token installed by this guard.
    pub fn token(&self) -> &OwnerToken {
        &self.token
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        // The owner is cleared before the gate opens.
        *self.lock.owner.lock() = None;
    }
}
