use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    backend::traits::{BranchRegistry, CommitEntries, StoreMaintenance, TemporalBackend},
    config::DatebackConfig,
    core::{
        lock::{AccessMode, ExclusiveGuard, ExclusiveLock, OwnerToken},
        store::InMemoryStore,
        view::BranchView,
    },
    error::{DatebackError, DatebackResult},
    op::DatebackOperation,
    persist::{OperationLog, memory::MemoryOperationLog},
    types::{Timestamp, Value, WallClockMs},
};

use super::{events::DatebackEvent, session::DatebackSession};

/// Runs dateback sessions under store-wide exclusivity and answers queries over the
/// operation log.
pub struct DatebackManager {
    backend: Arc<dyn TemporalBackend>,
    branches: Arc<dyn BranchRegistry>,
    maintenance: Arc<dyn StoreMaintenance>,
    log: Mutex<Box<dyn OperationLog>>,
    lock: ExclusiveLock,
    session_operations: AtomicUsize,
    events_tx: broadcast::Sender<DatebackEvent>,
    config: DatebackConfig,
}

impl DatebackManager {
    /// Manager over arbitrary collaborators.
    pub fn new(
        backend: Arc<dyn TemporalBackend>,
        branches: Arc<dyn BranchRegistry>,
        maintenance: Arc<dyn StoreMaintenance>,
        log: Box<dyn OperationLog>,
        config: DatebackConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            backend,
            branches,
            maintenance,
            log: Mutex::new(log),
            lock: ExclusiveLock::new(),
            session_operations: AtomicUsize::new(0),
            events_tx,
            config,
        }
    }

    /// Manager over an [`InMemoryStore`] playing every collaborator role.
    pub fn with_log(
        store: Arc<InMemoryStore>,
        log: Box<dyn OperationLog>,
        config: DatebackConfig,
    ) -> Self {
        Self::new(store.clone(), store.clone(), store, log, config)
    }

    /// Manager over an [`InMemoryStore`] with a volatile log and default config.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self::with_log(
            store,
            Box::new(MemoryOperationLog::new()),
            DatebackConfig::default(),
        )
    }

    /// Active configuration.
    pub fn config(&self) -> &DatebackConfig {
        &self.config
    }

    /// New receiver of lifecycle events. Slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<DatebackEvent> {
        self.events_tx.subscribe()
    }

    /// Rewrites history of `branch` through `f`.
    ///
    /// Blocks until no other dateback runs. The session closes and maintenance runs on
    /// every exit path, including a failing or panicking callback; edits logged before a
    /// failure stay applied.
    pub fn dateback<T, E, F>(&self, branch: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DatebackSession<'_>) -> Result<T, E>,
        E: From<DatebackError>,
    {
        if !self.branches.exists(branch) {
            return Err(DatebackError::BranchNotFound(branch.to_string()).into());
        }

        let waiting_since = Instant::now();
        let guard = self.lock.acquire(branch)?;
        let waited_ms = waiting_since.elapsed().as_millis() as u64;
        if self.config.lock_wait_warn_ms > 0 && waited_ms > self.config.lock_wait_warn_ms {
            warn!(branch, waited_ms, "waited long for the dateback lock");
        }
        info!(branch, session = %guard.token().session_id, "dateback started");
        self.session_operations.store(0, Ordering::Release);
        let _ = self.events_tx.send(DatebackEvent::Started {
            branch: branch.to_string(),
        });

        // Drop order matters on unwind: the session closes before maintenance runs.
        let scope = MaintenanceScope {
            manager: self,
            branch,
            _guard: guard,
            finished: false,
        };
        let mut session = DatebackSession::new(self, branch);

        let result = f(&mut session);
        let closed = session.close();
        drop(session);
        let maintained = scope.finish(result.is_ok());

        match result {
            Ok(value) => {
                closed?;
                maintained?;
                Ok(value)
            }
            Err(err) => {
                if let Err(close_err) = closed {
                    warn!(
                        branch,
                        error = %close_err,
                        "session cleanup failed after callback error"
                    );
                }
                if let Err(maintenance_err) = maintained {
                    warn!(
                        branch,
                        error = %maintenance_err,
                        "maintenance failed after callback error"
                    );
                }
                Err(err)
            }
        }
    }

    /// True while any thread holds the exclusive dateback lock.
    pub fn is_dateback_running(&self) -> bool {
        self.lock.is_held()
    }

    /// Holder of the exclusive dateback lock, if any.
    pub fn dateback_owner(&self) -> Option<OwnerToken> {
        self.lock.owner()
    }

    /// Appends an already-built record without touching the backend, e.g. while replaying
    /// the log of a restored dump.
    pub fn add_dateback_operation_to_log(&self, op: DatebackOperation) -> DatebackResult<()> {
        let _access = self.lock.check_access(AccessMode::Ordinary)?;
        self.ensure_branch(op.branch())?;
        let mut log = self.log.lock();
        if log.contains(op.id())? {
            return Err(DatebackError::Precondition(format!(
                "operation {} is already logged",
                op.id()
            )));
        }
        log.append(&op)?;
        debug!(operation = %op, "replayed dateback operation into log");
        Ok(())
    }

    /// Every logged record in append order.
    pub fn all_performed_dateback_operations(&self) -> DatebackResult<Vec<DatebackOperation>> {
        Ok(self.log.lock().all()?)
    }

    /// Records of `branch` and its ancestors created within `[min_wall_clock, max_wall_clock]`,
    /// sorted by branch name, then wall-clock time.
    pub fn dateback_operations_performed_between(
        &self,
        branch: &str,
        min_wall_clock: WallClockMs,
        max_wall_clock: WallClockMs,
    ) -> DatebackResult<Vec<DatebackOperation>> {
        if min_wall_clock > max_wall_clock {
            return Err(DatebackError::Precondition(format!(
                "wall-clock range start {min_wall_clock} is after range end {max_wall_clock}"
            )));
        }
        let chain = self.chain(branch)?;

        let mut out = Vec::new();
        {
            let log = self.log.lock();
            for name in &chain {
                out.extend(log.on_branch(name)?.into_iter().filter(|op| {
                    (min_wall_clock..=max_wall_clock).contains(&op.wall_clock_time())
                }));
            }
        }
        out.sort_by(|a, b| {
            a.branch()
                .cmp(b.branch())
                .then(a.wall_clock_time().cmp(&b.wall_clock_time()))
        });
        Ok(out)
    }

    /// Records visible to a read of `branch` at `timestamp`, root ancestor first.
    ///
    /// An ancestor's record is tested against the branching timestamp of the next branch
    /// down the chain; the target branch's own records are tested against `timestamp`.
    pub fn dateback_operations_affecting_timestamp(
        &self,
        branch: &str,
        timestamp: Timestamp,
    ) -> DatebackResult<Vec<DatebackOperation>> {
        let chain = self.chain(branch)?;
        let mut thresholds = Vec::with_capacity(chain.len());
        for next in chain.iter().skip(1) {
            thresholds.push(self.branches.branching_timestamp(next)?);
        }
        thresholds.push(timestamp);

        let log = self.log.lock();
        let mut out = Vec::new();
        for (name, threshold) in chain.iter().zip(thresholds) {
            out.extend(
                log.on_branch(name)?
                    .into_iter()
                    .filter(|op| op.affects_timestamp(threshold)),
            );
        }
        Ok(out)
    }

    /// Ordinary read-only view of `branch` at `timestamp`. Refused while a dateback runs.
    pub fn view(&self, branch: &str, timestamp: Timestamp) -> DatebackResult<BranchView<'_>> {
        drop(self.lock.check_access(AccessMode::Ordinary)?);
        self.ensure_branch(branch)?;
        Ok(BranchView::new(
            self.backend.as_ref(),
            &self.lock,
            branch,
            timestamp,
            AccessMode::Ordinary,
        ))
    }

    /// Ordinary commit on `branch`. Refused while a dateback runs.
    pub fn commit(
        &self,
        branch: &str,
        entries: &CommitEntries,
        metadata: Option<Value>,
    ) -> DatebackResult<Timestamp> {
        let _access = self.lock.check_access(AccessMode::Ordinary)?;
        self.ensure_branch(branch)?;
        self.backend.commit(branch, entries, metadata)
    }

    /// Head time of `branch`. Refused while a dateback runs.
    pub fn head(&self, branch: &str) -> DatebackResult<Timestamp> {
        let _access = self.lock.check_access(AccessMode::Ordinary)?;
        self.ensure_branch(branch)?;
        self.backend.now(branch)
    }

    pub(crate) fn backend(&self) -> &dyn TemporalBackend {
        self.backend.as_ref()
    }

    pub(crate) fn branches(&self) -> &dyn BranchRegistry {
        self.branches.as_ref()
    }

    pub(crate) fn lock(&self) -> &ExclusiveLock {
        &self.lock
    }

    pub(crate) fn append_to_log(&self, op: &DatebackOperation) -> DatebackResult<()> {
        self.log.lock().append(op)?;
        self.session_operations.fetch_add(1, Ordering::AcqRel);
        debug!(operation = %op, "logged dateback operation");
        let _ = self.events_tx.send(DatebackEvent::OperationLogged {
            id: op.id(),
            branch: op.branch().to_string(),
            earliest_affected_timestamp: op.earliest_affected_timestamp(),
        });
        Ok(())
    }

    fn ensure_branch(&self, branch: &str) -> DatebackResult<()> {
        if !self.branches.exists(branch) {
            return Err(DatebackError::BranchNotFound(branch.to_string()));
        }
        Ok(())
    }

    /// `[origin_0, .., origin_n, branch]`.
    fn chain(&self, branch: &str) -> DatebackResult<Vec<String>> {
        self.ensure_branch(branch)?;
        let mut chain = self.branches.origins(branch)?;
        chain.push(branch.to_string());
        Ok(chain)
    }

    fn run_maintenance(&self, branch: &str) -> DatebackResult<()> {
        let compacted = self.backend.compact(branch);
        self.maintenance.clear_read_caches();
        self.maintenance.clear_query_cache();
        self.maintenance.mark_all_indices_dirty();
        let flushed = self.log.lock().flush();
        compacted?;
        flushed?;
        Ok(())
    }
}

/// Runs post-session maintenance and releases the exclusive lock, on drop if not earlier.
struct MaintenanceScope<'m> {
    manager: &'m DatebackManager,
    branch: &'m str,
    _guard: ExclusiveGuard<'m>,
    finished: bool,
}

impl MaintenanceScope<'_> {
    fn finish(mut self, succeeded: bool) -> DatebackResult<()> {
        self.finished = true;
        self.complete(succeeded)
    }

    fn complete(&self, succeeded: bool) -> DatebackResult<()> {
        let result = self.manager.run_maintenance(self.branch);
        let operations_logged = self.manager.session_operations.load(Ordering::Acquire);
        info!(
            branch = self.branch,
            operations_logged, succeeded, "dateback finished"
        );
        let _ = self.manager.events_tx.send(DatebackEvent::Finished {
            branch: self.branch.to_string(),
            operations_logged,
            succeeded,
        });
        result
    }
}

impl Drop for MaintenanceScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.complete(false) {
            warn!(branch = self.branch, error = %err, "maintenance failed while unwinding");
        }
    }
}
