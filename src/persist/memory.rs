//! Volatile operation log.

use hashbrown::{HashMap, HashSet};

use crate::op::{DatebackOperation, OperationId};

use super::{OperationLog, PersistError, PersistResult};

/// [`OperationLog`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    entries: Vec<DatebackOperation>,
    by_branch: HashMap<String, Vec<usize>>,
    ids: HashSet<OperationId>,
}

impl MemoryOperationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationLog for MemoryOperationLog {
    fn append(&mut self, op: &DatebackOperation) -> PersistResult<()> {
        if !self.ids.insert(op.id()) {
            return Err(PersistError::Message(format!(
                "operation {} is already logged",
                op.id()
            )));
        }
        self.by_branch
            .entry(op.branch().to_string())
            .or_default()
            .push(self.entries.len());
        self.entries.push(op.clone());
        Ok(())
    }

    fn contains(&self, id: OperationId) -> PersistResult<bool> {
        Ok(self.ids.contains(&id))
    }

    fn all(&self) -> PersistResult<Vec<DatebackOperation>> {
        Ok(self.entries.clone())
    }

    fn on_branch(&self, branch: &str) -> PersistResult<Vec<DatebackOperation>> {
        Ok(self
            .by_branch
            .get(branch)
            .into_iter()
            .flat_map(|positions| positions.iter())
            .filter_map(|pos| self.entries.get(*pos).cloned())
            .collect())
    }

    fn len(&self) -> PersistResult<usize> {
        Ok(self.entries.len())
    }
}
