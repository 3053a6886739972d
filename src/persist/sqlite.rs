//! SQLite-backed append-only operation log.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::op::{DatebackOperation, OperationId, PersistedKind};

use super::{OperationLog, PersistResult, decode_operation, encode_operation};

/// SQLite implementation of [`crate::persist::OperationLog`].
pub struct SqliteOperationLog {
    conn: Connection,
}

impl SqliteOperationLog {
    /// Opens or creates a SQLite-backed log at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite log.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    fn load(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> PersistResult<Vec<DatebackOperation>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, Vec<u8>>(0))?;

        let mut out = Vec::new();
        for payload in rows {
            out.push(decode_operation(&payload?)?);
        }
        Ok(out)
    }
}

impl OperationLog for SqliteOperationLog {
    fn append(&mut self, op: &DatebackOperation) -> PersistResult<()> {
        let payload = encode_operation(op)?;
        let kind = PersistedKind::from(op.kind()).tag();
        self.conn.execute(
            "INSERT INTO dateback_operations(id, branch, wall_clock_ms, kind, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                op.id().to_string(),
                op.branch(),
                op.wall_clock_time() as i64,
                kind,
                payload,
            ],
        )?;
        Ok(())
    }

    fn contains(&self, id: OperationId) -> PersistResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM dateback_operations WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn all(&self) -> PersistResult<Vec<DatebackOperation>> {
        self.load(
            "SELECT payload FROM dateback_operations ORDER BY seq ASC",
            [],
        )
    }

    fn on_branch(&self, branch: &str) -> PersistResult<Vec<DatebackOperation>> {
        self.load(
            "SELECT payload FROM dateback_operations WHERE branch = ?1 ORDER BY seq ASC",
            params![branch],
        )
    }

    fn len(&self) -> PersistResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dateback_operations", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}
