use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{OrphanError, OrphanStore, OrphanedRun};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS orphaned_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_number INTEGER NOT NULL,
        experiment TEXT NOT NULL,
        facility TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        reason TEXT NOT NULL,
        records TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_orphaned_runs_recorded_at ON orphaned_runs(recorded_at);
    CREATE INDEX IF NOT EXISTS idx_orphaned_runs_run_number ON orphaned_runs(run_number);
"#;

type OrphanRow = (i64, i64, String, String, String, String, String);

/// SQLite-backed orphan store
pub struct SqliteOrphanStore {
    conn: Mutex<Connection>,
}

impl SqliteOrphanStore {
    /// Open (or create) the database file and its tables
    pub fn new(path: &Path) -> Result<Self, OrphanError> {
        let conn = Connection::open(path).map_err(|e| OrphanError::Database(e.to_string()))?;
        Self::init(conn)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, OrphanError> {
        let conn =
            Connection::open_in_memory().map_err(|e| OrphanError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, OrphanError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| OrphanError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, OrphanError> {
        self.conn
            .lock()
            .map_err(|_| OrphanError::Database("connection lock poisoned".to_string()))
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<OrphanRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode(
        (id, run_number, experiment, facility, recorded_at, reason, records): OrphanRow,
    ) -> Result<OrphanedRun, OrphanError> {
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OrphanError::Serialization(e.to_string()))?;
        let records =
            serde_json::from_str(&records).map_err(|e| OrphanError::Serialization(e.to_string()))?;

        Ok(OrphanedRun {
            id,
            run_number: run_number as u64,
            experiment,
            facility,
            recorded_at,
            reason,
            records,
        })
    }
}

impl OrphanStore for SqliteOrphanStore {
    fn insert(&self, orphan: &OrphanedRun) -> Result<i64, OrphanError> {
        let records = serde_json::to_string(&orphan.records)
            .map_err(|e| OrphanError::Serialization(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO orphaned_runs (run_number, experiment, facility, recorded_at, reason, records) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                orphan.run_number as i64,
                orphan.experiment,
                orphan.facility,
                orphan.recorded_at.to_rfc3339(),
                orphan.reason,
                records,
            ],
        )
        .map_err(|e| OrphanError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn list(&self, limit: i64) -> Result<Vec<OrphanedRun>, OrphanError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, run_number, experiment, facility, recorded_at, reason, records FROM orphaned_runs ORDER BY id DESC LIMIT ?",
            )
            .map_err(|e| OrphanError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], Self::read_row)
            .map_err(|e| OrphanError::Database(e.to_string()))?;

        let orphans = rows
            .map(|row| {
                row.map_err(|e| OrphanError::Database(e.to_string()))
                    .and_then(Self::decode)
            })
            .collect::<Result<Vec<_>, _>>();
        orphans
    }

    fn get(&self, id: i64) -> Result<Option<OrphanedRun>, OrphanError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, run_number, experiment, facility, recorded_at, reason, records FROM orphaned_runs WHERE id = ?",
                params![id],
                Self::read_row,
            )
            .optional()
            .map_err(|e| OrphanError::Database(e.to_string()))?;

        row.map(Self::decode).transpose()
    }

    fn remove(&self, id: i64) -> Result<bool, OrphanError> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM orphaned_runs WHERE id = ?", params![id])
            .map_err(|e| OrphanError::Database(e.to_string()))?;
        Ok(affected > 0)
    }

    fn count(&self) -> Result<i64, OrphanError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM orphaned_runs", [], |row| row.get(0))
            .map_err(|e| OrphanError::Database(e.to_string()))
    }
}
