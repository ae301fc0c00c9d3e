//! Database module
//!
//! Persists the run registry and each run's write-once checkpoint sequence.

mod schema;

pub use schema::*;

use crate::checkpoint::{Checkpoint, StateSnapshot};
use crate::state_machine::Phase;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("Checkpoint {sequence} already exists for run {run_id}")]
    DuplicateCheckpoint { run_id: String, sequence: u32 },
    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Run Operations ====================

    /// Register a new run in the `running` state
    pub fn create_run(&self, id: &str, source_ref: &str) -> DbResult<RunRecord> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO runs (id, source_ref, status, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
            params![id, source_ref, RunStatus::Running.as_str(), now.to_rfc3339()],
        )?;

        Ok(RunRecord {
            id: id.to_string(),
            source_ref: source_ref.to_string(),
            status: RunStatus::Running,
            error: None,
            created_at: now,
            updated_at: now,
            checkpoint_count: 0,
        })
    }

    pub fn get_run(&self, id: &str) -> DbResult<RunRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT r.id, r.source_ref, r.status, r.error, r.created_at, r.updated_at,
                    (SELECT COUNT(*) FROM checkpoints c WHERE c.run_id = r.id)
             FROM runs r WHERE r.id = ?1",
            params![id],
            parse_run_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::RunNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// All runs, newest first
    pub fn list_runs(&self) -> DbResult<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.source_ref, r.status, r.error, r.created_at, r.updated_at,
                    (SELECT COUNT(*) FROM checkpoints c WHERE c.run_id = r.id)
             FROM runs r ORDER BY r.created_at DESC, r.rowid DESC",
        )?;
        let runs = stmt
            .query_map([], parse_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn update_run_status(
        &self,
        id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(DbError::RunNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark runs left `running` by a previous process as `interrupted`
    pub fn mark_interrupted_runs(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE runs SET status = ?1, updated_at = ?2 WHERE status = ?3",
            params![
                RunStatus::Interrupted.as_str(),
                Utc::now().to_rfc3339(),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    // ==================== Checkpoint Operations ====================

    /// Append a checkpoint. Sequences are unique per run and never rewritten.
    pub fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> DbResult<()> {
        let snapshot = serde_json::to_string(&checkpoint.snapshot)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO checkpoints (run_id, sequence, produced_by, next_phase, snapshot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                checkpoint.run_id,
                checkpoint.sequence,
                checkpoint.produced_by.as_str(),
                checkpoint.next_phase.as_str(),
                snapshot,
                checkpoint.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                DbError::DuplicateCheckpoint {
                    run_id: checkpoint.run_id.clone(),
                    sequence: checkpoint.sequence,
                }
            }
            other => DbError::Sqlite(other),
        })?;
        Ok(())
    }

    /// Checkpoints of a run in sequence order
    pub fn list_checkpoints(&self, run_id: &str) -> DbResult<Vec<Checkpoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, sequence, produced_by, next_phase, snapshot, created_at
             FROM checkpoints WHERE run_id = ?1 ORDER BY sequence ASC",
        )?;
        let checkpoints = stmt
            .query_map(params![run_id], parse_checkpoint_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }

    pub fn latest_checkpoint(&self, run_id: &str) -> DbResult<Option<Checkpoint>> {
        let conn = self.conn()?;
        let checkpoint = conn
            .query_row(
                "SELECT run_id, sequence, produced_by, next_phase, snapshot, created_at
                 FROM checkpoints WHERE run_id = ?1 ORDER BY sequence DESC LIMIT 1",
                params![run_id],
                parse_checkpoint_row,
            )
            .optional()?;
        Ok(checkpoint)
    }
}

fn conversion_error(
    index: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into())
}

fn parse_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(2)?;
    Ok(RunRecord {
        id: row.get(0)?,
        source_ref: row.get(1)?,
        status: status.parse().map_err(|e: String| conversion_error(2, e))?,
        error: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
        checkpoint_count: row.get(6)?,
    })
}

fn parse_checkpoint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let produced_by: String = row.get(2)?;
    let next_phase: String = row.get(3)?;
    let snapshot: String = row.get(4)?;
    Ok(Checkpoint {
        run_id: row.get(0)?,
        sequence: row.get(1)?,
        produced_by: produced_by
            .parse::<Phase>()
            .map_err(|e| conversion_error(2, e))?,
        next_phase: next_phase
            .parse::<Phase>()
            .map_err(|e| conversion_error(3, e))?,
        snapshot: serde_json::from_str::<StateSnapshot>(&snapshot)
            .map_err(|e| conversion_error(4, e))?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
