//! Persistent worker registry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::{NewWorker, Worker, WorkerId};

/// Errors from the worker registry.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker not found: {0}")]
    NotFound(WorkerId),

    #[error("worker identity already registered: {0}")]
    Duplicate(String),

    #[error("invalid worker: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Registry of redemption identities.
///
/// The fulfillment orchestrator only reads it. Activation toggles are an
/// operator action.
pub trait WorkerRegistry: Send + Sync {
    /// Active workers in ascending id order.
    fn list_active(&self) -> Result<Vec<Worker>, WorkerError>;

    /// All workers in ascending id order.
    fn list(&self) -> Result<Vec<Worker>, WorkerError>;

    fn get(&self, id: WorkerId) -> Result<Option<Worker>, WorkerError>;

    fn add(&self, worker: NewWorker) -> Result<Worker, WorkerError>;

    fn set_active(&self, id: WorkerId, active: bool) -> Result<Worker, WorkerError>;
}

/// SQLite-backed worker registry.
pub struct SqliteWorkerRegistry {
    conn: Mutex<Connection>,
}

fn db(e: rusqlite::Error) -> WorkerError {
    WorkerError::Database(e.to_string())
}

impl SqliteWorkerRegistry {
    pub fn new(path: &Path) -> Result<Self, WorkerError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, WorkerError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), WorkerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL UNIQUE,
                secret TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, WorkerError> {
        self.conn
            .lock()
            .map_err(|_| WorkerError::Database("worker connection mutex poisoned".to_string()))
    }

    fn row_to_worker(row: &rusqlite::Row) -> rusqlite::Result<Worker> {
        Ok(Worker {
            id: row.get(0)?,
            identity: row.get(1)?,
            secret: row.get(2)?,
            active: row.get(3)?,
        })
    }

    fn query(conn: &Connection, sql: &str) -> Result<Vec<Worker>, WorkerError> {
        let mut stmt = conn.prepare(sql).map_err(db)?;
        let rows = stmt.query_map([], Self::row_to_worker).map_err(db)?;

        let mut workers = Vec::new();
        for row_result in rows {
            workers.push(row_result.map_err(db)?);
        }
        Ok(workers)
    }

    fn fetch(conn: &Connection, id: WorkerId) -> Result<Option<Worker>, WorkerError> {
        conn.query_row(
            "SELECT id, identity, secret, active FROM workers WHERE id = ?",
            params![id],
            Self::row_to_worker,
        )
        .optional()
        .map_err(db)
    }
}

impl WorkerRegistry for SqliteWorkerRegistry {
    fn list_active(&self) -> Result<Vec<Worker>, WorkerError> {
        let conn = self.conn()?;
        Self::query(
            &conn,
            "SELECT id, identity, secret, active FROM workers WHERE active = 1 ORDER BY id ASC",
        )
    }

    fn list(&self) -> Result<Vec<Worker>, WorkerError> {
        let conn = self.conn()?;
        Self::query(
            &conn,
            "SELECT id, identity, secret, active FROM workers ORDER BY id ASC",
        )
    }

    fn get(&self, id: WorkerId) -> Result<Option<Worker>, WorkerError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn add(&self, worker: NewWorker) -> Result<Worker, WorkerError> {
        let identity = worker.identity.trim().to_string();
        if identity.is_empty() {
            return Err(WorkerError::Invalid("identity must not be empty".to_string()));
        }
        if worker.secret.is_empty() {
            return Err(WorkerError::Invalid("secret must not be empty".to_string()));
        }

        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO workers (identity, secret, active, created_at) VALUES (?, ?, ?, ?)",
            params![
                identity,
                worker.secret,
                worker.active,
                chrono::Utc::now().to_rfc3339()
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(WorkerError::Duplicate(identity));
            }
            Err(e) => return Err(db(e)),
        }

        let id = conn.last_insert_rowid();
        Self::fetch(&conn, id)?.ok_or(WorkerError::NotFound(id))
    }

    fn set_active(&self, id: WorkerId, active: bool) -> Result<Worker, WorkerError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE workers SET active = ? WHERE id = ?",
                params![active, id],
            )
            .map_err(db)?;
        if updated == 0 {
            return Err(WorkerError::NotFound(id));
        }
        Self::fetch(&conn, id)?.ok_or(WorkerError::NotFound(id))
    }
}
