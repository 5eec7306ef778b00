//! SQLite-backed stock ledger.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Code, CodeId, CodeState, DenominationCount, FinalizeOutcome, Finalization, FreeCodeFilter,
    ImportResult, NewCode, StockError, StockFilter, StockLedger, StockSummary,
};

const CODE_COLUMNS: &str =
    "id, code, value, state, order_id, buyer_uid, activated_at, error_reason, version, created_at";

/// SQLite-backed stock ledger.
///
/// Reservations are state-guarded `UPDATE ... WHERE state = 'free'`
/// statements inside a transaction, so a code can only leave `Free` once no
/// matter how many allocators race for it.
pub struct SqliteStockLedger {
    conn: Mutex<Connection>,
}

fn db(e: rusqlite::Error) -> StockError {
    StockError::Database(e.to_string())
}

impl SqliteStockLedger {
    /// Open (or create) the ledger at `path`.
    pub fn new(path: &Path) -> Result<Self, StockError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, StockError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StockError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                value INTEGER NOT NULL CHECK (value > 0),
                state TEXT NOT NULL DEFAULT 'free',
                order_id TEXT,
                buyer_uid TEXT,
                activated_at TEXT,
                error_reason TEXT,
                broken_at TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_codes_state_value ON codes(state, value DESC);
            CREATE INDEX IF NOT EXISTS idx_codes_order_id ON codes(order_id);
            "#,
        )
        .map_err(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StockError> {
        self.conn
            .lock()
            .map_err(|_| StockError::Database("stock connection mutex poisoned".to_string()))
    }

    fn row_to_code(row: &rusqlite::Row) -> rusqlite::Result<Code> {
        let state_str: String = row.get(3)?;
        let state = CodeState::parse(&state_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown code state: {}", state_str).into(),
            )
        })?;

        let activated_at: Option<String> = row.get(6)?;
        let created_at: String = row.get(9)?;

        Ok(Code {
            id: row.get(0)?,
            code: row.get(1)?,
            value: row.get(2)?,
            state,
            reserved_for: row.get(4)?,
            buyer_uid: row.get(5)?,
            activated_at: activated_at.as_deref().and_then(parse_timestamp),
            error_reason: row.get(7)?,
            version: row.get(8)?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn build_where_clause(filter: &StockFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(value) = filter.value {
            conditions.push("value = ?");
            params.push(Box::new(value));
        }

        if let Some(ref order_id) = filter.order_id {
            conditions.push("order_id = ?");
            params.push(Box::new(order_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl StockLedger for SqliteStockLedger {
    fn import(&self, codes: &[NewCode]) -> Result<ImportResult, StockError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;
        let now = Utc::now().to_rfc3339();
        let mut result = ImportResult::default();

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO codes (code, value, state, version, created_at, updated_at) \
                     VALUES (?1, ?2, 'free', 0, ?3, ?3)",
                )
                .map_err(db)?;

            for new_code in codes {
                let changed = stmt
                    .execute(params![new_code.code, new_code.value, now])
                    .map_err(db)?;
                if changed == 0 {
                    result.skipped += 1;
                } else {
                    result.inserted += 1;
                }
            }
        }

        tx.commit().map_err(db)?;
        Ok(result)
    }

    fn get(&self, id: CodeId) -> Result<Option<Code>, StockError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM codes WHERE id = ?", CODE_COLUMNS),
            params![id],
            Self::row_to_code,
        )
        .optional()
        .map_err(db)
    }

    fn list(&self, filter: &StockFilter) -> Result<Vec<Code>, StockError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM codes {} ORDER BY id ASC LIMIT ? OFFSET ?",
            CODE_COLUMNS, where_clause
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_code)
            .map_err(db)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    fn find_free(&self, filter: &FreeCodeFilter) -> Result<Vec<Code>, StockError> {
        let conn = self.conn()?;

        let mut conditions = vec!["state = 'free'"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(max_value) = filter.max_value {
            conditions.push("value <= ?");
            params.push(Box::new(max_value));
        }
        if let Some(value) = filter.value {
            conditions.push("value = ?");
            params.push(Box::new(value));
        }

        let mut sql = format!(
            "SELECT {} FROM codes WHERE {} ORDER BY value DESC, id ASC",
            CODE_COLUMNS,
            conditions.join(" AND ")
        );
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit));
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_code)
            .map_err(db)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    fn reserve(&self, code_ids: &[CodeId], order_id: &str) -> Result<(), StockError> {
        if code_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;
        let now = Utc::now().to_rfc3339();
        let mut lost = Vec::new();

        {
            let mut stmt = tx
                .prepare(
                    "UPDATE codes SET state = 'reserved', order_id = ?1, version = version + 1, updated_at = ?2 \
                     WHERE id = ?3 AND state = 'free'",
                )
                .map_err(db)?;

            for id in code_ids {
                if stmt.execute(params![order_id, now, id]).map_err(db)? == 0 {
                    lost.push(*id);
                }
            }
        }

        if !lost.is_empty() {
            tx.rollback().map_err(db)?;
            return Err(StockError::Conflict { code_ids: lost });
        }

        tx.commit().map_err(db)
    }

    fn release(&self, code_ids: &[CodeId]) -> Result<usize, StockError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;
        let now = Utc::now().to_rfc3339();
        let mut released = 0;

        {
            let mut stmt = tx
                .prepare(
                    "UPDATE codes SET state = 'free', order_id = NULL, version = version + 1, updated_at = ?1 \
                     WHERE id = ?2 AND state = 'reserved'",
                )
                .map_err(db)?;
            for id in code_ids {
                released += stmt.execute(params![now, id]).map_err(db)?;
            }
        }

        tx.commit().map_err(db)?;
        Ok(released)
    }

    fn release_order(&self, order_id: &str) -> Result<usize, StockError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE codes SET state = 'free', order_id = NULL, version = version + 1, updated_at = ?1 \
             WHERE order_id = ?2 AND state = 'reserved'",
            params![Utc::now().to_rfc3339(), order_id],
        )
        .map_err(db)
    }

    fn release_all_reserved(&self) -> Result<usize, StockError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE codes SET state = 'free', order_id = NULL, version = version + 1, updated_at = ?1 \
             WHERE state = 'reserved'",
            params![Utc::now().to_rfc3339()],
        )
        .map_err(db)
    }

    fn finalize(
        &self,
        code_id: CodeId,
        finalization: Finalization,
    ) -> Result<FinalizeOutcome, StockError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;

        let row: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT state, order_id FROM codes WHERE id = ?",
                params![code_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db)?;

        let Some((state, owner)) = row else {
            return Err(StockError::NotFound(code_id));
        };
        let current = CodeState::parse(&state).ok_or_else(|| {
            StockError::Database(format!("code {} has an unknown state", code_id))
        })?;

        if current == CodeState::Free {
            return Err(StockError::InvalidState {
                code_id,
                current,
                operation: "finalize".to_string(),
            });
        }
        // Reserved or finalized under another order: not ours to touch.
        if owner.as_deref() != Some(finalization.order_id()) {
            return Err(StockError::Conflict {
                code_ids: vec![code_id],
            });
        }
        if current.is_terminal() {
            return Ok(FinalizeOutcome::AlreadyFinal(current));
        }

        let now = Utc::now().to_rfc3339();
        let target = finalization.target_state();
        let changed = match finalization {
            Finalization::Activated {
                buyer_uid,
                order_id,
            } => tx.execute(
                "UPDATE codes SET state = 'activated', buyer_uid = ?1, activated_at = ?2, \
                 version = version + 1, updated_at = ?2 \
                 WHERE id = ?3 AND state = 'reserved' AND order_id = ?4",
                params![buyer_uid, now, code_id, order_id],
            ),
            Finalization::Broken { reason, order_id } => tx.execute(
                "UPDATE codes SET state = 'broken', error_reason = ?1, broken_at = ?2, \
                 version = version + 1, updated_at = ?2 \
                 WHERE id = ?3 AND state = 'reserved' AND order_id = ?4",
                params![reason, now, code_id, order_id],
            ),
        }
        .map_err(db)?;

        if changed == 0 {
            return Err(StockError::Conflict {
                code_ids: vec![code_id],
            });
        }

        tx.commit().map_err(db)?;
        Ok(FinalizeOutcome::Applied(target))
    }

    fn find_one_free_of_value(
        &self,
        value: u32,
        order_id: &str,
    ) -> Result<Option<Code>, StockError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "UPDATE codes SET state = 'reserved', order_id = ?1, version = version + 1, updated_at = ?2 \
                 WHERE id = (SELECT id FROM codes WHERE state = 'free' AND value = ?3 ORDER BY id ASC LIMIT 1) \
                 AND state = 'free' RETURNING {}",
                CODE_COLUMNS
            ),
            params![order_id, Utc::now().to_rfc3339(), value],
            Self::row_to_code,
        )
        .optional()
        .map_err(db)
    }

    fn summary(&self) -> Result<StockSummary, StockError> {
        let conn = self.conn()?;
        let mut summary = StockSummary::default();

        {
            let mut stmt = conn
                .prepare(
                    "SELECT value, COUNT(*) FROM codes WHERE state = 'free' \
                     GROUP BY value ORDER BY value DESC",
                )
                .map_err(db)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DenominationCount {
                        value: row.get(0)?,
                        free: row.get::<_, i64>(1)? as u64,
                    })
                })
                .map_err(db)?;
            summary.denominations = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)?;
        }

        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM codes GROUP BY state")
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db)?;

        for row in rows {
            let (state, count) = row.map_err(db)?;
            match CodeState::parse(&state) {
                Some(CodeState::Free) => summary.free = count,
                Some(CodeState::Reserved) => summary.reserved = count,
                Some(CodeState::Activated) => summary.activated = count,
                Some(CodeState::Broken) => summary.broken = count,
                None => tracing::warn!("Ignoring {} codes in unknown state {:?}", count, state),
            }
        }

        Ok(summary)
    }
}
