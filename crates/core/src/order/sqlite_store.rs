//! SQLite-backed order store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CodeOutcome, CreateOrderRequest, Order, OrderCompletion, OrderError, OrderFilter, OrderStatus,
    OrderStore,
};

const ORDER_COLUMNS: &str = "id, uid, target_amount, activated_amount, status, error_reason, report, created_at, started_at, finished_at";

/// SQLite-backed order store.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

fn db(e: impl std::fmt::Display) -> OrderError {
    OrderError::Database(e.to_string())
}

// Fixed-width UTC timestamps so text comparison follows time order.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl SqliteOrderStore {
    /// Create a new SQLite order store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, OrderError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite order store (useful for testing).
    pub fn in_memory() -> Result<Self, OrderError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OrderError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                target_amount INTEGER NOT NULL CHECK (target_amount > 0),
                activated_amount INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                error_reason TEXT,
                report TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_status_created ON orders(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_orders_uid ON orders(uid);
            "#,
        )
        .map_err(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, OrderError> {
        self.conn
            .lock()
            .map_err(|_| OrderError::Database("order connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &OrderFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref uid) = filter.uid {
            conditions.push("uid = ?");
            params.push(Box::new(uid.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let status_str: String = row.get(4)?;
        let status = OrderStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!("unknown order status: {}", status_str).into(),
            )
        })?;

        let report_json: String = row.get(6)?;
        let report: Vec<CodeOutcome> = serde_json::from_str(&report_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        let target_amount: i64 = row.get(2)?;
        let activated_amount: i64 = row.get(3)?;
        let created_at: String = row.get(7)?;
        let started_at: Option<String> = row.get(8)?;
        let finished_at: Option<String> = row.get(9)?;

        Ok(Order {
            id: row.get(0)?,
            uid: row.get(1)?,
            target_amount: target_amount as u64,
            activated_amount: activated_amount as u64,
            status,
            error_reason: row.get(5)?,
            report,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            started_at: started_at.as_deref().and_then(parse_timestamp),
            finished_at: finished_at.as_deref().and_then(parse_timestamp),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Order>, OrderError> {
        conn.query_row(
            &format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS),
            params![id],
            Self::row_to_order,
        )
        .optional()
        .map_err(db)
    }

    /// Explain why a guarded update matched no row.
    fn rejection(conn: &Connection, id: &str, operation: &str) -> OrderError {
        match Self::fetch(conn, id) {
            Ok(Some(order)) => {
                let current_status = if order.status == OrderStatus::Pending {
                    "pending (claimed)".to_string()
                } else {
                    order.status.to_string()
                };
                OrderError::InvalidState {
                    order_id: id.to_string(),
                    current_status,
                    operation: operation.to_string(),
                }
            }
            Ok(None) => OrderError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }

    fn fetch_existing(conn: &Connection, id: &str) -> Result<Order, OrderError> {
        Self::fetch(conn, id)?.ok_or_else(|| OrderError::NotFound(id.to_string()))
    }
}

impl OrderStore for SqliteOrderStore {
    fn create(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        if request.target_amount == 0 {
            return Err(OrderError::Invalid("target amount must be positive".to_string()));
        }
        if i64::try_from(request.target_amount).is_err() {
            return Err(OrderError::Invalid("target amount too large".to_string()));
        }
        let uid = request.uid.trim().to_string();
        if uid.is_empty() {
            return Err(OrderError::Invalid("uid must not be empty".to_string()));
        }

        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO orders (id, uid, target_amount, status, created_at, updated_at) VALUES (?, ?, ?, 'pending', ?, ?)",
            params![
                id,
                uid,
                request.target_amount as i64,
                timestamp(now),
                timestamp(now),
            ],
        )
        .map_err(db)?;

        Self::fetch_existing(&conn, &id)
    }

    fn get(&self, id: &str) -> Result<Option<Order>, OrderError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM orders {} ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_order)
            .map_err(db)?;

        let mut orders = Vec::new();
        for row_result in rows {
            orders.push(row_result.map_err(db)?);
        }
        Ok(orders)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM orders {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db)
    }

    fn list_ready(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, OrderError> {
        let conn = self.conn()?;

        let sql = format!(
            "SELECT {} FROM orders WHERE status = 'pending' AND started_at IS NULL AND created_at <= ? ORDER BY created_at ASC, id ASC LIMIT ?",
            ORDER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(params![timestamp(created_before), limit], Self::row_to_order)
            .map_err(db)?;

        let mut orders = Vec::new();
        for row_result in rows {
            orders.push(row_result.map_err(db)?);
        }
        Ok(orders)
    }

    fn claim(&self, id: &str) -> Result<Order, OrderError> {
        let conn = self.conn()?;
        let now = timestamp(Utc::now());

        let updated = conn
            .execute(
                "UPDATE orders SET started_at = ?, updated_at = ? WHERE id = ? AND status = 'pending' AND started_at IS NULL",
                params![now, now, id],
            )
            .map_err(db)?;

        if updated == 0 {
            return Err(Self::rejection(&conn, id, "claim"));
        }
        Self::fetch_existing(&conn, id)
    }

    fn complete(&self, id: &str, completion: OrderCompletion) -> Result<Order, OrderError> {
        if completion.status == OrderStatus::Pending {
            return Err(OrderError::Invalid(
                "completion status must be terminal".to_string(),
            ));
        }

        let conn = self.conn()?;
        let now = timestamp(Utc::now());
        let report_json = serde_json::to_string(&completion.report).map_err(db)?;

        let updated = conn
            .execute(
                "UPDATE orders SET status = ?, activated_amount = ?, error_reason = ?, report = ?, finished_at = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
                params![
                    completion.status.as_str(),
                    completion.activated_amount as i64,
                    completion.error_reason,
                    report_json,
                    now,
                    now,
                    id,
                ],
            )
            .map_err(db)?;

        if updated == 0 {
            return Err(Self::rejection(&conn, id, "complete"));
        }
        Self::fetch_existing(&conn, id)
    }

    fn cancel(&self, id: &str, reason: Option<String>) -> Result<Order, OrderError> {
        let conn = self.conn()?;
        let now = timestamp(Utc::now());

        let updated = conn
            .execute(
                "UPDATE orders SET status = 'cancelled', error_reason = ?, finished_at = ?, updated_at = ? WHERE id = ? AND status = 'pending' AND started_at IS NULL",
                params![reason, now, now, id],
            )
            .map_err(db)?;

        if updated == 0 {
            return Err(Self::rejection(&conn, id, "cancel"));
        }
        Self::fetch_existing(&conn, id)
    }

    fn fail_interrupted(&self, reason: &str) -> Result<Vec<Order>, OrderError> {
        let conn = self.conn()?;
        let now = timestamp(Utc::now());

        let mut stmt = conn
            .prepare(&format!(
                "UPDATE orders SET status = 'error', error_reason = ?, finished_at = ?, updated_at = ? WHERE status = 'pending' AND started_at IS NOT NULL RETURNING {}",
                ORDER_COLUMNS
            ))
            .map_err(db)?;
        let orders = stmt
            .query_map(params![reason, now, now], Self::row_to_order)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ReportStatus;

    fn create(store: &SqliteOrderStore, amount: u64) -> Order {
        store
            .create(CreateOrderRequest {
                uid: "5123456789".to_string(),
                target_amount: amount,
            })
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let order = create(&store, 385);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.target_amount, 385);
        assert_eq!(order.activated_amount, 0);
        assert!(order.started_at.is_none());

        let fetched = store.get(&order.id).unwrap().unwrap();
        assert_eq!(fetched.id, order.id);
        assert_eq!(fetched.uid, "5123456789");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let zero = store.create(CreateOrderRequest {
            uid: "1".to_string(),
            target_amount: 0,
        });
        assert!(matches!(zero, Err(OrderError::Invalid(_))));

        let blank = store.create(CreateOrderRequest {
            uid: "  ".to_string(),
            target_amount: 60,
        });
        assert!(matches!(blank, Err(OrderError::Invalid(_))));
    }

    #[test]
    fn test_claim_only_once() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let order = create(&store, 60);

        let claimed = store.claim(&order.id).unwrap();
        assert!(claimed.started_at.is_some());
        assert_eq!(claimed.status, OrderStatus::Pending);

        let again = store.claim(&order.id);
        assert!(matches!(again, Err(OrderError::InvalidState { .. })));
        assert!(matches!(
            store.claim("missing"),
            Err(OrderError::NotFound(_))
        ));
    }

    #[test]
    fn test_complete_writes_report_once() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let order = create(&store, 120);
        store.claim(&order.id).unwrap();

        let completion = OrderCompletion {
            status: OrderStatus::Completed,
            activated_amount: 120,
            error_reason: None,
            report: vec![CodeOutcome {
                code_id: 1,
                code: "ABCD…WXYZ".to_string(),
                value: 120,
                status: ReportStatus::Success,
                worker: Some("worker-a".to_string()),
                reason: None,
            }],
        };
        let done = store.complete(&order.id, completion.clone()).unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.activated_amount, 120);
        assert_eq!(done.report.len(), 1);
        assert!(done.finished_at.is_some());

        // Terminal orders are immutable
        let second = store.complete(&order.id, OrderCompletion::error("late"));
        assert!(matches!(second, Err(OrderError::InvalidState { .. })));
        let reloaded = store.get(&order.id).unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Completed);
    }

    #[test]
    fn test_complete_rejects_pending_status() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let order = create(&store, 60);
        let completion = OrderCompletion {
            status: OrderStatus::Pending,
            activated_amount: 0,
            error_reason: None,
            report: vec![],
        };
        assert!(matches!(
            store.complete(&order.id, completion),
            Err(OrderError::Invalid(_))
        ));
    }

    #[test]
    fn test_cancel_only_unclaimed_pending() {
        let store = SqliteOrderStore::in_memory().unwrap();

        let open = create(&store, 60);
        let cancelled = store.cancel(&open.id, Some("buyer request".to_string())).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.error_reason.as_deref(), Some("buyer request"));

        let running = create(&store, 60);
        store.claim(&running.id).unwrap();
        match store.cancel(&running.id, None) {
            Err(OrderError::InvalidState { current_status, .. }) => {
                assert_eq!(current_status, "pending (claimed)");
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }

        assert!(matches!(
            store.cancel(&open.id, None),
            Err(OrderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_list_and_count_by_status() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let a = create(&store, 60);
        create(&store, 120);
        store.cancel(&a.id, None).unwrap();

        let pending = OrderFilter::new().with_status(OrderStatus::Pending);
        assert_eq!(store.count(&pending).unwrap(), 1);
        assert_eq!(store.list(&pending).unwrap()[0].target_amount, 120);
        assert_eq!(store.count(&OrderFilter::new()).unwrap(), 2);
        assert_eq!(
            store
                .list(&OrderFilter::new().with_limit(1))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_list_ready_respects_cutoff_and_claims() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let first = create(&store, 60);
        let second = create(&store, 120);
        store.claim(&second.id).unwrap();

        let ready = store.list_ready(Utc::now(), 10).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, first.id);

        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(store.list_ready(past, 10).unwrap().is_empty());
    }

    #[test]
    fn test_fail_interrupted_only_touches_claimed_orders() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let waiting = create(&store, 60);
        let claimed = create(&store, 120);
        let done = create(&store, 180);
        store.claim(&claimed.id).unwrap();
        store.cancel(&done.id, None).unwrap();

        let failed = store.fail_interrupted("interrupted").unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, claimed.id);
        assert_eq!(failed[0].status, OrderStatus::Error);

        let claimed = store.get(&claimed.id).unwrap().unwrap();
        assert_eq!(claimed.status, OrderStatus::Error);
        assert_eq!(claimed.error_reason.as_deref(), Some("interrupted"));
        assert!(claimed.finished_at.is_some());

        let waiting = store.get(&waiting.id).unwrap().unwrap();
        assert_eq!(waiting.status, OrderStatus::Pending);
        assert!(store.cancel(&waiting.id, None).is_ok());
        assert_eq!(
            store.get(&done.id).unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
        assert!(store.fail_interrupted("interrupted").unwrap().is_empty());
    }
}
