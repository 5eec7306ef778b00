use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    /// SQLite failure, including a poisoned connection mutex.
    #[error("audit database error: {0}")]
    Database(String),

    /// Stored event JSON no longer matches [`AuditEvent`](super::AuditEvent).
    #[error("audit event encoding error: {0}")]
    Serialization(String),
}

/// Audit query. Unset fields match everything; time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub order_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    /// All events of one order, unpaged.
    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self::new().with_order_id(order_id).with_limit(i64::MAX)
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Append-only storage for the audit trail. Records are never updated.
pub trait AuditStore: Send + Sync {
    /// Append a record and return its id.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Matching records, newest first, paged by `limit`/`offset`.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Matching records ignoring `limit`/`offset`.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
