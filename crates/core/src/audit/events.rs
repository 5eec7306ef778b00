use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Order lifecycle
    OrderCreated {
        order_id: String,
        uid: String,
        target_amount: u64,
        created_by: String,
    },
    OrderCancelled {
        order_id: String,
        cancelled_by: String,
        reason: Option<String>,
    },
    OrderStatusChanged {
        order_id: String,
        from_status: String,
        to_status: String,
        activated_amount: u64,
        target_amount: u64,
        reason: Option<String>,
    },

    /// A run reserved its basket and loaded workers.
    FulfillmentStarted {
        order_id: String,
        target_amount: u64,
        basket_size: usize,
        workers: usize,
    },

    // Per-code outcomes
    CodeActivated {
        order_id: String,
        code_id: i64,
        /// Masked code
        code: String,
        value: u32,
        worker: String,
    },
    CodeBroken {
        order_id: String,
        code_id: i64,
        code: String,
        value: u32,
        reason: String,
        worker: String,
        /// Code reserved in its place, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replacement_code_id: Option<i64>,
    },

    // Worker events
    WorkerLockedOut {
        order_id: String,
        worker: String,
        code_id: i64,
    },
    WorkerPoolExhausted {
        order_id: String,
        /// Codes left unprocessed, returned to stock
        codes_released: usize,
    },
    WorkerAdded {
        worker_id: i64,
        identity: String,
        added_by: String,
    },
    WorkerActiveChanged {
        worker_id: i64,
        active: bool,
        changed_by: String,
    },

    // Stock events
    CodesImported {
        imported_by: String,
        inserted: usize,
        skipped: usize,
    },
    ReservationsReleased {
        /// `None` for an operator-wide release
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        released_by: Option<String>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::FulfillmentStarted { .. } => "fulfillment_started",
            Self::CodeActivated { .. } => "code_activated",
            Self::CodeBroken { .. } => "code_broken",
            Self::WorkerLockedOut { .. } => "worker_locked_out",
            Self::WorkerPoolExhausted { .. } => "worker_pool_exhausted",
            Self::WorkerAdded { .. } => "worker_added",
            Self::WorkerActiveChanged { .. } => "worker_active_changed",
            Self::CodesImported { .. } => "codes_imported",
            Self::ReservationsReleased { .. } => "reservations_released",
        }
    }

    /// Extract order_id if this event is order-related
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::OrderCancelled { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::FulfillmentStarted { order_id, .. }
            | Self::CodeActivated { order_id, .. }
            | Self::CodeBroken { order_id, .. }
            | Self::WorkerLockedOut { order_id, .. }
            | Self::WorkerPoolExhausted { order_id, .. } => Some(order_id),
            Self::ReservationsReleased { order_id, .. } => order_id.as_deref(),
            _ => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { created_by, .. } => Some(created_by),
            Self::OrderCancelled { cancelled_by, .. } => Some(cancelled_by),
            Self::WorkerAdded { added_by, .. } => Some(added_by),
            Self::WorkerActiveChanged { changed_by, .. } => Some(changed_by),
            Self::CodesImported { imported_by, .. } => Some(imported_by),
            Self::ReservationsReleased { released_by, .. } => released_by.as_deref(),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.order_id(), None);
        assert_eq!(event.user_id(), None);
    }

    #[test]
    fn test_order_created_ids() {
        let event = AuditEvent::OrderCreated {
            order_id: "o-1".to_string(),
            uid: "5123456789".to_string(),
            target_amount: 385,
            created_by: "storefront".to_string(),
        };
        assert_eq!(event.event_type(), "order_created");
        assert_eq!(event.order_id(), Some("o-1"));
        assert_eq!(event.user_id(), Some("storefront"));
    }

    #[test]
    fn test_operator_release_has_no_order() {
        let event = AuditEvent::ReservationsReleased {
            order_id: None,
            count: 4,
            released_by: Some("admin".to_string()),
        };
        assert_eq!(event.order_id(), None);
        assert_eq!(event.user_id(), Some("admin"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reservations_released");
        assert!(json.get("order_id").is_none());
    }

    #[test]
    fn test_code_broken_roundtrip() {
        let event = AuditEvent::CodeBroken {
            order_id: "o-1".to_string(),
            code_id: 12,
            code: "ABCD…WXYZ".to_string(),
            value: 120,
            reason: "already_redeemed".to_string(),
            worker: "alpha".to_string(),
            replacement_code_id: Some(13),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: AuditEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            AuditEvent::CodeBroken {
                replacement_code_id,
                reason,
                ..
            } => {
                assert_eq!(replacement_code_id, Some(13));
                assert_eq!(reason, "already_redeemed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
