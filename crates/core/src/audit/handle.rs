use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use super::{AuditEvent, AuditRecord};
use crate::metrics::AUDIT_EVENTS_LOST;

/// An event stamped at emission time, queued for the writer.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub emitted_at: DateTime<Utc>,
    pub event: AuditEvent,
}

impl QueuedEvent {
    fn stamp(event: AuditEvent) -> Self {
        Self {
            emitted_at: Utc::now(),
            event,
        }
    }

    /// Build the storage row. The id is assigned on insert.
    pub fn into_record(self) -> AuditRecord {
        AuditRecord {
            id: 0,
            timestamp: self.emitted_at,
            event_type: self.event.event_type().to_string(),
            order_id: self.event.order_id().map(String::from),
            user_id: self.event.user_id().map(String::from),
            data: self.event,
        }
    }
}

/// Sender side of the audit pipeline.
///
/// Clone one into every component that records events. Losing an event is
/// logged and counted but never fails the caller: a fulfillment run must not
/// stop because the audit trail is behind.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<QueuedEvent>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<QueuedEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        if self.tx.send(QueuedEvent::stamp(event)).await.is_err() {
            AUDIT_EVENTS_LOST.with_label_values(&["channel_closed"]).inc();
            error!(event_type, "Audit writer gone, event lost");
        }
    }

    /// Queue an event without waiting, for request handlers.
    ///
    /// Returns false when the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        let event_type = event.event_type();
        match self.tx.try_send(QueuedEvent::stamp(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                AUDIT_EVENTS_LOST.with_label_values(&["channel_full"]).inc();
                warn!(event_type, "Audit channel full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                AUDIT_EVENTS_LOST.with_label_values(&["channel_closed"]).inc();
                error!(event_type, "Audit writer gone, event lost");
                false
            }
        }
    }
}
