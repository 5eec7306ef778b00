use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{AuditHandle, AuditStore, QueuedEvent};
use crate::metrics::AUDIT_EVENTS_LOST;

/// Background task draining the audit channel into the store.
pub struct AuditWriter {
    rx: mpsc::Receiver<QueuedEvent>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<QueuedEvent>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Write events in arrival order until every [`AuditHandle`] is dropped.
    ///
    /// Returns the number of events persisted.
    pub async fn run(mut self) -> u64 {
        info!("Audit writer started");
        let mut written = 0u64;

        while let Some(queued) = self.rx.recv().await {
            let record = queued.into_record();
            match self.store.insert(&record) {
                Ok(_) => written += 1,
                Err(e) => {
                    AUDIT_EVENTS_LOST.with_label_values(&["write_failed"]).inc();
                    error!(event_type = %record.event_type, "Failed to write audit event: {}", e);
                }
            }
        }

        info!(written, "Audit writer drained");
        written
    }
}

/// Wire a handle to a writer over a bounded channel of `buffer_size`.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it finishes once the
/// last handle clone is dropped.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
