use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Background task that drains the audit channel into an [`AuditStore`].
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    /// Create a new audit writer
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Run the writer, consuming events until the channel is closed
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");
        let mut written: u64 = 0;

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord {
                id: 0, // Will be set by database
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                ticket_id: envelope.event.ticket_id().map(String::from),
                user_id: envelope.event.user_id().map(String::from),
                data: envelope.event,
            };

            match self.store.insert(&record) {
                Ok(_) => written += 1,
                Err(e) => tracing::error!(
                    event_type = %record.event_type,
                    error = %e,
                    "Failed to write audit event"
                ),
            }
        }

        tracing::info!(written, "Audit writer shutting down");
    }
}

/// Wire a handle to a writer over a channel of `buffer_size` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())`. It exits once every
/// clone of the handle has been dropped.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = AuditHandle::new(tx);
    let writer = AuditWriter::new(rx, store);
    (handle, writer)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter};
    use crate::ticket::{TicketPriority, TicketStatus};

    /// Store that keeps records in memory, optionally failing every insert.
    struct MemoryStore {
        records: Mutex<Vec<AuditRecord>>,
        should_fail: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn records(&self) -> Vec<AuditRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditStore for MemoryStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.should_fail {
                return Err(AuditError::Database("disk full".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let mut stored = record.clone();
            stored.id = records.len() as i64 + 1;
            records.push(stored);
            Ok(records.len() as i64)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn ticket_created(ticket_id: &str) -> AuditEvent {
        AuditEvent::TicketCreated {
            ticket_id: ticket_id.to_string(),
            ticket_number: "TKT-2026-0007".to_string(),
            created_by: "user-456".to_string(),
            priority: TicketPriority::Urgent,
            tenant_id: Some("acme".to_string()),
        }
    }

    fn spawn_system(store: &Arc<MemoryStore>) -> (AuditHandle, tokio::task::JoinHandle<()>) {
        let store_dyn: Arc<dyn AuditStore> = Arc::clone(store) as Arc<dyn AuditStore>;
        let (handle, writer) = create_audit_system(store_dyn, 16);
        (handle, tokio::spawn(writer.run()))
    }

    #[tokio::test]
    async fn test_writer_stores_events_with_extracted_ids() {
        let store = Arc::new(MemoryStore::new());
        let (handle, writer) = spawn_system(&store);

        handle.emit(ticket_created("ticket-123")).await;
        drop(handle);
        writer.await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "ticket_created");
        assert_eq!(records[0].ticket_id.as_deref(), Some("ticket-123"));
        assert_eq!(records[0].user_id.as_deref(), Some("user-456"));
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MemoryStore::failing());
        let (handle, writer) = spawn_system(&store);

        handle.emit(ticket_created("t-1")).await;
        handle.emit(ticket_created("t-2")).await;
        drop(handle);

        writer.await.unwrap();
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_writer_waits_for_every_handle() {
        let store = Arc::new(MemoryStore::new());
        let (main_handle, writer) = spawn_system(&store);
        let request_handle = main_handle.clone();

        request_handle
            .emit(AuditEvent::TicketStatusChanged {
                ticket_id: "t-1".to_string(),
                from: TicketStatus::Open,
                to: TicketStatus::InProgress,
                changed_by: "agent-1".to_string(),
                note: None,
            })
            .await;
        main_handle
            .emit(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;

        drop(main_handle);
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(
            !writer.is_finished(),
            "Writer should keep running while a handle is alive"
        );

        drop(request_handle);
        let result = tokio::time::timeout(tokio::time::Duration::from_secs(1), writer).await;
        assert!(result.is_ok(), "Writer should exit after all handles dropped");

        let types: Vec<_> = store.records().into_iter().map(|r| r.event_type).collect();
        assert_eq!(types, vec!["ticket_status_changed", "service_stopped"]);
    }
}
