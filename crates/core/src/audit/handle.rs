use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::AuditEvent;

/// Audit event stamped with the time it was emitted.
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Handle for emitting audit events
///
/// Cloneable and shared across request handlers. Events go through a bounded
/// channel to the [`AuditWriter`](super::AuditWriter); a full or closed
/// channel drops the event and logs it, the caller never fails.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        if self.tx.send(AuditEventEnvelope::now(event)).await.is_err() {
            tracing::error!(event_type, "Audit channel closed, event dropped");
        }
    }

    /// Emit without waiting. Returns false when the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        let event_type = event.event_type();
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(event_type, error = %e, "Failed to emit audit event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus;

    fn status_changed(ticket_id: &str) -> AuditEvent {
        AuditEvent::TicketStatusChanged {
            ticket_id: ticket_id.to_string(),
            from: TicketStatus::Open,
            to: TicketStatus::InProgress,
            changed_by: "agent-1".to_string(),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = AuditHandle::new(tx);

        handle.emit(status_changed("t-1")).await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert_eq!(envelope.event.ticket_id(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_cloned_handles_share_channel() {
        let (tx, mut rx) = mpsc::channel(10);
        let first = AuditHandle::new(tx);
        let second = first.clone();

        first.emit(status_changed("t-1")).await;
        second
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        let e1 = rx.recv().await.expect("Should receive first event");
        let e2 = rx.recv().await.expect("Should receive second event");
        assert!(matches!(e1.event, AuditEvent::TicketStatusChanged { .. }));
        assert!(matches!(e2.event, AuditEvent::ServiceStopped { .. }));
    }

    #[test]
    fn test_try_emit_full_channel_drops() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = AuditHandle::new(tx);

        let before = Utc::now();
        assert!(handle.try_emit(status_changed("t-1")));
        assert!(!handle.try_emit(status_changed("t-2")));

        let envelope = rx.try_recv().expect("Should receive event");
        assert!(envelope.timestamp >= before);
        assert_eq!(envelope.event.ticket_id(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_emit_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel::<AuditEventEnvelope>(10);
        let handle = AuditHandle::new(tx);
        drop(rx);

        handle.emit(status_changed("t-1")).await;
        assert!(!handle.try_emit(status_changed("t-2")));
    }
}
