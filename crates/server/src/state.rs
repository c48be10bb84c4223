use std::sync::Arc;

use ticketdesk_core::{AuditHandle, AuditStore, Config, SanitizedConfig, TicketStore};

/// Shared application state
pub struct AppState {
    config: Config,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    ticket_store: Arc<dyn TicketStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        ticket_store: Arc<dyn TicketStore>,
    ) -> Self {
        Self {
            config,
            audit,
            audit_store,
            ticket_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.audit_store)
    }

    pub fn ticket_store(&self) -> Arc<dyn TicketStore> {
        Arc::clone(&self.ticket_store)
    }
}
