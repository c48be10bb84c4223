use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{TicketPriority, TicketStatus};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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

    // Ticket lifecycle
    TicketCreated {
        ticket_id: String,
        ticket_number: String,
        created_by: String,
        priority: TicketPriority,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tenant_id: Option<String>,
    },
    TicketUpdated {
        ticket_id: String,
        updated_by: String,
        /// Wire names of the edited fields.
        fields: Vec<String>,
    },
    TicketStatusChanged {
        ticket_id: String,
        from: TicketStatus,
        to: TicketStatus,
        changed_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    TicketAssigned {
        ticket_id: String,
        assigned_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<String>,
    },
    TicketPriorityChanged {
        ticket_id: String,
        changed_by: String,
        priority: TicketPriority,
    },

    // Conversation
    TicketMessageAdded {
        ticket_id: String,
        message_id: String,
        author_id: String,
        internal: bool,
    },
    TicketRated {
        ticket_id: String,
        rated_by: String,
        rating: u8,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketUpdated { .. } => "ticket_updated",
            Self::TicketStatusChanged { .. } => "ticket_status_changed",
            Self::TicketAssigned { .. } => "ticket_assigned",
            Self::TicketPriorityChanged { .. } => "ticket_priority_changed",
            Self::TicketMessageAdded { .. } => "ticket_message_added",
            Self::TicketRated { .. } => "ticket_rated",
        }
    }

    /// Extract ticket_id if this event is ticket-related
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Self::TicketCreated { ticket_id, .. }
            | Self::TicketUpdated { ticket_id, .. }
            | Self::TicketStatusChanged { ticket_id, .. }
            | Self::TicketAssigned { ticket_id, .. }
            | Self::TicketPriorityChanged { ticket_id, .. }
            | Self::TicketMessageAdded { ticket_id, .. }
            | Self::TicketRated { ticket_id, .. } => Some(ticket_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::TicketCreated { created_by, .. } => Some(created_by),
            Self::TicketUpdated { updated_by, .. } => Some(updated_by),
            Self::TicketStatusChanged { changed_by, .. }
            | Self::TicketPriorityChanged { changed_by, .. } => Some(changed_by),
            Self::TicketAssigned { assigned_by, .. } => Some(assigned_by),
            Self::TicketMessageAdded { author_id, .. } => Some(author_id),
            Self::TicketRated { rated_by, .. } => Some(rated_by),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub ticket_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
