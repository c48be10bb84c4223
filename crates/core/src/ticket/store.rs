//! Ticket storage trait and request types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ticket::{
    Page, PageRequest, Ticket, TicketCategory, TicketDetail, TicketFilter, TicketMessage,
    TicketPriority, TicketStatus, TicketStatusHistory,
};

/// Error type for ticket operations.
#[derive(Debug, Error)]
pub enum TicketError {
    /// Ticket not found.
    #[error("Ticket not found: {0}")]
    NotFound(String),

    /// Malformed search criteria (bad sort field, inverted date range, ...).
    #[error("Invalid filter: {0}")]
    BadFilter(String),

    /// The write lock was not acquired within the configured timeout.
    #[error("Timed out waiting for ticket lock: {0}")]
    ConcurrencyTimeout(String),

    /// The requested status change is not an edge of the lifecycle.
    #[error("Cannot move ticket {ticket_id} from {from} to {to}")]
    InvalidTransition {
        ticket_id: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    /// Request payload rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for TicketError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                TicketError::ConcurrencyTimeout(e.to_string())
            }
            _ => TicketError::Database(e.to_string()),
        }
    }
}

/// Request to open a new ticket.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub tenant_id: Option<String>,
    /// User opening the ticket.
    pub created_by: String,
    pub assigned_to_id: Option<String>,
    /// Overrides the deadline the SLA policy would compute.
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl CreateTicketRequest {
    pub fn new(subject: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            description: String::new(),
            category: TicketCategory::default(),
            priority: TicketPriority::default(),
            tenant_id: None,
            created_by: created_by.into(),
            assigned_to_id: None,
            sla_deadline: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: TicketCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: TicketPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to_id = Some(assignee.into());
        self
    }

    pub fn with_sla_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.sla_deadline = Some(deadline);
        self
    }
}

/// Edit of a ticket's descriptive fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub category: Option<TicketCategory>,
}

impl UpdateTicketRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: TicketCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.description.is_none() && self.category.is_none()
    }
}

/// Request to move a ticket to another status.
#[derive(Debug, Clone)]
pub struct ChangeStatusRequest {
    pub status: TicketStatus,
    pub changed_by: String,
    pub note: Option<String>,
}

impl ChangeStatusRequest {
    pub fn new(status: TicketStatus, changed_by: impl Into<String>) -> Self {
        Self {
            status,
            changed_by: changed_by.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Request to append a message to a ticket's conversation.
#[derive(Debug, Clone)]
pub struct AddMessageRequest {
    pub author_id: String,
    pub content: String,
    pub internal: bool,
}

impl AddMessageRequest {
    pub fn new(author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            content: content.into(),
            internal: false,
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// Trait for ticket storage implementations.
pub trait TicketStore: Send + Sync {
    /// Issue the next ticket number, `TKT-<year>-<seq>`.
    ///
    /// Every call returns a value no other call has returned, across
    /// threads and across processes sharing the same database.
    fn next_number(&self) -> Result<String, TicketError>;

    /// Create a ticket. The number is allocated in the same transaction as
    /// the insert, so a failed insert does not consume it.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// Get a ticket by its human-readable number.
    fn get_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, TicketError>;

    /// Paged, filtered, sorted listing. `total_elements` counts every match.
    fn search(
        &self,
        filter: &TicketFilter,
        page: &PageRequest,
    ) -> Result<Page<Ticket>, TicketError>;

    /// Edit subject, description or category.
    fn update(&self, id: &str, request: UpdateTicketRequest) -> Result<Ticket, TicketError>;

    /// Apply a lifecycle transition and append it to the status history.
    fn change_status(
        &self,
        id: &str,
        request: ChangeStatusRequest,
    ) -> Result<Ticket, TicketError>;

    /// Set or clear the assignee.
    fn assign(&self, id: &str, assignee: Option<String>) -> Result<Ticket, TicketError>;

    /// Change priority and recompute the SLA deadline from `created_at`.
    fn change_priority(&self, id: &str, priority: TicketPriority) -> Result<Ticket, TicketError>;

    /// Append a message and bump the ticket's message count.
    fn add_message(
        &self,
        id: &str,
        request: AddMessageRequest,
    ) -> Result<TicketMessage, TicketError>;

    /// Messages in the order they were written.
    fn messages(&self, id: &str) -> Result<Vec<TicketMessage>, TicketError>;

    /// Status changes in the order they happened.
    fn status_history(&self, id: &str) -> Result<Vec<TicketStatusHistory>, TicketError>;

    /// Record a satisfaction score (1 to 5) on a resolved or closed ticket.
    fn rate(&self, id: &str, rating: u8) -> Result<Ticket, TicketError>;

    /// Number of tickets in each status, every status listed once.
    fn count_by_status(&self) -> Result<Vec<(TicketStatus, i64)>, TicketError>;

    /// Ticket with its messages and status history.
    fn get_detail(&self, id: &str) -> Result<TicketDetail, TicketError> {
        let ticket = self
            .get(id)?
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;
        Ok(TicketDetail {
            messages: self.messages(id)?,
            status_history: self.status_history(id)?,
            ticket,
        })
    }
}
