//! Support tickets: numbering, lifecycle, conversation and search.

mod query;
mod search;
mod sequence;
mod sla;
mod sqlite_store;
mod store;
mod types;

pub use search::{Page, PageRequest, SortDirection, SortField, SortKey, TicketFilter};
pub use sequence::format_ticket_number;
pub use sla::SlaPolicy;
pub use sqlite_store::{SqliteTicketStore, DEFAULT_LOCK_TIMEOUT};
pub use store::{
    AddMessageRequest, ChangeStatusRequest, CreateTicketRequest, TicketError, TicketStore,
    UpdateTicketRequest,
};
pub use types::{
    ParseEnumError, Ticket, TicketCategory, TicketDetail, TicketMessage, TicketPriority,
    TicketSequence, TicketStatus, TicketStatusHistory,
};
