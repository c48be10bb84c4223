pub mod audit;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod testing;
pub mod ticket;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditWriter, SqliteAuditStore, MAX_AUDIT_LIMIT,
};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    MAX_SLA_HOURS,
};
pub use ticket::{
    format_ticket_number, AddMessageRequest, ChangeStatusRequest, CreateTicketRequest, Page,
    PageRequest, ParseEnumError, SlaPolicy, SortDirection, SortField, SortKey, SqliteTicketStore,
    Ticket, TicketCategory, TicketDetail, TicketError, TicketFilter, TicketMessage,
    TicketPriority, TicketSequence, TicketStatus, TicketStatusHistory, TicketStore,
    UpdateTicketRequest, DEFAULT_LOCK_TIMEOUT,
};
