//! SQLite-backed ticket store implementation.
//!
//! Writes run inside `BEGIN IMMEDIATE` transactions. That takes the database
//! write lock up front, so number allocation is serialized across every
//! connection and process sharing the file. Waiting for the lock is bounded
//! by the busy timeout; running out of time surfaces as
//! [`TicketError::ConcurrencyTimeout`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use tracing::{debug, info, warn};

use super::query::{
    from_db_time, from_db_time_opt, to_db_time, TicketQuery, TICKET_COLUMNS, UNICODE_LOWER,
};
use super::sequence::{self, format_ticket_number};
use super::{
    AddMessageRequest, ChangeStatusRequest, CreateTicketRequest, Page, PageRequest, SlaPolicy,
    Ticket, TicketError, TicketFilter, TicketMessage, TicketPriority, TicketSequence,
    TicketStatus, TicketStatusHistory, TicketStore, UpdateTicketRequest,
};
use crate::clock::{Clock, SystemClock};
use crate::metrics::{
    LOCK_TIMEOUTS, MESSAGES_ADDED, SEARCH_DURATION, STATUS_TRANSITIONS, TICKETS_CREATED,
};

/// Lock wait used by [`SqliteTicketStore::new`] and [`SqliteTicketStore::in_memory`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    sla: SlaPolicy,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        Self::open(path, DEFAULT_LOCK_TIMEOUT)
    }

    /// Open a file-backed store with an explicit bound on lock waits.
    pub fn open(path: &Path, lock_timeout: Duration) -> Result<Self, TicketError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(lock_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened ticket database");
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(DEFAULT_LOCK_TIMEOUT)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TicketError> {
        register_functions(&conn)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::initialize_schema(&conn, clock.now().year())?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            sla: SlaPolicy::default(),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the SLA windows used for new tickets and priority changes.
    pub fn with_sla_policy(mut self, sla: SlaPolicy) -> Self {
        self.sla = sla;
        self
    }

    fn initialize_schema(conn: &Connection, year: i32) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS ticket_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                year INTEGER NOT NULL,
                last_value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                ticket_number TEXT NOT NULL UNIQUE,
                subject TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                category TEXT NOT NULL,
                tenant_id TEXT,
                created_by TEXT NOT NULL,
                assigned_to_id TEXT,
                sla_deadline TEXT,
                satisfaction_rating INTEGER,
                message_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resolved_at TEXT,
                closed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_priority ON tickets(priority);
            CREATE INDEX IF NOT EXISTS idx_tickets_tenant ON tickets(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_assignee ON tickets(assigned_to_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
            CREATE INDEX IF NOT EXISTS idx_tickets_sla_deadline ON tickets(sla_deadline);

            CREATE TABLE IF NOT EXISTS ticket_messages (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                internal INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id);

            CREATE TABLE IF NOT EXISTS ticket_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                note TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_history_ticket ON ticket_status_history(ticket_id);
            "#,
        )?;

        sequence::bootstrap(conn, year)
    }

    /// Persisted counter state, for diagnostics.
    pub fn sequence_state(&self) -> Result<Option<TicketSequence>, TicketError> {
        let conn = self.conn()?;
        sequence::current(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Database("connection mutex poisoned".to_string()))
    }

    /// Stored timestamps carry microseconds, so values handed back to callers
    /// are truncated the same way.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Run `f` under the database write lock and commit. Any error rolls back.
    fn write<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Transaction<'_>, DateTime<Utc>) -> Result<T, TicketError>,
    ) -> Result<T, TicketError> {
        let mut conn = self.conn()?;
        let result = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(TicketError::from)
            .and_then(|tx| {
                let now = self.now();
                let value = f(&tx, now)?;
                tx.commit()?;
                Ok(value)
            });

        if let Err(TicketError::ConcurrencyTimeout(ref reason)) = result {
            LOCK_TIMEOUTS.inc();
            warn!(operation, reason = %reason, "Timed out waiting for ticket write lock");
        }
        result
    }

    fn load(conn: &Connection, id: &str) -> Result<Ticket, TicketError> {
        conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        )
        .optional()?
        .ok_or_else(|| TicketError::NotFound(id.to_string()))
    }

    fn ensure_exists(conn: &Connection, id: &str) -> Result<(), TicketError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(TicketError::NotFound(id.to_string()))
        }
    }

    fn row_to_ticket(row: &Row) -> rusqlite::Result<Ticket> {
        Ok(Ticket {
            id: row.get(0)?,
            ticket_number: row.get(1)?,
            subject: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            category: row.get(6)?,
            tenant_id: row.get(7)?,
            created_by: row.get(8)?,
            assigned_to_id: row.get(9)?,
            sla_deadline: from_db_time_opt(10, row.get(10)?)?,
            satisfaction_rating: row.get(11)?,
            message_count: row.get(12)?,
            created_at: from_db_time(13, &row.get::<_, String>(13)?)?,
            updated_at: from_db_time(14, &row.get::<_, String>(14)?)?,
            resolved_at: from_db_time_opt(15, row.get(15)?)?,
            closed_at: from_db_time_opt(16, row.get(16)?)?,
        })
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<TicketMessage> {
        Ok(TicketMessage {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            author_id: row.get(2)?,
            content: row.get(3)?,
            internal: row.get(4)?,
            created_at: from_db_time(5, &row.get::<_, String>(5)?)?,
        })
    }

    fn row_to_history(row: &Row) -> rusqlite::Result<TicketStatusHistory> {
        Ok(TicketStatusHistory {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            from_status: row.get(2)?,
            to_status: row.get(3)?,
            changed_by: row.get(4)?,
            changed_at: from_db_time(5, &row.get::<_, String>(5)?)?,
            note: row.get(6)?,
        })
    }
}

/// SQLite's `LOWER()` folds ASCII only; search needs full Unicode folding.
fn register_functions(conn: &Connection) -> Result<(), TicketError> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )?;
    Ok(())
}

fn require_non_blank(field: &str, value: &str) -> Result<(), TicketError> {
    if value.trim().is_empty() {
        Err(TicketError::Validation(format!("{} must not be blank", field)))
    } else {
        Ok(())
    }
}

impl TicketStore for SqliteTicketStore {
    fn next_number(&self) -> Result<String, TicketError> {
        let allocated =
            self.write("next_number", |tx, now| sequence::allocate(tx, now.year()))?;
        Ok(format_ticket_number(allocated.year, allocated.last_value))
    }

    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        require_non_blank("subject", &request.subject)?;
        require_non_blank("createdBy", &request.created_by)?;

        let ticket = self.write("create", |tx, now| {
            let allocated = sequence::allocate(tx, now.year())?;
            let sla_deadline = match request.sla_deadline {
                Some(deadline) => deadline,
                None => self.sla.deadline(request.priority, now)?,
            };
            let ticket = Ticket {
                id: uuid::Uuid::new_v4().to_string(),
                ticket_number: format_ticket_number(allocated.year, allocated.last_value),
                subject: request.subject.trim().to_string(),
                description: request.description,
                status: TicketStatus::Open,
                priority: request.priority,
                category: request.category,
                tenant_id: request.tenant_id,
                created_by: request.created_by,
                assigned_to_id: request.assigned_to_id,
                sla_deadline: Some(sla_deadline),
                satisfaction_rating: None,
                message_count: 0,
                created_at: now,
                updated_at: now,
                resolved_at: None,
                closed_at: None,
            };

            tx.execute(
                &format!(
                    "INSERT INTO tickets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    TICKET_COLUMNS
                ),
                params![
                    ticket.id,
                    ticket.ticket_number,
                    ticket.subject,
                    ticket.description,
                    ticket.status,
                    ticket.priority,
                    ticket.category,
                    ticket.tenant_id,
                    ticket.created_by,
                    ticket.assigned_to_id,
                    ticket.sla_deadline.as_ref().map(to_db_time),
                    ticket.satisfaction_rating,
                    ticket.message_count,
                    to_db_time(&ticket.created_at),
                    to_db_time(&ticket.updated_at),
                    Option::<String>::None,
                    Option::<String>::None,
                ],
            )?;
            Ok(ticket)
        })?;

        TICKETS_CREATED.inc();
        info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            priority = %ticket.priority,
            "Ticket created"
        );
        Ok(ticket)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        match Self::load(&conn, id) {
            Ok(ticket) => Ok(Some(ticket)),
            Err(TicketError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        let ticket = conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE ticket_number = ?", TICKET_COLUMNS),
                params![ticket_number],
                Self::row_to_ticket,
            )
            .optional()?;
        Ok(ticket)
    }

    fn search(
        &self,
        filter: &TicketFilter,
        page: &PageRequest,
    ) -> Result<Page<Ticket>, TicketError> {
        let timer = SEARCH_DURATION.start_timer();

        let query = TicketQuery::from_filter(filter, self.now())?;
        let (count_sql, count_params) = query.count_sql();
        let (page_sql, page_params) = query.page_sql(page)?;

        let mut conn = self.conn()?;
        // Count and page read the same snapshot.
        let tx = conn.transaction()?;
        let total: i64 =
            tx.query_row(&count_sql, params_from_iter(count_params.iter()), |row| row.get(0))?;
        let content = {
            let mut stmt = tx.prepare(&page_sql)?;
            let rows = stmt.query_map(params_from_iter(page_params.iter()), Self::row_to_ticket)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        timer.observe_duration();
        debug!(
            total,
            page = page.page,
            size = page.size,
            returned = content.len(),
            "Ticket search"
        );
        Ok(Page::new(content, page, total))
    }

    fn update(&self, id: &str, request: UpdateTicketRequest) -> Result<Ticket, TicketError> {
        if request.is_empty() {
            return Err(TicketError::Validation(
                "at least one of subject, description or category is required".to_string(),
            ));
        }
        if let Some(ref subject) = request.subject {
            require_non_blank("subject", subject)?;
        }

        let ticket = self.write("update", |tx, now| {
            let mut ticket = Self::load(tx, id)?;
            if let Some(subject) = request.subject {
                ticket.subject = subject.trim().to_string();
            }
            if let Some(description) = request.description {
                ticket.description = description;
            }
            if let Some(category) = request.category {
                ticket.category = category;
            }
            ticket.updated_at = now;
            tx.execute(
                "UPDATE tickets SET subject = ?, description = ?, category = ?, updated_at = ? WHERE id = ?",
                params![
                    ticket.subject,
                    ticket.description,
                    ticket.category,
                    to_db_time(&now),
                    id,
                ],
            )?;
            Ok(ticket)
        })?;

        info!(ticket_id = %id, ticket_number = %ticket.ticket_number, "Ticket updated");
        Ok(ticket)
    }

    fn change_status(
        &self,
        id: &str,
        request: ChangeStatusRequest,
    ) -> Result<Ticket, TicketError> {
        require_non_blank("changedBy", &request.changed_by)?;
        let to = request.status;

        let (from, ticket) = self.write("change_status", |tx, now| {
            let mut ticket = Self::load(tx, id)?;
            let from = ticket.status;
            if !from.can_transition_to(to) {
                return Err(TicketError::InvalidTransition {
                    ticket_id: id.to_string(),
                    from,
                    to,
                });
            }

            ticket.status = to;
            ticket.updated_at = now;
            if to == TicketStatus::Resolved && ticket.resolved_at.is_none() {
                ticket.resolved_at = Some(now);
            }
            if to == TicketStatus::Closed {
                ticket.closed_at = Some(now);
            }

            tx.execute(
                "UPDATE tickets SET status = ?, updated_at = ?, resolved_at = ?, closed_at = ? WHERE id = ?",
                params![
                    ticket.status,
                    to_db_time(&ticket.updated_at),
                    ticket.resolved_at.as_ref().map(to_db_time),
                    ticket.closed_at.as_ref().map(to_db_time),
                    id,
                ],
            )?;
            tx.execute(
                "INSERT INTO ticket_status_history (ticket_id, from_status, to_status, changed_by, changed_at, note) VALUES (?, ?, ?, ?, ?, ?)",
                params![id, from, to, request.changed_by, to_db_time(&now), request.note],
            )?;
            Ok((from, ticket))
        })?;

        STATUS_TRANSITIONS
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        info!(
            ticket_id = %id,
            ticket_number = %ticket.ticket_number,
            from = %from,
            to = %to,
            "Ticket status changed"
        );
        Ok(ticket)
    }

    fn assign(&self, id: &str, assignee: Option<String>) -> Result<Ticket, TicketError> {
        let assignee = assignee.filter(|a| !a.trim().is_empty());
        let ticket = self.write("assign", |tx, now| {
            let mut ticket = Self::load(tx, id)?;
            ticket.assigned_to_id = assignee;
            ticket.updated_at = now;
            tx.execute(
                "UPDATE tickets SET assigned_to_id = ?, updated_at = ? WHERE id = ?",
                params![ticket.assigned_to_id, to_db_time(&now), id],
            )?;
            Ok(ticket)
        })?;

        info!(
            ticket_id = %id,
            assignee = ticket.assigned_to_id.as_deref().unwrap_or("-"),
            "Ticket assignment changed"
        );
        Ok(ticket)
    }

    fn change_priority(&self, id: &str, priority: TicketPriority) -> Result<Ticket, TicketError> {
        let ticket = self.write("change_priority", |tx, now| {
            let mut ticket = Self::load(tx, id)?;
            ticket.priority = priority;
            ticket.sla_deadline = Some(self.sla.deadline(priority, ticket.created_at)?);
            ticket.updated_at = now;
            tx.execute(
                "UPDATE tickets SET priority = ?, sla_deadline = ?, updated_at = ? WHERE id = ?",
                params![
                    ticket.priority,
                    ticket.sla_deadline.as_ref().map(to_db_time),
                    to_db_time(&now),
                    id,
                ],
            )?;
            Ok(ticket)
        })?;

        info!(ticket_id = %id, priority = %priority, "Ticket priority changed");
        Ok(ticket)
    }

    fn add_message(
        &self,
        id: &str,
        request: AddMessageRequest,
    ) -> Result<TicketMessage, TicketError> {
        require_non_blank("content", &request.content)?;
        require_non_blank("authorId", &request.author_id)?;

        let message = self.write("add_message", |tx, now| {
            Self::ensure_exists(tx, id)?;
            let message = TicketMessage {
                id: uuid::Uuid::new_v4().to_string(),
                ticket_id: id.to_string(),
                author_id: request.author_id,
                content: request.content,
                internal: request.internal,
                created_at: now,
            };
            tx.execute(
                "INSERT INTO ticket_messages (id, ticket_id, author_id, content, internal, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    message.id,
                    message.ticket_id,
                    message.author_id,
                    message.content,
                    message.internal,
                    to_db_time(&message.created_at),
                ],
            )?;
            tx.execute(
                "UPDATE tickets SET message_count = message_count + 1, updated_at = ? WHERE id = ?",
                params![to_db_time(&now), id],
            )?;
            Ok(message)
        })?;

        let visibility = if message.internal { "internal" } else { "public" };
        MESSAGES_ADDED.with_label_values(&[visibility]).inc();
        debug!(ticket_id = %id, message_id = %message.id, visibility, "Message added");
        Ok(message)
    }

    fn messages(&self, id: &str) -> Result<Vec<TicketMessage>, TicketError> {
        let conn = self.conn()?;
        Self::ensure_exists(&conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, author_id, content, internal, created_at FROM ticket_messages WHERE ticket_id = ? ORDER BY created_at ASC, rowid ASC",
        )?;
        let messages = stmt
            .query_map(params![id], Self::row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn status_history(&self, id: &str) -> Result<Vec<TicketStatusHistory>, TicketError> {
        let conn = self.conn()?;
        Self::ensure_exists(&conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, from_status, to_status, changed_by, changed_at, note FROM ticket_status_history WHERE ticket_id = ? ORDER BY id ASC",
        )?;
        let history = stmt
            .query_map(params![id], Self::row_to_history)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }

    fn rate(&self, id: &str, rating: u8) -> Result<Ticket, TicketError> {
        if !(1..=5).contains(&rating) {
            return Err(TicketError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let ticket = self.write("rate", |tx, now| {
            let mut ticket = Self::load(tx, id)?;
            if !ticket.status.is_settled() {
                return Err(TicketError::Validation(format!(
                    "only resolved or closed tickets can be rated, ticket is {}",
                    ticket.status
                )));
            }
            ticket.satisfaction_rating = Some(rating);
            ticket.updated_at = now;
            tx.execute(
                "UPDATE tickets SET satisfaction_rating = ?, updated_at = ? WHERE id = ?",
                params![rating, to_db_time(&now), id],
            )?;
            Ok(ticket)
        })?;

        info!(ticket_id = %id, rating, "Ticket rated");
        Ok(ticket)
    }

    fn count_by_status(&self) -> Result<Vec<(TicketStatus, i64)>, TicketError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tickets GROUP BY status")?;
        let counted = stmt
            .query_map([], |row| Ok((row.get::<_, TicketStatus>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TicketStatus::ALL
            .iter()
            .map(|status| {
                let count = counted
                    .iter()
                    .find(|(counted_status, _)| counted_status == status)
                    .map_or(0, |(_, count)| *count);
                (*status, count)
            })
            .collect())
    }
}
