//! Filter, sort and pagination types for ticket search.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{TicketCategory, TicketError, TicketPriority, TicketStatus};

/// Optional criteria for listing tickets. Every field that is set narrows the
/// result (logical AND); unset fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub assigned_to_id: Option<String>,
    pub tenant_id: Option<String>,
    /// `Some(true)` keeps only breached tickets. `Some(false)` is the same as unset.
    pub sla_breached: Option<bool>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the subject or the ticket number.
    pub search: Option<String>,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: TicketPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_category(mut self, category: TicketCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to_id = Some(assignee.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_sla_breached(mut self, breached: bool) -> Self {
        self.sla_breached = Some(breached);
        self
    }

    pub fn with_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Fields a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    TicketNumber,
    Subject,
    Status,
    Priority,
    Category,
    SlaDeadline,
    ResolvedAt,
}

impl SortField {
    pub const ALL: [SortField; 9] = [
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::TicketNumber,
        SortField::Subject,
        SortField::Status,
        SortField::Priority,
        SortField::Category,
        SortField::SlaDeadline,
        SortField::ResolvedAt,
    ];

    /// Name accepted on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::TicketNumber => "ticketNumber",
            SortField::Subject => "subject",
            SortField::Status => "status",
            SortField::Priority => "priority",
            SortField::Category => "category",
            SortField::SlaDeadline => "slaDeadline",
            SortField::ResolvedAt => "resolvedAt",
        }
    }
}

impl FromStr for SortField {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        SortField::ALL
            .into_iter()
            .find(|field| field.wire_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| TicketError::BadFilter(format!("unknown sort field '{}'", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(TicketError::BadFilter(format!(
                "unknown sort direction '{}'",
                other
            ))),
        }
    }
}

/// One `(field, direction)` entry of an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Parse a comma separated list of `field[:asc|desc]` entries.
    ///
    /// `"priority:desc,createdAt"` yields priority descending, then creation
    /// time ascending. Empty entries are skipped.
    pub fn parse_list(input: &str) -> Result<Vec<SortKey>, TicketError> {
        input.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for SortKey {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(':') {
            Some((field, direction)) => (field.parse()?, direction.parse()?),
            None => (s.parse()?, SortDirection::Asc),
        };
        Ok(SortKey { field, direction })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}:{}", self.field.wire_name(), direction)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Zero-indexed page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    /// Applied in order. Empty means newest first.
    pub sort: Vec<SortKey>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: Vec::new(),
        }
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

/// A page of results plus the totals needed to render pagination.
///
/// Field names are part of the public wire format.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
    pub first: bool,
    pub last: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: i64) -> Self {
        let size = i64::from(request.size.max(1));
        let total_pages = (total_elements + size - 1) / size;
        let page = i64::from(request.page);
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
            first: page == 0,
            last: page + 1 >= total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
        }
    }
}
