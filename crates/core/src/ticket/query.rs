//! SQL building for ticket search, plus column codecs shared with the store.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, Value, ValueRef,
};

use super::{
    PageRequest, SortDirection, SortField, TicketCategory, TicketError, TicketFilter,
    TicketPriority, TicketStatus,
};

/// Columns selected for a ticket row, in the order `row_to_ticket` reads them.
pub(crate) const TICKET_COLUMNS: &str = "id, ticket_number, subject, description, status, \
     priority, category, tenant_id, created_by, assigned_to_id, sla_deadline, \
     satisfaction_rating, message_count, created_at, updated_at, resolved_at, closed_at";

/// Scalar function registered on every store connection: Unicode lowercase.
pub(crate) const UNICODE_LOWER: &str = "unicode_lower";

const PRIORITY_RANK: &str =
    "CASE priority WHEN 'LOW' THEN 0 WHEN 'MEDIUM' THEN 1 WHEN 'HIGH' THEN 2 WHEN 'URGENT' THEN 3 END";

const STATUS_RANK: &str = "CASE status WHEN 'OPEN' THEN 0 WHEN 'IN_PROGRESS' THEN 1 \
     WHEN 'WAITING_ON_CLIENT' THEN 2 WHEN 'RESOLVED' THEN 3 WHEN 'CLOSED' THEN 4 END";

// ============================================================================
// Timestamps
// ============================================================================

/// Fixed-width UTC text, so lexical order in SQL matches time order.
pub(crate) fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn from_db_time_opt(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| from_db_time(idx, &raw)).transpose()
}

// ============================================================================
// Enum columns
// ============================================================================

macro_rules! text_enum_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_column!(TicketStatus);
text_enum_column!(TicketPriority);
text_enum_column!(TicketCategory);

// ============================================================================
// Predicates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ge,
    Le,
    Lt,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Lt => "<",
        }
    }
}

/// One condition of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Compare {
        column: &'static str,
        op: Comparison,
        value: Value,
    },
    NotIn {
        column: &'static str,
        values: Vec<Value>,
    },
    NotNull {
        column: &'static str,
    },
    /// Case-insensitive substring match on any of the columns.
    ContainsAny {
        columns: &'static [&'static str],
        needle: String,
    },
}

impl Predicate {
    fn compare(column: &'static str, op: Comparison, value: impl Into<String>) -> Self {
        Predicate::Compare {
            column,
            op,
            value: Value::Text(value.into()),
        }
    }

    fn render(&self, clauses: &mut Vec<String>, params: &mut Vec<Value>) {
        match self {
            Predicate::Compare { column, op, value } => {
                clauses.push(format!("{} {} ?", column, op.as_sql()));
                params.push(value.clone());
            }
            Predicate::NotIn { column, values } => {
                let marks = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} NOT IN ({})", column, marks));
                params.extend(values.iter().cloned());
            }
            Predicate::NotNull { column } => {
                clauses.push(format!("{} IS NOT NULL", column));
            }
            Predicate::ContainsAny { columns, needle } => {
                let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
                let alternatives: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{}({}) LIKE ? ESCAPE '\\'", UNICODE_LOWER, column))
                    .collect();
                clauses.push(format!("({})", alternatives.join(" OR ")));
                params.extend(columns.iter().map(|_| Value::Text(pattern.clone())));
            }
        }
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Filter folded into a list of predicates. The count query and the page
/// query render the same list, so their totals always agree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TicketQuery {
    predicates: Vec<Predicate>,
}

impl TicketQuery {
    /// Build the predicate list. `now` anchors the SLA breach check.
    pub(crate) fn from_filter(
        filter: &TicketFilter,
        now: DateTime<Utc>,
    ) -> Result<Self, TicketError> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(TicketError::BadFilter(format!(
                    "dateFrom {} is after dateTo {}",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
        }

        let mut predicates = Vec::new();

        if let Some(status) = filter.status {
            predicates.push(Predicate::compare("status", Comparison::Eq, status.as_str()));
        }
        if let Some(priority) = filter.priority {
            predicates.push(Predicate::compare("priority", Comparison::Eq, priority.as_str()));
        }
        if let Some(category) = filter.category {
            predicates.push(Predicate::compare("category", Comparison::Eq, category.as_str()));
        }
        if let Some(ref assignee) = filter.assigned_to_id {
            predicates.push(Predicate::compare("assigned_to_id", Comparison::Eq, assignee.clone()));
        }
        if let Some(ref tenant) = filter.tenant_id {
            predicates.push(Predicate::compare("tenant_id", Comparison::Eq, tenant.clone()));
        }
        if filter.sla_breached == Some(true) {
            predicates.push(Predicate::NotIn {
                column: "status",
                values: vec![
                    Value::Text(TicketStatus::Closed.as_str().to_string()),
                    Value::Text(TicketStatus::Resolved.as_str().to_string()),
                ],
            });
            predicates.push(Predicate::NotNull {
                column: "sla_deadline",
            });
            predicates.push(Predicate::compare("sla_deadline", Comparison::Lt, to_db_time(&now)));
        }
        if let Some(from) = filter.date_from {
            predicates.push(Predicate::compare("created_at", Comparison::Ge, to_db_time(&from)));
        }
        if let Some(to) = filter.date_to {
            predicates.push(Predicate::compare("created_at", Comparison::Le, to_db_time(&to)));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim) {
            if !term.is_empty() {
                predicates.push(Predicate::ContainsAny {
                    columns: &["subject", "ticket_number"],
                    needle: term.to_string(),
                });
            }
        }

        Ok(Self { predicates })
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for predicate in &self.predicates {
            predicate.render(&mut clauses, &mut params);
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }

    pub(crate) fn count_sql(&self) -> (String, Vec<Value>) {
        let (where_sql, params) = self.where_clause();
        (format!("SELECT COUNT(*) FROM tickets{}", where_sql), params)
    }

    pub(crate) fn page_sql(&self, page: &PageRequest) -> Result<(String, Vec<Value>), TicketError> {
        if page.size == 0 {
            return Err(TicketError::BadFilter("page size must be at least 1".to_string()));
        }

        let (where_sql, mut params) = self.where_clause();
        let sql = format!(
            "SELECT {} FROM tickets{} ORDER BY {} LIMIT ? OFFSET ?",
            TICKET_COLUMNS,
            where_sql,
            order_by(page)
        );
        params.push(Value::Integer(i64::from(page.size)));
        params.push(Value::Integer(page.offset()));
        Ok((sql, params))
    }
}

fn sort_expression(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::TicketNumber => "ticket_number",
        SortField::Subject => "subject",
        SortField::Status => STATUS_RANK,
        SortField::Priority => PRIORITY_RANK,
        SortField::Category => "category",
        SortField::SlaDeadline => "sla_deadline",
        SortField::ResolvedAt => "resolved_at",
    }
}

/// Requested keys (newest first when none), then `id` so pages never overlap.
fn order_by(page: &PageRequest) -> String {
    let mut keys: Vec<String> = if page.sort.is_empty() {
        vec![format!("created_at {}", SortDirection::Desc.as_sql())]
    } else {
        page.sort
            .iter()
            .map(|key| format!("{} {}", sort_expression(key.field), key.direction.as_sql()))
            .collect()
    };
    keys.push("id ASC".to_string());
    keys.join(", ")
}
