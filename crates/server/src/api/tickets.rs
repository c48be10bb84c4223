//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticketdesk_core::{
    AddMessageRequest, AuditEvent, ChangeStatusRequest, CreateTicketRequest, Page, PageRequest,
    SortDirection, SortField, SortKey, Ticket, TicketCategory, TicketDetail, TicketError,
    TicketFilter, TicketMessage, TicketPriority, TicketStatus, TicketStatusHistory, TicketStore,
    UpdateTicketRequest,
};

use super::middleware::Actor;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketBody {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<TicketCategory>,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
    /// Overrides the deadline derived from priority.
    #[serde(default)]
    pub sla_deadline: Option<DateTime<Utc>>,
}

/// Request body for editing a ticket; absent fields stay unchanged
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketBody {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<TicketCategory>,
}

/// Query parameters for searching tickets.
///
/// Every value arrives as text and is parsed here, so malformed input is
/// reported as a `BadFilter` with the usual error body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTicketsParams {
    pub page: Option<String>,
    pub size: Option<String>,
    /// Comma separated `field[:asc|desc]` list.
    pub sort: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<String>,
    pub tenant_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sla_breached: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusBody {
    pub status: TicketStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    /// `null` or absent clears the assignee.
    #[serde(default)]
    pub assigned_to_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriorityBody {
    pub priority: TicketPriority,
}

#[derive(Debug, Deserialize)]
pub struct AddMessageBody {
    pub content: String,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct RateBody {
    pub rating: u8,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TicketErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<TicketErrorResponse>);

fn error_response(e: TicketError) -> ApiError {
    let status = match &e {
        TicketError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketError::BadFilter(_) => StatusCode::BAD_REQUEST,
        TicketError::InvalidTransition { .. } | TicketError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TicketError::ConcurrencyTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        TicketError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "Ticket operation failed");
    }
    (
        status,
        Json(TicketErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Run a blocking store call off the async runtime.
async fn run_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn TicketStore) -> Result<T, TicketError> + Send + 'static,
{
    let store = state.ticket_store();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| error_response(TicketError::Database(format!("store task failed: {}", e))))?
        .map_err(error_response)
}

fn parse_param<T>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>().map_err(|e| {
                error_response(TicketError::BadFilter(format!("{} '{}': {}", name, v, e)))
            })
        })
        .transpose()
}

impl SearchTicketsParams {
    fn to_filter(&self) -> Result<TicketFilter, ApiError> {
        let mut filter = TicketFilter::new();

        if let Some(status) = parse_param("status", self.status.as_deref())? {
            filter = filter.with_status(status);
        }
        if let Some(priority) = parse_param("priority", self.priority.as_deref())? {
            filter = filter.with_priority(priority);
        }
        if let Some(category) = parse_param("category", self.category.as_deref())? {
            filter = filter.with_category(category);
        }
        if let Some(ref assignee) = self.assigned_to {
            filter = filter.with_assigned_to(assignee);
        }
        if let Some(ref tenant_id) = self.tenant_id {
            filter = filter.with_tenant(tenant_id);
        }
        if let Some(breached) = parse_param::<bool>("slaBreached", self.sla_breached.as_deref())? {
            filter = filter.with_sla_breached(breached);
        }
        let date_from = parse_param::<DateTime<Utc>>("dateFrom", self.date_from.as_deref())?;
        let date_to = parse_param::<DateTime<Utc>>("dateTo", self.date_to.as_deref())?;
        if date_from.is_some() || date_to.is_some() {
            filter = filter.with_date_range(date_from, date_to);
        }
        if let Some(ref term) = self.search {
            filter = filter.with_search(term);
        }

        Ok(filter)
    }

    /// `sort` wins over `sortBy`/`sortDirection`; with neither the store
    /// falls back to newest first.
    fn to_page_request(&self, default_size: u32, max_size: u32) -> Result<PageRequest, ApiError> {
        let page = parse_param::<u32>("page", self.page.as_deref())?.unwrap_or(0);
        let size = parse_param::<u32>("size", self.size.as_deref())?
            .unwrap_or(default_size)
            .min(max_size);
        let mut request = PageRequest::new(page, size);

        if let Some(ref sort) = self.sort {
            request.sort = SortKey::parse_list(sort).map_err(error_response)?;
        } else if let Some(field) = parse_param::<SortField>("sortBy", self.sort_by.as_deref())? {
            let direction =
                parse_param::<SortDirection>("sortDirection", self.sort_direction.as_deref())?
                    .unwrap_or(SortDirection::Desc);
            request.sort.push(SortKey { field, direction });
        }

        Ok(request)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new ticket
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(body): Json<CreateTicketBody>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let mut request = CreateTicketRequest::new(body.subject, actor);
    if let Some(description) = body.description {
        request = request.with_description(description);
    }
    if let Some(category) = body.category {
        request = request.with_category(category);
    }
    if let Some(priority) = body.priority {
        request = request.with_priority(priority);
    }
    if let Some(tenant_id) = body.tenant_id {
        request = request.with_tenant(tenant_id);
    }
    if let Some(assignee) = body.assigned_to_id {
        request = request.with_assignee(assignee);
    }
    if let Some(deadline) = body.sla_deadline {
        request = request.with_sla_deadline(deadline);
    }

    let ticket = run_store(&state, move |store| store.create(request)).await?;

    state.audit().try_emit(AuditEvent::TicketCreated {
        ticket_id: ticket.id.clone(),
        ticket_number: ticket.ticket_number.clone(),
        created_by: ticket.created_by.clone(),
        priority: ticket.priority,
        tenant_id: ticket.tenant_id.clone(),
    });

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Search tickets with filters, sorting and pagination
pub async fn search_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchTicketsParams>,
) -> Result<Json<Page<Ticket>>, ApiError> {
    let search = &state.config().search;
    let filter = params.to_filter()?;
    let page = params.to_page_request(search.default_page_size, search.max_page_size)?;

    let result = run_store(&state, move |store| store.search(&filter, &page)).await?;
    Ok(Json(result))
}

/// Get a ticket with its messages and status history
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketDetail>, ApiError> {
    let detail = run_store(&state, move |store| store.get_detail(&id)).await?;
    Ok(Json(detail))
}

/// Look a ticket up by its human-readable number
pub async fn get_ticket_by_number(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = run_store(&state, move |store| {
        store
            .get_by_number(&number)?
            .ok_or(TicketError::NotFound(number))
    })
    .await?;
    Ok(Json(ticket))
}

/// Edit subject, description or category
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<UpdateTicketBody>,
) -> Result<Json<Ticket>, ApiError> {
    let mut request = UpdateTicketRequest::new();
    let mut fields = Vec::new();
    if let Some(subject) = body.subject {
        request = request.with_subject(subject);
        fields.push("subject".to_string());
    }
    if let Some(description) = body.description {
        request = request.with_description(description);
        fields.push("description".to_string());
    }
    if let Some(category) = body.category {
        request = request.with_category(category);
        fields.push("category".to_string());
    }

    let ticket = run_store(&state, move |store| store.update(&id, request)).await?;

    state.audit().try_emit(AuditEvent::TicketUpdated {
        ticket_id: ticket.id.clone(),
        updated_by: actor,
        fields,
    });

    Ok(Json(ticket))
}

/// Move a ticket along its lifecycle
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<ChangeStatusBody>,
) -> Result<Json<Ticket>, ApiError> {
    let mut request = ChangeStatusRequest::new(body.status, actor.clone());
    if let Some(note) = body.note.clone() {
        request = request.with_note(note);
    }

    let (from, ticket) = run_store(&state, move |store| {
        let from = store
            .get(&id)?
            .ok_or_else(|| TicketError::NotFound(id.clone()))?
            .status;
        let ticket = store.change_status(&id, request)?;
        Ok((from, ticket))
    })
    .await?;

    state.audit().try_emit(AuditEvent::TicketStatusChanged {
        ticket_id: ticket.id.clone(),
        from,
        to: ticket.status,
        changed_by: actor,
        note: body.note,
    });

    Ok(Json(ticket))
}

/// Set or clear the assignee
pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<AssignBody>,
) -> Result<Json<Ticket>, ApiError> {
    let assignee = body.assigned_to_id;
    let ticket = run_store(&state, move |store| store.assign(&id, assignee)).await?;

    state.audit().try_emit(AuditEvent::TicketAssigned {
        ticket_id: ticket.id.clone(),
        assigned_by: actor,
        assignee: ticket.assigned_to_id.clone(),
    });

    Ok(Json(ticket))
}

/// Change priority; the SLA deadline is recomputed from creation time
pub async fn change_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<ChangePriorityBody>,
) -> Result<Json<Ticket>, ApiError> {
    let priority = body.priority;
    let ticket = run_store(&state, move |store| store.change_priority(&id, priority)).await?;

    state.audit().try_emit(AuditEvent::TicketPriorityChanged {
        ticket_id: ticket.id.clone(),
        changed_by: actor,
        priority: ticket.priority,
    });

    Ok(Json(ticket))
}

/// Append a message to the conversation
pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<AddMessageBody>,
) -> Result<(StatusCode, Json<TicketMessage>), ApiError> {
    let mut request = AddMessageRequest::new(actor, body.content);
    if body.internal {
        request = request.internal();
    }

    let message = run_store(&state, move |store| store.add_message(&id, request)).await?;

    state.audit().try_emit(AuditEvent::TicketMessageAdded {
        ticket_id: message.ticket_id.clone(),
        message_id: message.id.clone(),
        author_id: message.author_id.clone(),
        internal: message.internal,
    });

    Ok((StatusCode::CREATED, Json(message)))
}

/// List the conversation, oldest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TicketMessage>>, ApiError> {
    let messages = run_store(&state, move |store| store.messages(&id)).await?;
    Ok(Json(messages))
}

/// Status transitions, oldest first
pub async fn status_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TicketStatusHistory>>, ApiError> {
    let history = run_store(&state, move |store| store.status_history(&id)).await?;
    Ok(Json(history))
}

/// Record a satisfaction rating on a resolved or closed ticket
pub async fn rate_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<RateBody>,
) -> Result<Json<Ticket>, ApiError> {
    let rating = body.rating;
    let ticket = run_store(&state, move |store| store.rate(&id, rating)).await?;

    state.audit().try_emit(AuditEvent::TicketRated {
        ticket_id: ticket.id.clone(),
        rated_by: actor,
        rating,
    });

    Ok(Json(ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(query: &str) -> SearchTicketsParams {
        let uri: axum::http::Uri = format!("/api/v1/tickets?{}", query).parse().unwrap();
        Query::<SearchTicketsParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (TicketError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TicketError::BadFilter("x".into()), StatusCode::BAD_REQUEST),
            (
                TicketError::ConcurrencyTimeout("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                TicketError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                TicketError::InvalidTransition {
                    ticket_id: "t".into(),
                    from: TicketStatus::Closed,
                    to: TicketStatus::Open,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                TicketError::Database("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error_response(error).0, expected);
        }
    }

    #[test]
    fn test_page_size_is_clamped() {
        let request = params("size=5000").to_page_request(20, 200).unwrap();
        assert_eq!(request.size, 200);

        let request = SearchTicketsParams::default()
            .to_page_request(20, 200)
            .unwrap();
        assert_eq!(request, PageRequest::new(0, 20));
    }

    #[test]
    fn test_sort_list_takes_precedence() {
        let request = params("sort=priority:desc,subject&sortBy=createdAt")
            .to_page_request(20, 200)
            .unwrap();
        assert_eq!(
            request.sort,
            vec![
                SortKey::desc(SortField::Priority),
                SortKey::asc(SortField::Subject)
            ]
        );
    }

    #[test]
    fn test_sort_by_defaults_to_descending() {
        let request = params("sortBy=updatedAt").to_page_request(20, 200).unwrap();
        assert_eq!(request.sort, vec![SortKey::desc(SortField::UpdatedAt)]);

        let request = params("sortBy=subject&sortDirection=ASC")
            .to_page_request(20, 200)
            .unwrap();
        assert_eq!(request.sort, vec![SortKey::asc(SortField::Subject)]);
    }

    #[test]
    fn test_unknown_enum_values_are_bad_filters() {
        let err = params("status=PENDING").to_filter().unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = params("sortBy=color").to_page_request(20, 200).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_malformed_scalars_are_bad_filters() {
        for query in [
            "dateFrom=yesterday",
            "dateTo=2026-13-40T00:00:00Z",
            "slaBreached=maybe",
        ] {
            let err = params(query).to_filter().unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST, "{}", query);
            assert!(!err.1.error.is_empty());
        }
        for query in ["page=-1", "size=ten"] {
            let err = params(query).to_page_request(20, 200).unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST, "{}", query);
        }
    }

    #[test]
    fn test_scalars_parse_from_text() {
        let filter = params("dateFrom=2026-06-01T00:00:00Z&slaBreached=true")
            .to_filter()
            .unwrap();
        assert_eq!(filter.sla_breached, Some(true));
        assert_eq!(
            filter.date_from.map(|d| d.to_rfc3339()),
            Some("2026-06-01T00:00:00+00:00".to_string())
        );

        let request = params("page=3&size=7").to_page_request(20, 200).unwrap();
        assert_eq!(request, PageRequest::new(3, 7));
    }

    #[test]
    fn test_filter_parses_case_insensitive_enums() {
        let filter = params("status=in_progress&priority=high&category=billing&tenantId=acme")
            .to_filter()
            .unwrap();
        assert_eq!(filter.status, Some(TicketStatus::InProgress));
        assert_eq!(filter.priority, Some(TicketPriority::High));
        assert_eq!(filter.category, Some(TicketCategory::Billing));
        assert_eq!(filter.tenant_id.as_deref(), Some("acme"));
    }
}
