use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticketdesk_core::{AuditFilter, AuditRecord};

use crate::state::AppState;

/// Default limit for audit queries
const DEFAULT_LIMIT: u32 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Filter by ticket ID
    pub ticket_id: Option<String>,
    /// Filter by event type
    pub event_type: Option<String>,
    /// Filter by user ID
    pub user_id: Option<String>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, capped by the store)
    pub limit: Option<u32>,
    /// Pagination offset (default 0)
    pub offset: Option<u32>,
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// Matching events, newest first
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    /// Limit used for this query
    pub limit: u32,
    /// Offset used for this query
    pub offset: u32,
}

/// Error response for audit queries
#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

/// Query audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, (StatusCode, Json<AuditErrorResponse>)> {
    let mut filter = AuditFilter::new()
        .with_limit(params.limit.unwrap_or(DEFAULT_LIMIT))
        .with_offset(params.offset.unwrap_or(0));

    if let Some(ticket_id) = params.ticket_id {
        filter = filter.with_ticket_id(ticket_id);
    }

    if let Some(event_type) = params.event_type {
        filter = filter.with_event_type(event_type);
    }

    if let Some(user_id) = params.user_id {
        filter = filter.with_user_id(user_id);
    }

    if params.from.is_some() || params.to.is_some() {
        filter = filter.with_time_range(params.from, params.to);
    }

    let store = state.audit_store();
    let query_filter = filter.clone();
    let result = tokio::task::spawn_blocking(move || {
        let events = store.query(&query_filter)?;
        let total = store.count(&query_filter)?;
        Ok::<_, ticketdesk_core::AuditError>((events, total))
    })
    .await;

    let (events, total) = match result {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuditErrorResponse {
                    error: format!("Failed to query audit events: {}", e),
                }),
            ));
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuditErrorResponse {
                    error: format!("Audit query task failed: {}", e),
                }),
            ));
        }
    };

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit: filter.effective_limit(),
        offset: filter.offset,
    }))
}
