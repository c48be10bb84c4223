use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{audit, handlers, middleware::metrics_middleware, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Tickets
        .route(
            "/tickets",
            post(tickets::create_ticket).get(tickets::search_tickets),
        )
        .route("/tickets/number/{number}", get(tickets::get_ticket_by_number))
        .route(
            "/tickets/{id}",
            get(tickets::get_ticket).put(tickets::update_ticket),
        )
        .route("/tickets/{id}/status", put(tickets::change_status))
        .route("/tickets/{id}/assign", put(tickets::assign_ticket))
        .route("/tickets/{id}/priority", put(tickets::change_priority))
        .route(
            "/tickets/{id}/messages",
            post(tickets::add_message).get(tickets::list_messages),
        )
        .route("/tickets/{id}/history", get(tickets::status_history))
        .route("/tickets/{id}/rate", post(tickets::rate_ticket))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
