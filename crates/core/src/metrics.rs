//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Ticket lifecycle (creation, status transitions)
//! - Ticket numbering (lock contention)
//! - Search latency

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Tickets created total.
pub static TICKETS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticketdesk_tickets_created_total", "Total tickets created").unwrap()
});

/// Status transitions total by source and target status.
pub static STATUS_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketdesk_status_transitions_total",
            "Total ticket status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Messages added total by visibility.
pub static MESSAGES_ADDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketdesk_messages_added_total", "Total ticket messages"),
        &["visibility"], // "public", "internal"
    )
    .unwrap()
});

// =============================================================================
// Numbering Metrics
// =============================================================================

/// Write lock acquisitions that timed out.
pub static LOCK_TIMEOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ticketdesk_lock_timeouts_total",
        "Total write transactions that timed out waiting for the database lock",
    )
    .unwrap()
});

// =============================================================================
// Search Metrics
// =============================================================================

/// Search duration in seconds.
pub static SEARCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "ticketdesk_search_duration_seconds",
            "Duration of ticket search queries",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(TICKETS_CREATED.clone()),
        Box::new(STATUS_TRANSITIONS.clone()),
        Box::new(MESSAGES_ADDED.clone()),
        // Numbering
        Box::new(LOCK_TIMEOUTS.clone()),
        // Search
        Box::new(SEARCH_DURATION.clone()),
    ]
}
