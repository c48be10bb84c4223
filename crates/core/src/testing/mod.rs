//! Test doubles and fixtures shared by unit and integration tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticketdesk_core::testing::{fixtures, FixedClock};
//!
//! let (store, clock) = fixtures::store_at(fixtures::reference_time());
//! let ticket = store.create(fixtures::ticket_request("Printer on fire"))?;
//! clock.advance(chrono::Duration::hours(9));
//! ```

mod fixed_clock;

pub use fixed_clock::FixedClock;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::FixedClock;
    use crate::ticket::{
        CreateTicketRequest, SqliteTicketStore, TicketCategory, TicketPriority,
    };

    /// Mid-year instant far from any year boundary.
    pub fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 9, 30, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// In-memory store driven by a [`FixedClock`] starting at `now`.
    pub fn store_at(now: DateTime<Utc>) -> (SqliteTicketStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now));
        let store = SqliteTicketStore::in_memory()
            .expect("in-memory ticket store")
            .with_clock(clock.clone());
        (store, clock)
    }

    /// Medium priority general ticket opened by `customer-1`.
    pub fn ticket_request(subject: &str) -> CreateTicketRequest {
        CreateTicketRequest::new(subject, "customer-1")
            .with_description(format!("{} (reported via portal)", subject))
    }

    /// Ticket request with explicit priority, category and tenant.
    pub fn classified_request(
        subject: &str,
        priority: TicketPriority,
        category: TicketCategory,
        tenant_id: &str,
    ) -> CreateTicketRequest {
        ticket_request(subject)
            .with_priority(priority)
            .with_category(category)
            .with_tenant(tenant_id)
    }
}
