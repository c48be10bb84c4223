//! Resolution deadlines per priority.

use chrono::{DateTime, Duration, Utc};

use crate::config::SlaConfig;
use crate::ticket::{TicketError, TicketPriority};

/// Maps a priority to the time allowed before a ticket counts as breached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaPolicy {
    urgent: Duration,
    high: Duration,
    medium: Duration,
    low: Duration,
}

impl SlaPolicy {
    pub fn resolution_window(&self, priority: TicketPriority) -> Duration {
        match priority {
            TicketPriority::Urgent => self.urgent,
            TicketPriority::High => self.high,
            TicketPriority::Medium => self.medium,
            TicketPriority::Low => self.low,
        }
    }

    /// Deadline for a ticket opened at `opened_at` with the given priority.
    ///
    /// Fails with [`TicketError::Validation`] when the window runs past the
    /// representable date range.
    pub fn deadline(
        &self,
        priority: TicketPriority,
        opened_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, TicketError> {
        let window = self.resolution_window(priority);
        opened_at.checked_add_signed(window).ok_or_else(|| {
            TicketError::Validation(format!(
                "SLA window of {} hours for {} tickets is out of range",
                window.num_hours(),
                priority
            ))
        })
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        SlaPolicy::from(&SlaConfig::default())
    }
}

impl From<&SlaConfig> for SlaPolicy {
    fn from(config: &SlaConfig) -> Self {
        Self {
            urgent: Duration::hours(i64::from(config.urgent_hours)),
            high: Duration::hours(i64::from(config.high_hours)),
            medium: Duration::hours(i64::from(config.medium_hours)),
            low: Duration::hours(i64::from(config.low_hours)),
        }
    }
}
