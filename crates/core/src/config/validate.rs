use super::{types::Config, ConfigError};

/// Upper bound for any SLA window (ten years).
pub const MAX_SLA_HOURS: u32 = 24 * 365 * 10;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Sequence lock timeout is positive
/// - Every SLA target is positive and at most [`MAX_SLA_HOURS`]
/// - Page sizes are ordered and non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.database.lock_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "database.lock_timeout_ms must be greater than 0".to_string(),
        ));
    }

    let sla = &config.sla;
    for (name, hours) in [
        ("urgent_hours", sla.urgent_hours),
        ("high_hours", sla.high_hours),
        ("medium_hours", sla.medium_hours),
        ("low_hours", sla.low_hours),
    ] {
        if hours == 0 {
            return Err(ConfigError::ValidationError(format!(
                "sla.{} must be greater than 0",
                name
            )));
        }
        if hours > MAX_SLA_HOURS {
            return Err(ConfigError::ValidationError(format!(
                "sla.{} must be at most {} (got {})",
                name, MAX_SLA_HOURS, hours
            )));
        }
    }

    let search = &config.search;
    if search.default_page_size == 0 || search.default_page_size > search.max_page_size {
        return Err(ConfigError::ValidationError(format!(
            "search.default_page_size must be between 1 and max_page_size ({})",
            search.max_page_size
        )));
    }

    Ok(())
}
