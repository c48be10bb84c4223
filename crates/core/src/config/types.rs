use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a writer waits for the sequence lock before giving up.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ticketdesk.db")
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

/// Resolution targets per priority, in hours.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SlaConfig {
    #[serde(default = "default_urgent_hours")]
    pub urgent_hours: u32,
    #[serde(default = "default_high_hours")]
    pub high_hours: u32,
    #[serde(default = "default_medium_hours")]
    pub medium_hours: u32,
    #[serde(default = "default_low_hours")]
    pub low_hours: u32,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            urgent_hours: default_urgent_hours(),
            high_hours: default_high_hours(),
            medium_hours: default_medium_hours(),
            low_hours: default_low_hours(),
        }
    }
}

fn default_urgent_hours() -> u32 {
    4
}

fn default_high_hours() -> u32 {
    8
}

fn default_medium_hours() -> u32 {
    24
}

fn default_low_hours() -> u32 {
    72
}

/// Ticket listing defaults
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    200
}

/// Config view for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: SanitizedDatabaseConfig,
    pub sla: SlaConfig,
    pub search: SearchConfig,
}

/// Database config without the filesystem location.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDatabaseConfig {
    pub file_name: Option<String>,
    pub lock_timeout_ms: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: SanitizedDatabaseConfig {
                file_name: config
                    .database
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                lock_timeout_ms: config.database.lock_timeout_ms,
            },
            sla: config.sla.clone(),
            search: config.search.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "ticketdesk.db");
        assert_eq!(config.database.lock_timeout_ms, 5_000);
        assert_eq!(config.sla, SlaConfig::default());
        assert_eq!(config.search.default_page_size, 20);
    }

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_partial_sla_section() {
        let toml = r#"
[sla]
urgent_hours = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sla.urgent_hours, 2);
        assert_eq!(config.sla.high_hours, 8);
        assert_eq!(config.sla.low_hours, 72);
    }

    #[test]
    fn test_deserialize_custom_database() {
        let toml = r#"
[database]
path = "/data/tickets.sqlite"
lock_timeout_ms = 250
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/tickets.sqlite");
        assert_eq!(config.database.lock_timeout_ms, 250);
    }

    #[test]
    fn test_sanitized_config_hides_directory() {
        let mut config = Config::default();
        config.database.path = PathBuf::from("/srv/secret/dir/tickets.db");

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.database.file_name.as_deref(), Some("tickets.db"));
        assert_eq!(sanitized.server.port, 8080);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("/srv/secret"));
    }
}
