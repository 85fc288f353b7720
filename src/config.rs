//! Runtime configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Datastore {
    Postgres { url: String, max_connections: u32 },
    Memory,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub datastore: Datastore,
    pub port: u16,
    pub nats_url: Option<String>,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,
    pub session_idle: Duration,
    pub session_max_entries: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let datastore = match get("DATASTORE").as_deref().unwrap_or("postgres") {
            "postgres" => Datastore::Postgres {
                url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            "memory" => Datastore::Memory,
            other => {
                return Err(ConfigError::Invalid { name: "DATASTORE", value: other.to_string() })
            }
        };

        Ok(Self {
            datastore,
            port: parse_or(&get, "PORT", 8083)?,
            nats_url: get("NATS_URL").filter(|url| !url.is_empty()),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public/uploads/screenshots")),
            upload_max_bytes: parse_or(&get, "UPLOAD_MAX_BYTES", 5 * 1024 * 1024)?,
            session_idle: Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", 86_400)?),
            session_max_entries: parse_or(&get, "SESSION_MAX_ENTRIES", 100_000)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}
