//! Server configuration loaded from environment variables.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Countdown length for a newly created poll, in seconds
    pub poll_seconds: u32,
    /// Heartbeat ping interval; a connection missing one full cycle is closed
    pub heartbeat_secs: u64,
    /// Path of the JSON store file (None = persistence disabled)
    pub data_file: Option<PathBuf>,
    /// How long closed rooms are kept around for reloading
    pub retention_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            poll_seconds: 60,
            heartbeat_secs: 30,
            data_file: None,
            retention_hours: 24,
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let poll_seconds = std::env::var("POLL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.poll_seconds);

        let heartbeat_secs = std::env::var("HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.heartbeat_secs);

        let data_file = std::env::var("POLL_DATA_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let retention_hours = std::env::var("RETENTION_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.retention_hours);

        if data_file.is_none() {
            tracing::warn!("POLL_DATA_FILE not set - rooms will not survive a restart");
        }

        tracing::info!(
            port,
            poll_seconds,
            heartbeat_secs,
            retention_hours,
            persistence = data_file.is_some(),
            "Server config loaded"
        );

        Self {
            port,
            poll_seconds,
            heartbeat_secs,
            data_file,
            retention_hours,
        }
    }
}
