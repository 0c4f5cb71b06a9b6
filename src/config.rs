//! Server configuration module
//! Handles dynamic configuration parameters for the realtime server

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS_PER_USER,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL_SECS, DEFAULT_PING_TIMEOUT_SECS,
    DEFAULT_PORT, DEFAULT_RATE_LIMIT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
};
use crate::error::{Result, TripSyncError};
use std::env;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum size of a single inbound frame in bytes
    pub max_message_size: usize,
    /// How often the server pings each connection
    pub ping_interval: Duration,
    /// A connection that produces no frame within this window is evicted
    pub ping_timeout: Duration,
    /// Upper bound on the pre-admission authentication exchange
    pub connect_timeout: Duration,
    /// Per-user live connection ceiling
    pub max_connections_per_user: usize,
    /// Connection attempts allowed per source address per window
    pub rate_limit_max_attempts: u32,
    /// Sliding-window length for the rate limiter
    pub rate_limit_window: Duration,
    /// If set, upgrade requests must carry a matching Origin header
    pub allowed_origin: Option<String>,
    /// JWT secret for token validation
    pub jwt_secret: String,
    /// Development mode (seeds a demo directory, relaxes origin checks)
    pub development_mode: bool,
}

impl ServerConfig {
    /// Create a test configuration - only for testing!
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_connections_per_user: DEFAULT_MAX_CONNECTIONS_PER_USER,
            rate_limit_max_attempts: DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            allowed_origin: None,
            jwt_secret: "unit-test-jwt-secret-0123456789-never-in-production".to_string(),
            development_mode: true,
        }
    }

    /// Validate that the JWT secret meets minimum requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(TripSyncError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("TRIP_SYNC_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("TRIP_SYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_message_size = env::var("TRIP_SYNC_MAX_MESSAGE_SIZE")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE);

        let ping_interval_secs = env::var("TRIP_SYNC_PING_INTERVAL")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PING_INTERVAL_SECS);

        let ping_timeout_secs = env::var("TRIP_SYNC_PING_TIMEOUT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PING_TIMEOUT_SECS);

        let connect_timeout_secs = env::var("TRIP_SYNC_CONNECT_TIMEOUT")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let max_connections_per_user = env::var("TRIP_SYNC_MAX_CONN_PER_USER")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_USER);

        let rate_limit_max_attempts = env::var("TRIP_SYNC_RATE_LIMIT_ATTEMPTS")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_ATTEMPTS);

        let rate_limit_window_secs = env::var("TRIP_SYNC_RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);

        let allowed_origin = env::var("TRIP_SYNC_ALLOWED_ORIGIN").ok();

        let development_mode = env::var("TRIP_SYNC_DEVELOPMENT_MODE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let jwt_secret = env::var("TRIP_SYNC_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                TripSyncError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;

        Self::validate_jwt_secret(&jwt_secret)?;

        Ok(Self {
            host,
            port,
            max_message_size,
            ping_interval: Duration::from_secs(ping_interval_secs),
            ping_timeout: Duration::from_secs(ping_timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            max_connections_per_user,
            rate_limit_max_attempts,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            allowed_origin,
            jwt_secret,
            development_mode,
        })
    }
}
