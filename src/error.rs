use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum TripSyncError {
    // Admission errors
    RateLimited,
    Unauthorized(String),
    TooManyConnections,

    // Room errors
    Forbidden,

    // Protocol errors
    MessageParseError(String),
    MessageTooLarge(usize),

    // Configuration errors
    ConfigError(String),
}

impl TripSyncError {
    /// Stable error code carried in the `error` event sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate-limited",
            Self::Unauthorized(_) => "unauthorized",
            Self::TooManyConnections => "too-many-connections",
            Self::Forbidden => "forbidden",
            Self::MessageParseError(_) => "bad-message",
            Self::MessageTooLarge(_) => "message-too-large",
            Self::ConfigError(_) => "server-error",
        }
    }
}

impl fmt::Display for TripSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "Too many connection attempts, try again later"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::TooManyConnections => write!(f, "Per-user connection limit reached"),
            Self::Forbidden => write!(f, "Forbidden: no access to this trip"),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::MessageTooLarge(size) => write!(f, "Message too large: {} bytes", size),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for TripSyncError {}

// Generic result type for trip-sync
pub type Result<T> = std::result::Result<T, TripSyncError>;
