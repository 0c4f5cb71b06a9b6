// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const REALTIME_PATH: &str = "realtime";

// Admission defaults
pub const DEFAULT_MAX_CONNECTIONS_PER_USER: usize = 5;
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const RATE_LIMIT_SWEEP_INTERVAL_SECS: u64 = 300;

// Connection liveness defaults
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;
