//! Core functionality for the realtime service

pub mod connection;
pub mod events;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod server;

// Re-export main components for convenience
pub use connection::ConnectionHandle;
pub use events::{envelope, ClientEvent, ServerEvent};
pub use rate_limiter::ConnectionRateLimiter;
pub use registry::ConnectionRegistry;
pub use room::RoomManager;
pub use server::{RealtimeServer, SharedRealtimeServer};
