//! Request handlers for the server endpoints

pub mod websocket;

// Re-export the route builders
pub use websocket::{handle_rejection, realtime_route};
