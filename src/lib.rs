//! Trip Sync - the real-time collaboration core of a trip-planning app
//!
//! This library provides presence, typing indicators and room-scoped
//! broadcast over WebSocket for users viewing or editing the same trip.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
