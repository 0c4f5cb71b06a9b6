//! Interfaces to the persistent application store

pub mod memory;
pub mod traits;

// Re-export main components
pub use memory::{MemoryDirectory, SharedDirectory};
pub use traits::{TripAccess, UserStore};
