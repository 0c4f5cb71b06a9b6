//! Collaborator interfaces to the persistent application store
//!
//! Trips, users and collaborator rows live in the main application's
//! database; the realtime layer only ever asks two questions of it.

use async_trait::async_trait;

use crate::error::Result;

/// Lookup of user existence in the persistent user store
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns true if the user account still exists.
    async fn user_exists(&self, user_id: &str) -> Result<bool>;
}

/// Trip-level access check against the persistent collaborator table
#[async_trait]
pub trait TripAccess: Send + Sync {
    /// Returns true if the user owns the trip or is a collaborator on it.
    async fn can_access_trip(&self, user_id: &str, trip_id: &str) -> Result<bool>;
}
