//! Pre-admission authentication of upgrade requests
//!
//! Runs once, synchronously, before a connection object exists. Any
//! collaborator failure is treated as an authentication failure: the
//! gate fails closed.

use std::sync::Arc;

use log::{debug, warn};

use crate::auth::token::{Identity, TokenValidator};
use crate::error::{Result, TripSyncError};
use crate::storage::traits::UserStore;

pub struct ConnectionAuthenticator {
    validator: Arc<dyn TokenValidator>,
    users: Arc<dyn UserStore>,
}

impl ConnectionAuthenticator {
    pub fn new(validator: Arc<dyn TokenValidator>, users: Arc<dyn UserStore>) -> Self {
        Self { validator, users }
    }

    /// Resolve an upgrade request's token into a verified identity.
    ///
    /// The user store is consulted again after token validation so a
    /// token that outlives a deleted account cannot be admitted.
    pub async fn authenticate(&self, raw_token: Option<&str>) -> Result<Identity> {
        let raw = raw_token
            .ok_or_else(|| TripSyncError::Unauthorized("Missing token".to_string()))?;

        let identity = self.validator.validate(raw).await.map_err(|e| {
            debug!("Token validation failed: {}", e);
            TripSyncError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let exists = self
            .users
            .user_exists(&identity.user_id)
            .await
            .unwrap_or_else(|e| {
                warn!("User store lookup failed for {}: {}", identity.user_id, e);
                false
            });
        if !exists {
            return Err(TripSyncError::Unauthorized(
                "User account no longer exists".to_string(),
            ));
        }

        Ok(identity)
    }
}
