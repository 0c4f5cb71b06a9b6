//! In-memory directory of users and trip collaborators
//!
//! Backs the demo binary in development mode and the test suite. A real
//! deployment wires `UserStore`/`TripAccess` to the application database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::traits::{TripAccess, UserStore};

#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashSet<String>>,
    /// trip_id -> set of user ids with access
    trip_members: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: &str) {
        self.users.write().await.insert(user_id.to_string());
    }

    pub async fn remove_user(&self, user_id: &str) {
        self.users.write().await.remove(user_id);
    }

    pub async fn add_trip_member(&self, trip_id: &str, user_id: &str) {
        self.trip_members
            .write()
            .await
            .entry(trip_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(user_id.to_string());
    }

    pub async fn remove_trip_member(&self, trip_id: &str, user_id: &str) {
        if let Some(members) = self.trip_members.write().await.get_mut(trip_id) {
            members.remove(user_id);
        }
    }
}

#[async_trait]
impl UserStore for MemoryDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        Ok(self.users.read().await.contains(user_id))
    }
}

#[async_trait]
impl TripAccess for MemoryDirectory {
    async fn can_access_trip(&self, user_id: &str, trip_id: &str) -> Result<bool> {
        Ok(self
            .trip_members
            .read()
            .await
            .get(trip_id)
            .map(|members| members.contains(user_id))
            .unwrap_or(false))
    }
}

/// Shared reference used where both traits are served by one directory
pub type SharedDirectory = Arc<MemoryDirectory>;
