//! Connection registry
//!
//! Tracks every live connection, indexed by connection id and by owning
//! user, and enforces the per-user concurrency ceiling at admission.

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use warp::ws::Message;

use crate::auth::token::Identity;
use crate::core::connection::ConnectionHandle;
use crate::error::{Result, TripSyncError};

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<String, ConnectionHandle>,
    /// user_id -> ids of that user's live connections; entries are
    /// removed as soon as the set empties
    user_connections: HashMap<String, HashSet<String>>,
}

pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    max_connections_per_user: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections_per_user: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            max_connections_per_user,
        }
    }

    /// Admit an authenticated identity, creating its connection handle.
    ///
    /// The ceiling check and the insertion happen under one write lock
    /// so concurrent admissions cannot overshoot the limit.
    pub async fn admit(
        &self,
        identity: Identity,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<ConnectionHandle> {
        let mut inner = self.inner.write().await;

        let open = inner
            .user_connections
            .get(&identity.user_id)
            .map(|ids| ids.len())
            .unwrap_or(0);
        if open >= self.max_connections_per_user {
            return Err(TripSyncError::TooManyConnections);
        }

        let handle = ConnectionHandle::new(identity.user_id, identity.email, sender);
        inner
            .user_connections
            .entry(handle.user_id.clone())
            .or_insert_with(HashSet::new)
            .insert(handle.id.clone());
        inner.connections.insert(handle.id.clone(), handle.clone());

        Ok(handle)
    }

    /// Remove a connection. Idempotent: releasing an unknown or
    /// already-released id returns None and changes nothing.
    pub async fn release(&self, connection_id: &str) -> Option<ConnectionHandle> {
        let mut inner = self.inner.write().await;

        let handle = inner.connections.remove(connection_id)?;
        if let Some(ids) = inner.user_connections.get_mut(&handle.user_id) {
            ids.remove(connection_id);
            if ids.is_empty() {
                inner.user_connections.remove(&handle.user_id);
            }
        }
        Some(handle)
    }

    /// Snapshot the handles for a set of connection ids under one read
    /// lock; stale ids are silently skipped
    pub async fn handles(&self, connection_ids: &[String]) -> Vec<ConnectionHandle> {
        let inner = self.inner.read().await;
        connection_ids
            .iter()
            .filter_map(|id| inner.connections.get(id).cloned())
            .collect()
    }

    /// All live connections owned by one user (any number of tabs/devices)
    pub async fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionHandle> {
        let inner = self.inner.read().await;
        inner
            .user_connections
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live connections owned by one user
    pub async fn user_connection_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .user_connections
            .get(user_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Total live connections
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}
