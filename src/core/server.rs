//! Integrated realtime service coordinating admission, rooms and fan-out
//!
//! One instance per process. The REST layer receives a clone of the
//! shared handle at construction time and pushes post-mutation events
//! through [`RealtimeServer::broadcast_to_room`] and
//! [`RealtimeServer::broadcast_to_user`]; it never reaches for a global.

use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use warp::ws::Message;

use crate::auth::authenticator::ConnectionAuthenticator;
use crate::auth::token::{Identity, TokenValidator};
use crate::config::ServerConfig;
use crate::constants::RATE_LIMIT_SWEEP_INTERVAL_SECS;
use crate::core::connection::ConnectionHandle;
use crate::core::events::{envelope, ClientEvent, ServerEvent};
use crate::core::rate_limiter::ConnectionRateLimiter;
use crate::core::registry::ConnectionRegistry;
use crate::core::room::RoomManager;
use crate::error::{Result, TripSyncError};
use crate::storage::traits::{TripAccess, UserStore};

pub struct RealtimeServer {
    config: ServerConfig,
    registry: ConnectionRegistry,
    rooms: RoomManager,
    rate_limiter: Arc<ConnectionRateLimiter>,
    authenticator: ConnectionAuthenticator,
    access: Arc<dyn TripAccess>,
}

impl RealtimeServer {
    pub fn new(
        config: ServerConfig,
        validator: Arc<dyn TokenValidator>,
        users: Arc<dyn UserStore>,
        access: Arc<dyn TripAccess>,
    ) -> Self {
        let rate_limiter = Arc::new(ConnectionRateLimiter::new(
            config.rate_limit_max_attempts,
            config.rate_limit_window,
        ));
        Self {
            registry: ConnectionRegistry::new(config.max_connections_per_user),
            rooms: RoomManager::new(),
            rate_limiter,
            authenticator: ConnectionAuthenticator::new(validator, users),
            access,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start background maintenance (rate-limit window sweeping)
    pub fn start_maintenance_tasks(&self) {
        self.rate_limiter.clone().start_sweep_task(
            std::time::Duration::from_secs(RATE_LIMIT_SWEEP_INTERVAL_SECS),
        );
    }

    // --- Admission pipeline -------------------------------------------------

    /// Cheapest, most attacker-facing check first: per-address window
    pub async fn allow_attempt(&self, addr: IpAddr) -> bool {
        self.rate_limiter.allow(addr).await
    }

    /// Turn the upgrade request's token into a verified identity
    pub async fn authenticate(&self, raw_token: Option<&str>) -> Result<Identity> {
        self.authenticator.authenticate(raw_token).await
    }

    /// Admit an authenticated identity into the registry
    pub async fn admit(
        &self,
        identity: Identity,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<ConnectionHandle> {
        let conn = self.registry.admit(identity, sender).await?;
        info!(
            "Connection {} admitted for user {} ({} total)",
            conn.id,
            conn.user_id,
            self.registry.connection_count().await
        );
        Ok(conn)
    }

    /// Tear down a connection: registry entry, every room membership,
    /// and a presence notification per vacated room. Idempotent.
    pub async fn release(&self, connection_id: &str) {
        let handle = match self.registry.release(connection_id).await {
            Some(handle) => handle,
            None => return,
        };

        let vacated = self.rooms.remove_connection(connection_id).await;
        for room_id in &vacated {
            let event = ServerEvent::user_offline(room_id, &handle.user_id);
            self.broadcast_event(room_id, &event, None).await;
        }
        info!(
            "Connection {} released for user {} ({} rooms vacated)",
            connection_id,
            handle.user_id,
            vacated.len()
        );
    }

    // --- Event dispatch -----------------------------------------------------

    /// Handle one decoded inbound event from a connection.
    ///
    /// Post-admission failures never terminate the connection; they are
    /// reported back to the sender as a scoped `error` event.
    pub async fn dispatch(&self, conn: &ConnectionHandle, event: ClientEvent) {
        match &event {
            ClientEvent::JoinRoom { room_id } => {
                if let Err(e) = self.join_room(conn, room_id).await {
                    debug!(
                        "Join of {} by {} rejected: {}",
                        room_id, conn.user_id, e
                    );
                    conn.send_event(&ServerEvent::error(event.name(), &e));
                }
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.leave_room(conn, room_id).await;
            }
            ClientEvent::TypingStart { room_id } => {
                self.typing(conn, room_id, true).await;
            }
            ClientEvent::TypingStop { room_id } => {
                self.typing(conn, room_id, false).await;
            }
        }
    }

    /// Join a trip's room after the access check.
    ///
    /// On success the joiner's presence is announced to all prior
    /// members; with two simultaneous joins each new member notifies
    /// whoever was already in the set (last writer broadcasts to all
    /// prior members).
    pub async fn join_room(&self, conn: &ConnectionHandle, room_id: &str) -> Result<()> {
        let allowed = self
            .access
            .can_access_trip(&conn.user_id, room_id)
            .await
            .unwrap_or_else(|e| {
                // Fail closed on collaborator errors
                warn!("Trip access check failed for {}: {}", conn.user_id, e);
                false
            });
        if !allowed {
            return Err(TripSyncError::Forbidden);
        }

        if self.rooms.join(room_id, &conn.id).await {
            let event = ServerEvent::user_online(room_id, &conn.user_id, &conn.email);
            self.broadcast_event(room_id, &event, Some(&conn.id)).await;
        }
        Ok(())
    }

    /// Leave a trip's room; no-op when not a member
    pub async fn leave_room(&self, conn: &ConnectionHandle, room_id: &str) {
        if self.rooms.leave(room_id, &conn.id).await {
            let event = ServerEvent::user_offline(room_id, &conn.user_id);
            self.broadcast_event(room_id, &event, Some(&conn.id)).await;
        }
    }

    /// Relay a typing indicator; dropped silently unless the sender is
    /// a member of the room
    pub async fn typing(&self, conn: &ConnectionHandle, room_id: &str, started: bool) {
        if !self.rooms.is_member(room_id, &conn.id).await {
            debug!(
                "Dropping typing event from non-member {} for room {}",
                conn.user_id, room_id
            );
            return;
        }
        let event = ServerEvent::typing(room_id, &conn.user_id, started);
        self.broadcast_event(room_id, &event, Some(&conn.id)).await;
    }

    // --- Fan-out ------------------------------------------------------------

    /// Deliver an event to every member of a room except `exclude`.
    ///
    /// The member list is snapshotted under the room lock and delivery
    /// happens outside it; one stale recipient is logged and skipped,
    /// never allowed to stall the rest of the room.
    pub async fn broadcast_event(
        &self,
        room_id: &str,
        event: &ServerEvent,
        exclude: Option<&str>,
    ) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize broadcast for room {}: {}", room_id, e);
                return 0;
            }
        };
        self.broadcast_text(room_id, &text, exclude).await
    }

    async fn broadcast_text(&self, room_id: &str, text: &str, exclude: Option<&str>) -> usize {
        let members = self.rooms.members(room_id).await;
        let handles = self.registry.handles(&members).await;

        let mut delivered = 0;
        for handle in handles {
            if exclude.map(|id| id == handle.id).unwrap_or(false) {
                continue;
            }
            if handle.send_text(text) {
                delivered += 1;
            } else {
                warn!(
                    "Dropping delivery to stale connection {} in room {}",
                    handle.id, room_id
                );
            }
        }
        delivered
    }

    /// Push an application-defined event to every member of a room.
    /// Fire-and-forget entry point for the REST layer.
    pub async fn broadcast_to_room(&self, room_id: &str, event_type: &str, payload: Value) {
        let text = envelope(event_type, payload);
        let delivered = self.broadcast_text(room_id, &text, None).await;
        debug!(
            "Broadcast {} to room {} reached {} connections",
            event_type, room_id, delivered
        );
    }

    /// Push an application-defined event to every live connection owned
    /// by one user, across all tabs and devices
    pub async fn broadcast_to_user(&self, user_id: &str, event_type: &str, payload: Value) {
        let text = envelope(event_type, payload);
        let mut delivered = 0;
        for handle in self.registry.connections_for_user(user_id).await {
            if handle.send_text(&text) {
                delivered += 1;
            } else {
                warn!(
                    "Dropping delivery to stale connection {} of user {}",
                    handle.id, user_id
                );
            }
        }
        debug!(
            "Broadcast {} to user {} reached {} connections",
            event_type, user_id, delivered
        );
    }

    // --- Introspection ------------------------------------------------------

    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    pub async fn user_connection_count(&self, user_id: &str) -> usize {
        self.registry.user_connection_count(user_id).await
    }

    pub async fn room_members(&self, room_id: &str) -> Vec<String> {
        self.rooms.members(room_id).await
    }

    pub async fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.rooms.rooms_of(connection_id).await
    }
}

// Shared reference to the realtime server
pub type SharedRealtimeServer = Arc<RealtimeServer>;
