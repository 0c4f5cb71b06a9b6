//! Trip-scoped room membership
//!
//! A room is the set of connections currently viewing one trip. Both
//! directions of the membership relation live under a single lock so the
//! bidirectional invariant (connection in room set iff room in the
//! connection's joined set) can never be observed broken.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct RoomState {
    /// trip_id -> member connection ids
    rooms: HashMap<String, HashSet<String>>,
    /// connection id -> trip ids joined
    conn_rooms: HashMap<String, HashSet<String>>,
}

/// Manages all active rooms in the server
#[derive(Default)]
pub struct RoomManager {
    state: RwLock<RoomState>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    /// Returns false if the connection was already a member.
    pub async fn join(&self, room_id: &str, connection_id: &str) -> bool {
        let mut state = self.state.write().await;

        let newly_joined = state
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(connection_id.to_string());
        if newly_joined {
            state
                .conn_rooms
                .entry(connection_id.to_string())
                .or_insert_with(HashSet::new)
                .insert(room_id.to_string());
        }
        newly_joined
    }

    /// Remove a connection from a room. Returns false if it was not a
    /// member. Empty rooms are dropped so churn cannot leak memory.
    pub async fn leave(&self, room_id: &str, connection_id: &str) -> bool {
        let mut state = self.state.write().await;

        let was_member = state
            .rooms
            .get_mut(room_id)
            .map(|members| members.remove(connection_id))
            .unwrap_or(false);
        if !was_member {
            return false;
        }
        if state.rooms.get(room_id).map(|m| m.is_empty()).unwrap_or(false) {
            state.rooms.remove(room_id);
        }

        if let Some(joined) = state.conn_rooms.get_mut(connection_id) {
            joined.remove(room_id);
            if joined.is_empty() {
                state.conn_rooms.remove(connection_id);
            }
        }
        true
    }

    /// Remove a connection from every room it had joined (disconnect
    /// path). Returns the rooms it was removed from.
    pub async fn remove_connection(&self, connection_id: &str) -> Vec<String> {
        let mut state = self.state.write().await;

        let joined = match state.conn_rooms.remove(connection_id) {
            Some(joined) => joined,
            None => return Vec::new(),
        };

        for room_id in &joined {
            if let Some(members) = state.rooms.get_mut(room_id) {
                members.remove(connection_id);
                if members.is_empty() {
                    state.rooms.remove(room_id);
                }
            }
        }
        joined.into_iter().collect()
    }

    /// Snapshot of a room's member connection ids
    pub async fn members(&self, room_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, room_id: &str, connection_id: &str) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.contains(connection_id))
            .unwrap_or(false)
    }

    /// Rooms a connection has joined
    pub async fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .conn_rooms
            .get(connection_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of non-empty rooms
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Both directions of the relation must agree at all times
    async fn assert_consistent(rooms: &RoomManager) {
        let state = rooms.state.read().await;
        for (room_id, members) in &state.rooms {
            for conn_id in members {
                assert!(
                    state.conn_rooms.get(conn_id).map_or(false, |j| j.contains(room_id)),
                    "connection {} in room {} but room missing from its joined set",
                    conn_id,
                    room_id
                );
            }
        }
        for (conn_id, joined) in &state.conn_rooms {
            for room_id in joined {
                assert!(
                    state.rooms.get(room_id).map_or(false, |m| m.contains(conn_id)),
                    "connection {} claims room {} but is not in its member set",
                    conn_id,
                    room_id
                );
            }
        }
    }

    #[tokio::test]
    async fn test_join_and_leave_stay_consistent() {
        let rooms = RoomManager::new();

        assert!(rooms.join("trip-1", "c1").await);
        assert!(rooms.join("trip-1", "c2").await);
        assert!(rooms.join("trip-2", "c1").await);
        assert_consistent(&rooms).await;

        assert!(rooms.leave("trip-1", "c1").await);
        assert_consistent(&rooms).await;

        assert_eq!(rooms.members("trip-1").await, vec!["c2".to_string()]);
        assert_eq!(rooms.rooms_of("c1").await, vec!["trip-2".to_string()]);
    }

    #[tokio::test]
    async fn test_rejoin_is_reported() {
        let rooms = RoomManager::new();
        assert!(rooms.join("trip-1", "c1").await);
        assert!(!rooms.join("trip-1", "c1").await);
        assert_eq!(rooms.members("trip-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_nonmember_is_noop() {
        let rooms = RoomManager::new();
        rooms.join("trip-1", "c1").await;

        assert!(!rooms.leave("trip-1", "c2").await);
        assert!(!rooms.leave("trip-9", "c1").await);
        assert_eq!(rooms.members("trip-1").await.len(), 1);
        assert_consistent(&rooms).await;
    }

    #[tokio::test]
    async fn test_empty_rooms_are_dropped() {
        let rooms = RoomManager::new();
        rooms.join("trip-1", "c1").await;
        assert_eq!(rooms.room_count().await, 1);

        rooms.leave("trip-1", "c1").await;
        assert_eq!(rooms.room_count().await, 0);
        assert!(rooms.rooms_of("c1").await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_connection_clears_all_rooms() {
        let rooms = RoomManager::new();
        rooms.join("trip-1", "c1").await;
        rooms.join("trip-2", "c1").await;
        rooms.join("trip-1", "c2").await;

        let mut removed = rooms.remove_connection("c1").await;
        removed.sort();
        assert_eq!(removed, vec!["trip-1".to_string(), "trip-2".to_string()]);
        assert!(rooms.remove_connection("c1").await.is_empty());

        assert_eq!(rooms.members("trip-1").await, vec!["c2".to_string()]);
        assert_eq!(rooms.room_count().await, 1);
        assert_consistent(&rooms).await;
    }

    #[tokio::test]
    async fn test_concurrent_churn_stays_consistent() {
        let rooms = Arc::new(RoomManager::new());

        let mut handles = vec![];
        for i in 0..10 {
            let rooms = rooms.clone();
            handles.push(tokio::spawn(async move {
                let conn = format!("c{}", i);
                for round in 0..20 {
                    let room = format!("trip-{}", round % 3);
                    rooms.join(&room, &conn).await;
                    tokio::task::yield_now().await;
                    if round % 2 == 0 {
                        rooms.leave(&room, &conn).await;
                    }
                }
                rooms.remove_connection(&conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_consistent(&rooms).await;
        assert_eq!(rooms.room_count().await, 0);
    }
}
