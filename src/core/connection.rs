//! Live connection handle
//! One handle per authenticated client channel

use log::warn;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message;

use crate::core::events::ServerEvent;

/// Handle to a single live connection.
///
/// `user_id` and `email` come from the verified identity at admission
/// time and are never updated from client-supplied data afterwards.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
}

impl ConnectionHandle {
    pub fn new(user_id: String, email: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            email,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Send a raw text frame through this connection
    pub fn send_text(&self, text: &str) -> bool {
        match self.sender.send(Message::text(text)) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to deliver frame to connection {}", self.id);
                false
            }
        }
    }

    /// Serialize and send a server event through this connection
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.send_text(&text),
            Err(e) => {
                warn!("Failed to serialize event for connection {}: {}", self.id, e);
                false
            }
        }
    }
}
