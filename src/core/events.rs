//! Wire protocol event types
//!
//! Both directions use the `{ "type": ..., "payload": ... }` envelope.
//! Application-defined broadcast types pushed by the REST layer are
//! forwarded verbatim through [`envelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TripSyncError;

/// Client-to-server event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    /// Join the room for one trip
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom { room_id: String },

    /// Leave the room for one trip
    #[serde(rename = "leave-room", rename_all = "camelCase")]
    LeaveRoom { room_id: String },

    /// Started typing in a trip's room
    #[serde(rename = "typing-start", rename_all = "camelCase")]
    TypingStart { room_id: String },

    /// Stopped typing in a trip's room
    #[serde(rename = "typing-stop", rename_all = "camelCase")]
    TypingStop { room_id: String },
}

impl ClientEvent {
    /// Wire name of the event, used as `relatedEvent` in error replies
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom { .. } => "leave-room",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
        }
    }
}

/// Server-to-client event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Another user entered the room
    #[serde(rename = "user-online", rename_all = "camelCase")]
    UserOnline {
        room_id: String,
        user_id: String,
        email: String,
        timestamp: DateTime<Utc>,
    },

    /// Another user left the room or disconnected
    #[serde(rename = "user-offline", rename_all = "camelCase")]
    UserOffline {
        room_id: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Another user started typing
    #[serde(rename = "typing-start", rename_all = "camelCase")]
    TypingStart { room_id: String, user_id: String },

    /// Another user stopped typing
    #[serde(rename = "typing-stop", rename_all = "camelCase")]
    TypingStop { room_id: String, user_id: String },

    /// A request from this client failed
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        related_event: String,
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn user_online(room_id: &str, user_id: &str, email: &str) -> Self {
        Self::UserOnline {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_offline(room_id: &str, user_id: &str) -> Self {
        Self::UserOffline {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn typing(room_id: &str, user_id: &str, started: bool) -> Self {
        if started {
            Self::TypingStart {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            }
        } else {
            Self::TypingStop {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            }
        }
    }

    pub fn error(related_event: &str, err: &TripSyncError) -> Self {
        Self::Error {
            related_event: related_event.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Build the wire envelope for an application-defined broadcast event
pub fn envelope(event_type: &str, payload: Value) -> String {
    serde_json::json!({ "type": event_type, "payload": payload }).to_string()
}
