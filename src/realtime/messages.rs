//! Realtime Message Types
//!
//! Defines all message types exchanged over `/ws` between browser clients
//! and the FieldForge server, plus the topic naming scheme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic carrying new feed posts
pub const FEED_TOPIC: &str = "feed.public";

/// Topic carrying server-wide notices
pub const SYSTEM_TOPIC: &str = "system";

/// Topic for one Angry Lips session
pub fn session_topic(session_id: &str) -> String {
    format!("angry_lips.{}", session_id)
}

/// Private topic for one user's notifications
pub fn user_topic(user_id: &str) -> String {
    format!("user.{}", user_id)
}

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for real-time updates
    Subscribe {
        /// List of topics (e.g., "angry_lips.<id>", "user.<id>", "feed.public")
        topics: Vec<String>,
    },
    /// Unsubscribe from topics
    Unsubscribe { topics: Vec<String> },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Angry Lips session lifecycle event (session_created, turn_advanced, ...)
    SessionEvent {
        session_id: String,
        event: String,
        payload: Value,
        at: DateTime<Utc>,
    },
    /// Event logged against a single turn
    TurnEvent {
        session_id: String,
        turn_id: String,
        event_type: String,
        payload: Value,
        at: DateTime<Utc>,
    },
    /// Personal notification (turn reminders, invitations)
    Notification {
        kind: String,
        title: String,
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// A post appeared in the public feed
    FeedActivity {
        post_id: String,
        event_type: String,
        author_id: String,
    },
    /// Server-wide notice
    System { message: String },
    /// Subscription confirmed
    Subscribed { topics: Vec<String> },
    /// Unsubscription confirmed
    Unsubscribed { topics: Vec<String> },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
    /// Connection established
    Connected {
        connection_id: String,
        user_id: String,
    },
}

/// Internal event for broadcasting through the hub
#[derive(Debug, Clone)]
pub struct WsEvent {
    /// Topic this event belongs to (e.g., "angry_lips.<id>")
    pub topic: String,
    /// The message to send to subscribers
    pub message: ServerMessage,
}

impl WsEvent {
    pub fn session_event(session_id: &str, event: &str, payload: Value) -> Self {
        Self {
            topic: session_topic(session_id),
            message: ServerMessage::SessionEvent {
                session_id: session_id.to_string(),
                event: event.to_string(),
                payload,
                at: Utc::now(),
            },
        }
    }

    pub fn turn_event(session_id: &str, turn_id: &str, event_type: &str, payload: Value) -> Self {
        Self {
            topic: session_topic(session_id),
            message: ServerMessage::TurnEvent {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                event_type: event_type.to_string(),
                payload,
                at: Utc::now(),
            },
        }
    }

    pub fn notification(
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        url: Option<String>,
    ) -> Self {
        Self {
            topic: user_topic(user_id),
            message: ServerMessage::Notification {
                kind: kind.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                url,
            },
        }
    }

    pub fn feed_activity(post_id: &str, event_type: &str, author_id: &str) -> Self {
        Self {
            topic: FEED_TOPIC.to_string(),
            message: ServerMessage::FeedActivity {
                post_id: post_id.to_string(),
                event_type: event_type.to_string(),
                author_id: author_id.to_string(),
            },
        }
    }

    pub fn system(message: &str) -> Self {
        Self {
            topic: SYSTEM_TOPIC.to_string(),
            message: ServerMessage::System {
                message: message.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_deserialize_subscribe() {
        let json = r#"{"type": "subscribe", "topics": ["angry_lips.abc", "feed.public"]}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { topics } => {
                assert_eq!(topics.len(), 2);
                assert_eq!(topics[0], "angry_lips.abc");
            }
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_client_message_deserialize_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_server_message_serialize_session_event() {
        let event = WsEvent::session_event("s1", "turn_advanced", json!({"turnId": "t2"}));
        assert_eq!(event.topic, "angry_lips.s1");

        let text = serde_json::to_string(&event.message).unwrap();
        assert!(text.contains("\"type\":\"session_event\""));
        assert!(text.contains("\"event\":\"turn_advanced\""));
        assert!(text.contains("\"turnId\":\"t2\""));
    }

    #[test]
    fn test_notification_skips_missing_url() {
        let event = WsEvent::notification("u1", "turn_warning", "Hurry", "One minute left", None);
        assert_eq!(event.topic, "user.u1");

        let text = serde_json::to_string(&event.message).unwrap();
        assert!(text.contains("\"type\":\"notification\""));
        assert!(!text.contains("\"url\""));
    }

    #[test]
    fn test_server_message_serialize_connected() {
        let msg = ServerMessage::Connected {
            connection_id: "abc-123".to_string(),
            user_id: "u1".to_string(),
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"type\":\"connected\""));
        assert!(text.contains("\"connection_id\":\"abc-123\""));
    }
}
