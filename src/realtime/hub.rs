//! Realtime Connection Hub
//!
//! Manages all WebSocket connections, subscriptions, and message fan-out.
//! Every published event also goes to a tokio broadcast channel so
//! in-process listeners can observe session traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use super::messages::{ServerMessage, WsEvent, FEED_TOPIC, SYSTEM_TOPIC};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Manages all WebSocket connections and subscriptions
pub struct ConnectionHub {
    inner: Arc<HubInner>,
    /// Broadcast channel for events (in-process listeners)
    broadcast_tx: broadcast::Sender<WsEvent>,
    config: HubConfig,
}

struct HubInner {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Topic subscriptions: Topic → Set of ConnectionIds
    subscriptions: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of the broadcast channel
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            broadcast_capacity: 1024,
        }
    }
}

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    /// Authenticated owner of the socket
    pub user_id: String,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    pub subscriptions: HashSet<String>,
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity);

        Self {
            inner: Arc::new(HubInner {
                connections: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
            }),
            broadcast_tx,
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub async fn register(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.inner.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(
            id.clone(),
            ConnectionHandle {
                user_id: user_id.to_string(),
                sender,
                subscriptions: HashSet::new(),
            },
        );

        tracing::info!(connection_id = %id, user_id = %user_id, "WebSocket connected");
        Ok(id)
    }

    /// Unregister a connection and clean up its subscriptions
    pub async fn unregister(&self, id: &str) {
        let handle = self.inner.connections.write().await.remove(id);

        if let Some(handle) = handle {
            let mut subs = self.inner.subscriptions.write().await;
            for topic in handle.subscriptions {
                if let Some(subscribers) = subs.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subs.remove(&topic);
                    }
                }
            }
        }

        tracing::info!(connection_id = %id, "WebSocket disconnected");
    }

    /// Subscribe a connection to topics
    ///
    /// Unknown topics and other users' private topics are skipped; the
    /// accepted subset is returned.
    pub async fn subscribe(&self, id: &str, topics: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut connections = self.inner.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.inner.subscriptions.write().await;
        let mut subscribed = Vec::new();

        for topic in topics {
            if !is_valid_topic(&topic) || !may_subscribe(&handle.user_id, &topic) {
                tracing::warn!(connection_id = %id, topic = %topic, "Topic rejected");
                continue;
            }

            handle.subscriptions.insert(topic.clone());
            subs.entry(topic.clone())
                .or_default()
                .insert(id.to_string());
            subscribed.push(topic);
        }

        tracing::debug!(connection_id = %id, topics = ?subscribed, "Subscribed to topics");
        Ok(subscribed)
    }

    /// Unsubscribe a connection from topics
    pub async fn unsubscribe(
        &self,
        id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut connections = self.inner.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.inner.subscriptions.write().await;
        let mut unsubscribed = Vec::new();

        for topic in topics {
            if handle.subscriptions.remove(&topic) {
                if let Some(subscribers) = subs.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subs.remove(&topic);
                    }
                }
                unsubscribed.push(topic);
            }
        }

        tracing::debug!(connection_id = %id, topics = ?unsubscribed, "Unsubscribed from topics");
        Ok(unsubscribed)
    }

    /// Deliver an event to all subscribers of its topic (and `prefix.*`)
    ///
    /// Returns the number of connections the message was handed to.
    pub async fn broadcast(&self, event: &WsEvent) -> usize {
        self.inner.broadcast(event).await
    }

    /// Publish an event without waiting for delivery
    ///
    /// Safe to call from synchronous repository code: outside a tokio
    /// runtime only the broadcast channel sees the event.
    pub fn publish(&self, event: WsEvent) {
        let _ = self.broadcast_tx.send(event.clone());

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move {
                inner.broadcast(&event).await;
            });
        }
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.inner.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(message)
            .map_err(|_| HubError::SendFailed)
    }

    /// Get a receiver for the broadcast channel (in-process listeners)
    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<WsEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl HubInner {
    async fn broadcast(&self, event: &WsEvent) -> usize {
        let subs = self.subscriptions.read().await;
        let connections = self.connections.read().await;

        let subscriber_ids = subs.get(&event.topic).cloned().unwrap_or_default();

        // "angry_lips.*" matches "angry_lips.<id>"
        let wildcard_ids = event
            .topic
            .split_once('.')
            .map(|(prefix, _)| format!("{}.*", prefix))
            .and_then(|t| subs.get(&t).cloned())
            .unwrap_or_default();

        let mut sent_count = 0;
        for id in subscriber_ids.union(&wildcard_ids) {
            if let Some(handle) = connections.get(id) {
                if handle.sender.send(event.message.clone()).is_ok() {
                    sent_count += 1;
                }
            }
        }

        if sent_count > 0 {
            tracing::trace!(topic = %event.topic, subscribers = sent_count, "Broadcast event");
        }
        sent_count
    }
}

/// Check if a topic is valid
///
/// - `angry_lips.<session_id>` / `angry_lips.*`
/// - `user.<user_id>`
/// - `feed.public`
/// - `system`
fn is_valid_topic(topic: &str) -> bool {
    match topic.split_once('.') {
        Some(("angry_lips", rest)) => !rest.is_empty(),
        Some(("user", rest)) => !rest.is_empty() && rest != "*",
        _ => topic == FEED_TOPIC || topic == SYSTEM_TOPIC,
    }
}

/// Private user topics are readable by their owner only
fn may_subscribe(user_id: &str, topic: &str) -> bool {
    match topic.strip_prefix("user.") {
        Some(owner) => owner == user_id,
        None => true,
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.broadcast_capacity, 1024);
    }

    #[test]
    fn test_valid_topics() {
        assert!(is_valid_topic("angry_lips.abc"));
        assert!(is_valid_topic("angry_lips.*"));
        assert!(is_valid_topic("user.u1"));
        assert!(is_valid_topic("feed.public"));
        assert!(is_valid_topic("system"));

        assert!(!is_valid_topic("user.*"));
        assert!(!is_valid_topic("angry_lips."));
        assert!(!is_valid_topic("metrics.mood"));
        assert!(!is_valid_topic(""));
    }

    #[test]
    fn test_private_topics() {
        assert!(may_subscribe("u1", "user.u1"));
        assert!(!may_subscribe("u1", "user.u2"));
        assert!(may_subscribe("u1", "angry_lips.s1"));
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register("u1", tx).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_filters_foreign_user_topic() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register("u1", tx).await.unwrap();

        let subscribed = hub
            .subscribe(
                &id,
                vec![
                    "user.u1".to_string(),
                    "user.u2".to_string(),
                    "angry_lips.s1".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(subscribed, vec!["user.u1", "angry_lips.s1"]);
        assert_eq!(hub.subscription_count("user.u2").await, 0);

        let unsubscribed = hub
            .unsubscribe(&id, vec!["angry_lips.s1".to_string()])
            .await
            .unwrap();
        assert_eq!(unsubscribed, vec!["angry_lips.s1"]);
        assert_eq!(hub.subscription_count("angry_lips.s1").await, 0);

        hub.unregister(&id).await;
        assert_eq!(hub.subscription_count("user.u1").await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 2,
            broadcast_capacity: 16,
        });

        let (tx1, _) = mpsc::unbounded_channel();
        let (tx2, _) = mpsc::unbounded_channel();
        let (tx3, _) = mpsc::unbounded_channel();

        hub.register("a", tx1).await.unwrap();
        hub.register("b", tx2).await.unwrap();
        let result = hub.register("c", tx3).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_broadcast_to_subscribers() {
        let hub = ConnectionHub::new(HubConfig::default());

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let id1 = hub.register("a", tx1).await.unwrap();
        let _id2 = hub.register("b", tx2).await.unwrap();

        hub.subscribe(&id1, vec!["angry_lips.s1".to_string()])
            .await
            .unwrap();

        let event = WsEvent::session_event("s1", "session_started", json!({}));
        assert_eq!(hub.broadcast(&event).await, 1);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wildcard_subscription() {
        let hub = ConnectionHub::new(HubConfig::default());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register("a", tx).await.unwrap();
        hub.subscribe(&id, vec!["angry_lips.*".to_string()])
            .await
            .unwrap();

        let event = WsEvent::turn_event("s9", "t1", "submitted", json!({}));
        hub.broadcast(&event).await;

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_runtime_reaches_broadcast_channel() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut rx = hub.subscribe_broadcast();

        hub.publish(WsEvent::system("maintenance"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.topic, "system");
    }
}
