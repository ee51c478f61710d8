//! Realtime Event Fan-out
//!
//! Pushes Angry Lips session events, personal notifications and feed
//! activity to browser clients over WebSocket.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Manages all active connections and subscriptions
//! - **Handler**: Authenticates the upgrade and processes client frames
//! - **Messages**: Client/server message formats and topic names
//!
//! ## Usage
//!
//! Clients fetch a token from `GET /api/angry-lips/realtime/token`, connect
//! to `/ws?token=<token>` and subscribe:
//! - `angry_lips.{session_id}` - Session and turn events
//! - `user.{user_id}` - Own notifications only
//! - `feed.public` - New feed posts
//! - `system` - System events
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8090/ws?token=${token}`);
//! ws.onopen = () => ws.send(JSON.stringify({type: 'subscribe', topics: [`angry_lips.${id}`]}));
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, HubConfig, HubError};
pub use messages::{
    session_topic, user_topic, ClientMessage, ServerMessage, WsEvent, FEED_TOPIC, SYSTEM_TOPIC,
};
