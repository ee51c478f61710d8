//! Story Feed
//!
//! Posts written by users plus system posts for accepted BookWorm
//! connections and published Angry Lips stories. Cards carry like, comment
//! and repost counts along with the viewer's own like/repost state.

mod repository;

pub use repository::FeedRepository;
pub(crate) use repository::insert_post_in;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of feed posts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventType {
    Post,
    ConnectionAccepted,
    AngryLipsPublished,
}

impl FeedEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedEventType::Post => "post",
            FeedEventType::ConnectionAccepted => "connection_accepted",
            FeedEventType::AngryLipsPublished => "angry_lips_published",
        }
    }
}

/// Ordering of feed cards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    #[default]
    Latest,
    /// likes*3 + comments*2 + reposts, then recency
    Popular,
}

impl FeedSort {
    /// Unknown values fall back to latest
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("popular") => FeedSort::Popular,
            _ => FeedSort::Latest,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// Used for likedByCurrentUser / repostedByCurrentUser
    pub viewer_id: Option<String>,
    pub sort: FeedSort,
    pub search: Option<String>,
    pub event_types: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedActor {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCard {
    pub id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
    pub body: String,
    pub actor: FeedActor,
    pub metadata: Value,
    pub like_count: i64,
    pub comment_count: i64,
    pub repost_count: i64,
    pub liked_by_current_user: bool,
    pub reposted_by_current_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedComment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub actor: FeedActor,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepostState {
    pub reposted: bool,
    pub repost_count: i64,
}

/// A post to insert
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: String,
    pub event_type: FeedEventType,
    pub title: Option<String>,
    pub body: String,
    pub metadata: Value,
    /// System posts are written once per (event type, reference)
    pub reference_id: Option<String>,
}

impl NewPost {
    pub fn user_post(author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            event_type: FeedEventType::Post,
            title: None,
            body: body.into(),
            metadata: Value::Object(Default::default()),
            reference_id: None,
        }
    }
}
