use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{FeedActor, FeedCard, FeedComment, FeedQuery, FeedSort, LikeState, NewPost, RepostState};
use crate::realtime::{ConnectionHub, WsEvent};
use crate::store::{clamp_limit, Store, StoreError, StoreResult};

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Feed posts and reactions
#[derive(Clone)]
pub struct FeedRepository {
    store: Arc<Store>,
    hub: Arc<ConnectionHub>,
}

/// Insert a post on an open connection or transaction
///
/// Returns `None` when a post with the same event type and reference
/// already exists.
pub(crate) fn insert_post_in(conn: &Connection, post: &NewPost) -> StoreResult<Option<String>> {
    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO feed_posts (id, author_id, event_type, title, body, metadata, reference_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            post.author_id,
            post.event_type.as_str(),
            post.title,
            post.body,
            post.metadata,
            post.reference_id,
            Utc::now(),
        ],
    )?;
    Ok((inserted > 0).then_some(id))
}

fn map_actor(row: &Row<'_>, user_col: usize) -> rusqlite::Result<FeedActor> {
    Ok(FeedActor {
        user_id: row.get(user_col)?,
        username: row.get(user_col + 1)?,
        display_name: row.get(user_col + 2)?,
        avatar_url: row.get(user_col + 3)?,
    })
}

const CARD_SELECT: &str = "
    SELECT p.id, p.event_type, p.created_at, p.title, p.body, p.metadata,
           p.author_id, pr.username, pr.display_name, pr.avatar_url,
           (SELECT COUNT(*) FROM feed_likes l WHERE l.post_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM feed_comments c WHERE c.post_id = p.id) AS comment_count,
           (SELECT COUNT(*) FROM feed_reposts r WHERE r.post_id = p.id) AS repost_count,
           EXISTS (SELECT 1 FROM feed_likes l WHERE l.post_id = p.id AND l.user_id = ?1) AS liked,
           EXISTS (SELECT 1 FROM feed_reposts r WHERE r.post_id = p.id AND r.user_id = ?1) AS reposted,
           p.rowid AS seq
    FROM feed_posts p
    LEFT JOIN profiles pr ON pr.id = p.author_id";

fn map_card(row: &Row<'_>) -> rusqlite::Result<FeedCard> {
    Ok(FeedCard {
        id: row.get(0)?,
        event_type: row.get(1)?,
        created_at: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        metadata: row.get(5)?,
        actor: map_actor(row, 6)?,
        like_count: row.get(10)?,
        comment_count: row.get(11)?,
        repost_count: row.get(12)?,
        liked_by_current_user: row.get(13)?,
        reposted_by_current_user: row.get(14)?,
    })
}

fn ensure_post(conn: &Connection, post_id: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM feed_posts WHERE id = ?1)",
        params![post_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::not_found("Post not found"))
    }
}

impl FeedRepository {
    pub fn new(store: Arc<Store>, hub: Arc<ConnectionHub>) -> Self {
        Self { store, hub }
    }

    /// Tell `feed.public` subscribers about a new post
    pub fn announce(&self, post_id: &str, post: &NewPost) {
        self.hub
            .publish(WsEvent::feed_activity(post_id, post.event_type.as_str(), &post.author_id));
    }

    pub fn list_feed(&self, query: &FeedQuery) -> StoreResult<Vec<FeedCard>> {
        let limit = clamp_limit(query.limit, DEFAULT_PAGE_SIZE, 1, 100);
        let offset = query.offset.unwrap_or(0).max(0);
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let event_types = serde_json::to_string(&query.event_types)?;
        let sort = match query.sort {
            FeedSort::Latest => "latest",
            FeedSort::Popular => "popular",
        };

        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT * FROM ({CARD_SELECT}
                    WHERE (?2 IS NULL
                           OR p.body LIKE '%' || ?2 || '%'
                           OR COALESCE(p.title, '') LIKE '%' || ?2 || '%'
                           OR COALESCE(pr.username, '') LIKE '%' || ?2 || '%'
                           OR COALESCE(pr.display_name, '') LIKE '%' || ?2 || '%')
                      AND (?3 = '[]' OR p.event_type IN (SELECT value FROM json_each(?3)))
                 ) AS cards
                 ORDER BY
                   CASE WHEN ?4 = 'popular' THEN like_count * 3 + comment_count * 2 + repost_count END DESC,
                   created_at DESC, seq DESC
                 LIMIT ?5 OFFSET ?6"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![query.viewer_id, search, event_types, sort, limit, offset],
                map_card,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn get_card(&self, post_id: &str, viewer_id: Option<&str>) -> StoreResult<FeedCard> {
        self.store.with_conn(|conn| {
            let sql = format!("{CARD_SELECT} WHERE p.id = ?2");
            conn.query_row(&sql, params![viewer_id, post_id], map_card)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("Post not found"),
                    other => other.into(),
                })
        })
    }

    /// Create a user post and announce it on `feed.public`
    pub fn create_post(
        &self,
        author_id: &str,
        body: &str,
        title: Option<&str>,
        metadata: Option<Value>,
    ) -> StoreResult<FeedCard> {
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::invalid("Post body is required"));
        }

        let mut post = NewPost::user_post(author_id, body);
        post.title = title.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        if let Some(metadata) = metadata {
            post.metadata = metadata;
        }

        let id = self
            .store
            .with_conn(|conn| insert_post_in(conn, &post))?
            .ok_or_else(|| StoreError::conflict("Post already exists"))?;

        tracing::debug!(post_id = %id, author_id = %author_id, "Feed post created");
        self.announce(&id, &post);
        self.get_card(&id, Some(author_id))
    }

    /// Like or unlike; repeating the same call changes nothing
    pub fn set_like(&self, post_id: &str, user_id: &str, liked: bool) -> StoreResult<LikeState> {
        self.store.with_tx(|tx| {
            ensure_post(tx, post_id)?;
            if liked {
                tx.execute(
                    "INSERT OR IGNORE INTO feed_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![post_id, user_id, Utc::now()],
                )?;
            } else {
                tx.execute(
                    "DELETE FROM feed_likes WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id, user_id],
                )?;
            }
            let like_count = tx.query_row(
                "SELECT COUNT(*) FROM feed_likes WHERE post_id = ?1",
                params![post_id],
                |row| row.get(0),
            )?;
            Ok(LikeState { liked, like_count })
        })
    }

    pub fn set_repost(&self, post_id: &str, user_id: &str, reposted: bool) -> StoreResult<RepostState> {
        self.store.with_tx(|tx| {
            ensure_post(tx, post_id)?;
            if reposted {
                tx.execute(
                    "INSERT OR IGNORE INTO feed_reposts (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![post_id, user_id, Utc::now()],
                )?;
            } else {
                tx.execute(
                    "DELETE FROM feed_reposts WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id, user_id],
                )?;
            }
            let repost_count = tx.query_row(
                "SELECT COUNT(*) FROM feed_reposts WHERE post_id = ?1",
                params![post_id],
                |row| row.get(0),
            )?;
            Ok(RepostState { reposted, repost_count })
        })
    }

    /// Newest first
    pub fn list_comments(
        &self,
        post_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<FeedComment>> {
        let limit = clamp_limit(limit, DEFAULT_PAGE_SIZE, 1, 100);
        let offset = offset.unwrap_or(0).max(0);

        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT c.id, c.post_id, c.body, c.created_at,
                        c.author_id, pr.username, pr.display_name, pr.avatar_url
                 FROM feed_comments c
                 LEFT JOIN profiles pr ON pr.id = c.author_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![post_id, limit, offset], |row| {
                let actor = map_actor(row, 4)?;
                Ok(FeedComment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    user_id: actor.user_id.clone(),
                    body: row.get(2)?,
                    created_at: row.get(3)?,
                    actor,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn create_comment(&self, post_id: &str, user_id: &str, body: &str) -> StoreResult<FeedComment> {
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::invalid("Comment body is required"));
        }

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        self.store.with_tx(|tx| {
            ensure_post(tx, post_id)?;
            tx.execute(
                "INSERT INTO feed_comments (id, post_id, author_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, post_id, user_id, body, created_at],
            )?;

            let actor = tx.query_row(
                "SELECT ?1, username, display_name, avatar_url FROM profiles WHERE id = ?1",
                params![user_id],
                |row| map_actor(row, 0),
            );
            let actor = match actor {
                Ok(actor) => actor,
                Err(rusqlite::Error::QueryReturnedNoRows) => FeedActor {
                    user_id: user_id.to_string(),
                    username: None,
                    display_name: None,
                    avatar_url: None,
                },
                Err(e) => return Err(e.into()),
            };

            Ok(FeedComment {
                id: id.clone(),
                post_id: post_id.to_string(),
                user_id: user_id.to_string(),
                body: body.to_string(),
                created_at,
                actor,
            })
        })
    }
}
