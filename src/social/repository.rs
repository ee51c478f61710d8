use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{params, Connection, ErrorCode, Row};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    BasicProfile, Bookworm, ConnectionRequest, ConnectionStats, Profile, ProfileUpdate,
    RequestAction, RequestDirection, RequestStatus,
};
use crate::feed::{insert_post_in, FeedEventType, FeedRepository, NewPost};
use crate::store::{clamp_limit, OptionalRow, Store, StoreError, StoreResult};

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        RequestStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown request status {raw}").into()))
    }
}

/// Profiles, BookWorms and connection requests
#[derive(Clone)]
pub struct SocialRepository {
    store: Arc<Store>,
    feed: FeedRepository,
}

const PROFILE_COLUMNS: &str = "id, username, display_name, bio, avatar_url, email, phone,
     discord_handle, created_at, updated_at";

fn map_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        avatar_url: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        discord_handle: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_basic(row: &Row<'_>, start: usize) -> rusqlite::Result<BasicProfile> {
    Ok(BasicProfile {
        user_id: row.get(start)?,
        username: row.get(start + 1)?,
        display_name: row.get(start + 2)?,
        avatar_url: row.get(start + 3)?,
    })
}

const REQUEST_SELECT: &str = "
    SELECT cr.id, cr.status, cr.message, cr.created_at, cr.responded_at,
           cr.requester_id, rp.username, rp.display_name, rp.avatar_url,
           cr.target_id, tp.username, tp.display_name, tp.avatar_url
    FROM bookworm_requests cr
    LEFT JOIN profiles rp ON rp.id = cr.requester_id
    LEFT JOIN profiles tp ON tp.id = cr.target_id";

fn map_request(row: &Row<'_>) -> rusqlite::Result<ConnectionRequest> {
    let requester = map_basic(row, 5)?;
    let target = map_basic(row, 9)?;
    Ok(ConnectionRequest {
        id: row.get(0)?,
        status: row.get(1)?,
        message: row.get(2)?,
        created_at: row.get(3)?,
        responded_at: row.get(4)?,
        requester_id: requester.user_id.clone(),
        target_id: target.user_id.clone(),
        requester,
        target,
    })
}

fn load_request(conn: &Connection, id: &str) -> StoreResult<Option<ConnectionRequest>> {
    conn.query_row(
        &format!("{REQUEST_SELECT} WHERE cr.id = ?1"),
        params![id],
        map_request,
    )
    .optional_row()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Normalize a requested username: trimmed, without a leading `@`
fn clean_username(raw: &str) -> StoreResult<String> {
    let name = raw.trim().trim_start_matches('@');
    if name.len() < 3 || name.len() > 32 {
        return Err(StoreError::invalid("Username must be between 3 and 32 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(StoreError::invalid(
            "Username may only contain letters, numbers, '.', '_' and '-'",
        ));
    }
    Ok(name.to_string())
}

fn display_label(profile: &BasicProfile) -> String {
    profile
        .display_name
        .clone()
        .or_else(|| profile.username.clone())
        .unwrap_or_else(|| profile.user_id.clone())
}

impl SocialRepository {
    pub fn new(store: Arc<Store>, feed: FeedRepository) -> Self {
        Self { store, feed }
    }

    /// Create or update the caller's profile
    pub fn upsert_profile(&self, user_id: &str, update: &ProfileUpdate) -> StoreResult<Profile> {
        let username = update.username.as_deref().map(clean_username).transpose()?;
        let now = Utc::now();

        let result = self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, username, display_name, bio, avatar_url, email, phone,
                                       discord_handle, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT (id) DO UPDATE SET
                    username = COALESCE(excluded.username, profiles.username),
                    display_name = COALESCE(excluded.display_name, profiles.display_name),
                    bio = COALESCE(excluded.bio, profiles.bio),
                    avatar_url = COALESCE(excluded.avatar_url, profiles.avatar_url),
                    email = COALESCE(excluded.email, profiles.email),
                    phone = COALESCE(excluded.phone, profiles.phone),
                    discord_handle = COALESCE(excluded.discord_handle, profiles.discord_handle),
                    updated_at = excluded.updated_at",
                params![
                    user_id,
                    username,
                    update.display_name,
                    update.bio,
                    update.avatar_url,
                    update.email,
                    update.phone,
                    update.discord_handle,
                    now,
                ],
            )?;
            Ok(())
        });

        match result {
            Err(StoreError::Database(ref e)) if is_unique_violation(e) => {
                return Err(StoreError::conflict("Username is already taken"));
            }
            other => other?,
        }

        self.get_profile(user_id)?
            .ok_or_else(|| StoreError::not_found("Profile not found"))
    }

    pub fn get_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![user_id],
                map_profile,
            )
            .optional_row()
        })
    }

    /// Case-insensitive; a leading `@` is ignored
    pub fn lookup_profile_by_username(&self, username: &str) -> StoreResult<Option<BasicProfile>> {
        let username = username.trim().trim_start_matches('@');
        self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, display_name, avatar_url FROM profiles
                 WHERE username = ?1 COLLATE NOCASE LIMIT 1",
                params![username],
                |row| map_basic(row, 0),
            )
            .optional_row()
        })
    }

    /// Newest connections first; limit clamped to 1..=50 (default 12)
    pub fn list_bookworms(&self, user_id: &str, limit: Option<i64>) -> StoreResult<Vec<Bookworm>> {
        let limit = clamp_limit(limit, 12, 1, 50);
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT b.user_id, b.created_at, b.friend_id, p.username, p.display_name, p.avatar_url
                 FROM bookworms b
                 LEFT JOIN profiles p ON p.id = b.friend_id
                 WHERE b.user_id = ?1
                 ORDER BY b.created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit], |row| {
                let friend = map_basic(row, 2)?;
                Ok(Bookworm {
                    user_id: row.get(0)?,
                    created_at: row.get(1)?,
                    friend_id: friend.user_id.clone(),
                    friend,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Pending requests addressed to (inbound) or sent by (outbound) the user
    pub fn list_connection_requests(
        &self,
        user_id: &str,
        direction: RequestDirection,
        limit: Option<i64>,
    ) -> StoreResult<Vec<ConnectionRequest>> {
        let limit = clamp_limit(limit, 20, 1, 100);
        let column = match direction {
            RequestDirection::Inbound => "cr.target_id",
            RequestDirection::Outbound => "cr.requester_id",
        };

        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{REQUEST_SELECT}
                 WHERE {column} = ?1 AND cr.status = 'pending'
                 ORDER BY cr.created_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit], map_request)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Send a BookWorm request
    ///
    /// A pending request in the opposite direction is accepted instead.
    pub fn create_connection_request(
        &self,
        requester_id: &str,
        target_id: &str,
        message: Option<&str>,
    ) -> StoreResult<ConnectionRequest> {
        if requester_id == target_id {
            return Err(StoreError::invalid("You cannot invite yourself."));
        }

        let reciprocal = self.store.with_conn(|conn| {
            let connected: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM bookworms WHERE user_id = ?1 AND friend_id = ?2)",
                params![requester_id, target_id],
                |row| row.get(0),
            )?;
            if connected {
                return Err(StoreError::conflict("You are already connected."));
            }

            conn.query_row(
                "SELECT id FROM bookworm_requests
                 WHERE requester_id = ?1 AND target_id = ?2 AND status = 'pending'",
                params![target_id, requester_id],
                |row| row.get::<_, String>(0),
            )
            .optional_row()
        })?;

        if let Some(request_id) = reciprocal {
            tracing::debug!(request_id = %request_id, "Reciprocal BookWorm request, accepting");
            return self.accept(&request_id);
        }

        let message = message.map(str::trim).filter(|m| !m.is_empty());
        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bookworm_requests (id, requester_id, target_id, status, message, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5)
                 ON CONFLICT (requester_id, target_id) DO UPDATE SET
                    status = 'pending',
                    message = excluded.message,
                    created_at = excluded.created_at,
                    responded_at = NULL",
                params![Uuid::new_v4().to_string(), requester_id, target_id, message, Utc::now()],
            )?;
            conn.query_row(
                &format!("{REQUEST_SELECT} WHERE cr.requester_id = ?1 AND cr.target_id = ?2"),
                params![requester_id, target_id],
                map_request,
            )
            .map_err(StoreError::from)
        })
    }

    /// Accept, decline or cancel a request; `None` when it does not exist
    pub fn respond_to_request(
        &self,
        request_id: &str,
        actor_id: &str,
        action: RequestAction,
    ) -> StoreResult<Option<ConnectionRequest>> {
        let Some(request) = self.store.with_conn(|conn| load_request(conn, request_id))? else {
            return Ok(None);
        };

        match action {
            RequestAction::Accept => {
                if request.target_id != actor_id {
                    return Err(StoreError::forbidden(
                        "Only the recipient can accept this request.",
                    ));
                }
                self.accept(request_id).map(Some)
            }
            RequestAction::Decline | RequestAction::Cancel => {
                if request.requester_id != actor_id && request.target_id != actor_id {
                    return Err(StoreError::forbidden(
                        "You are not authorized to update this request.",
                    ));
                }
                let status = if action == RequestAction::Decline {
                    RequestStatus::Declined
                } else {
                    RequestStatus::Cancelled
                };
                self.store.with_conn(|conn| {
                    conn.execute(
                        "UPDATE bookworm_requests SET status = ?2, responded_at = ?3 WHERE id = ?1",
                        params![request_id, status.as_str(), Utc::now()],
                    )?;
                    load_request(conn, request_id)
                })
            }
        }
    }

    fn accept(&self, request_id: &str) -> StoreResult<ConnectionRequest> {
        let (request, post) = self.store.with_tx(|tx| {
            let now = Utc::now();
            let changed = tx.execute(
                "UPDATE bookworm_requests SET status = 'accepted', responded_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![request_id, now],
            )?;
            if changed == 0 {
                return Err(StoreError::conflict("This request is no longer pending."));
            }

            let request = load_request(tx, request_id)?
                .ok_or_else(|| StoreError::not_found("Request not found"))?;

            tx.execute(
                "INSERT OR IGNORE INTO bookworms (user_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3), (?2, ?1, ?3)",
                params![request.requester_id, request.target_id, now],
            )?;

            let requester_name = display_label(&request.requester);
            let target_name = display_label(&request.target);
            let post = NewPost {
                author_id: request.target_id.clone(),
                event_type: FeedEventType::ConnectionAccepted,
                title: Some("New BookWorm connection".to_string()),
                body: format!("{requester_name} and {target_name}"),
                metadata: json!({
                    "requestId": request.id,
                    "requesterId": request.requester_id,
                    "targetId": request.target_id,
                    "requesterDisplayName": requester_name,
                    "targetDisplayName": target_name,
                }),
                reference_id: Some(request.id.clone()),
            };
            let post_id = insert_post_in(tx, &post)?;

            Ok((request, post_id.map(|id| (id, post))))
        })?;

        if let Some((post_id, post)) = post {
            self.feed.announce(&post_id, &post);
        }

        tracing::info!(
            requester_id = %request.requester_id,
            target_id = %request.target_id,
            "BookWorm connection accepted"
        );
        Ok(request)
    }

    /// Remove the friendship in both directions
    pub fn remove_bookworm(&self, user_id: &str, friend_id: &str) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                "DELETE FROM bookworms
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                params![user_id, friend_id],
            )?;
            Ok(())
        })
    }

    pub fn connection_stats(&self, user_id: &str) -> StoreResult<ConnectionStats> {
        self.store.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM bookworms WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM bookworm_requests WHERE requester_id = ?1 AND status = 'pending'),
                    (SELECT COUNT(*) FROM bookworm_requests WHERE target_id = ?1 AND status = 'pending')",
                params![user_id],
                |row| {
                    Ok(ConnectionStats {
                        bookworm_count: row.get(0)?,
                        outgoing_pending: row.get(1)?,
                        incoming_pending: row.get(2)?,
                    })
                },
            )?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedQuery;
    use crate::realtime::{ConnectionHub, HubConfig};

    fn repos() -> (SocialRepository, FeedRepository) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let feed = FeedRepository::new(store.clone(), hub);
        (SocialRepository::new(store, feed.clone()), feed)
    }

    fn named(repo: &SocialRepository, id: &str, username: &str) {
        repo.upsert_profile(
            id,
            &ProfileUpdate {
                username: Some(username.into()),
                display_name: Some(username.to_uppercase()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_profile_upsert_keeps_unset_fields() {
        let (repo, _) = repos();
        named(&repo, "u1", "@Reader");

        let updated = repo
            .upsert_profile(
                "u1",
                &ProfileUpdate {
                    bio: Some("Reads a lot".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("Reader"));
        assert_eq!(updated.bio.as_deref(), Some("Reads a lot"));

        let found = repo.lookup_profile_by_username("reader").unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert!(repo.lookup_profile_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_username_taken_is_conflict() {
        let (repo, _) = repos();
        named(&repo, "u1", "reader");

        let err = repo
            .upsert_profile(
                "u2",
                &ProfileUpdate {
                    username: Some("READER".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert!(matches!(
            repo.upsert_profile(
                "u2",
                &ProfileUpdate {
                    username: Some("a b".into()),
                    ..Default::default()
                }
            ),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_request_accept_creates_mutual_bookworms_and_post() {
        let (repo, feed) = repos();
        named(&repo, "alice", "alice");
        named(&repo, "bob", "bob");

        let request = repo.create_connection_request("alice", "bob", Some("hi")).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(
            repo.list_connection_requests("bob", RequestDirection::Inbound, None)
                .unwrap()
                .len(),
            1
        );

        assert!(matches!(
            repo.respond_to_request(&request.id, "alice", RequestAction::Accept),
            Err(StoreError::Forbidden(_))
        ));

        let accepted = repo
            .respond_to_request(&request.id, "bob", RequestAction::Accept)
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert!(accepted.responded_at.is_some());

        assert_eq!(repo.list_bookworms("alice", None).unwrap()[0].friend_id, "bob");
        assert_eq!(repo.list_bookworms("bob", None).unwrap()[0].friend_id, "alice");

        let cards = feed.list_feed(&FeedQuery::default()).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].event_type, "connection_accepted");
        assert_eq!(cards[0].body, "ALICE and BOB");

        assert!(matches!(
            repo.create_connection_request("alice", "bob", None),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_reciprocal_request_auto_accepts() {
        let (repo, _) = repos();
        repo.create_connection_request("a", "b", None).unwrap();

        let result = repo.create_connection_request("b", "a", None).unwrap();
        assert_eq!(result.status, RequestStatus::Accepted);
        assert_eq!(result.requester_id, "a");

        let stats = repo.connection_stats("a").unwrap();
        assert_eq!(
            stats,
            ConnectionStats {
                bookworm_count: 1,
                outgoing_pending: 0,
                incoming_pending: 0
            }
        );
    }

    #[test]
    fn test_decline_cancel_and_remove() {
        let (repo, _) = repos();
        assert!(repo.create_connection_request("a", "a", None).is_err());

        let request = repo.create_connection_request("a", "b", None).unwrap();
        assert!(matches!(
            repo.respond_to_request(&request.id, "c", RequestAction::Decline),
            Err(StoreError::Forbidden(_))
        ));
        let cancelled = repo
            .respond_to_request(&request.id, "a", RequestAction::Cancel)
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(repo
            .respond_to_request("missing", "a", RequestAction::Cancel)
            .unwrap()
            .is_none());

        // re-sending resets the same row to pending
        let again = repo.create_connection_request("a", "b", None).unwrap();
        assert_eq!(again.id, request.id);
        assert_eq!(again.status, RequestStatus::Pending);
        assert!(again.responded_at.is_none());

        repo.respond_to_request(&again.id, "b", RequestAction::Accept).unwrap();
        repo.remove_bookworm("b", "a").unwrap();
        assert_eq!(repo.connection_stats("a").unwrap().bookworm_count, 0);
        assert_eq!(repo.connection_stats("b").unwrap().bookworm_count, 0);
    }

    #[test]
    fn test_accept_requires_pending_request() {
        let (repo, _) = repos();

        let request = repo.create_connection_request("a", "b", None).unwrap();
        repo.respond_to_request(&request.id, "a", RequestAction::Cancel)
            .unwrap();
        assert!(matches!(
            repo.respond_to_request(&request.id, "b", RequestAction::Accept),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(repo.connection_stats("b").unwrap().bookworm_count, 0);

        let again = repo.create_connection_request("a", "b", None).unwrap();
        repo.respond_to_request(&again.id, "b", RequestAction::Accept)
            .unwrap();
        repo.remove_bookworm("a", "b").unwrap();
        assert!(matches!(
            repo.respond_to_request(&again.id, "b", RequestAction::Accept),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(repo.connection_stats("a").unwrap().bookworm_count, 0);
    }
}
