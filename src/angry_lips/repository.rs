use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::model::{
    default_handle, Actor, CreatedSession, InvitationAction, NewSession, Participant,
    ParticipantRole, ParticipantStatus, PublishedEntry, Session, SessionDetail, SessionFilter,
    SessionStatus, TimeoutStrategy, Turn, TurnEvent, TurnStatus, VaultEntry, Visibility,
};
use super::narrator::Narrator;
use super::story::build_story;
use super::template::{generate_template, TemplateOptions, TemplateSource};
use crate::feed::{insert_post_in, FeedEventType, FeedRepository, NewPost};
use crate::ledger::{record_in, Currency, TransactionRequest};
use crate::realtime::{ConnectionHub, WsEvent};
use crate::store::{clamp_limit, OptionalRow, Store, StoreError, StoreResult};

const HOST_REWARD: i64 = 10;
const PARTICIPATION_REWARD: i64 = 5;
const DEFAULT_WINDOW_MINUTES: i64 = 5;
const MAX_WINDOW_MINUTES: i64 = 24 * 60;
const DEFAULT_STORY_TITLE: &str = "Angry Lips Story";
const FEED_EXCERPT_CHARS: usize = 280;

const SESSION_COLUMNS: &str = "s.id, s.host_id, s.title, s.genre, s.status, s.template_source,
     s.template_length, s.template_text, s.seed_text, s.response_window_minutes,
     s.allow_ai_cohost, s.vault_mode, s.timeout_strategy, s.created_at, s.updated_at,
     s.started_at, s.completed_at";

const TURN_COLUMNS: &str = "t.id, t.session_id, t.order_index, t.status, t.prompt,
     t.part_of_speech, t.creative_nudge, t.placeholder, t.assigned_user_id, t.assigned_handle,
     t.due_at, t.expires_at, t.submitted_text, t.submission_handle, t.submitted_at,
     t.auto_fill_text, t.auto_filled, t.completed_by, t.notified_channels, t.created_at";

/// Number of columns in `TURN_COLUMNS`
const TURN_WIDTH: usize = 20;

const PARTICIPANT_COLUMNS: &str =
    "session_id, user_id, role, status, handle, invited_at, responded_at";

const VAULT_COLUMNS: &str = "v.id, v.session_id, v.title, v.story_text, v.ai_story_text,
     v.summary_text, v.theme_prompt, v.visibility, v.published_at, v.published_by,
     v.created_at, v.updated_at";

fn map_session(row: &Row<'_>, start: usize) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(start)?,
        host_id: row.get(start + 1)?,
        title: row.get(start + 2)?,
        genre: row.get(start + 3)?,
        status: row.get(start + 4)?,
        template_source: row.get(start + 5)?,
        template_length: row.get(start + 6)?,
        template_text: row.get(start + 7)?,
        seed_text: row.get(start + 8)?,
        response_window_minutes: row.get(start + 9)?,
        allow_ai_cohost: row.get(start + 10)?,
        vault_mode: row.get(start + 11)?,
        timeout_strategy: row.get(start + 12)?,
        created_at: row.get(start + 13)?,
        updated_at: row.get(start + 14)?,
        started_at: row.get(start + 15)?,
        completed_at: row.get(start + 16)?,
    })
}

fn map_turn(row: &Row<'_>, start: usize) -> rusqlite::Result<Turn> {
    let channels: String = row.get(start + 18)?;
    Ok(Turn {
        id: row.get(start)?,
        session_id: row.get(start + 1)?,
        order_index: row.get(start + 2)?,
        status: row.get(start + 3)?,
        prompt: row.get(start + 4)?,
        part_of_speech: row.get(start + 5)?,
        creative_nudge: row.get(start + 6)?,
        placeholder: row.get(start + 7)?,
        assigned_user_id: row.get(start + 8)?,
        assigned_handle: row.get(start + 9)?,
        due_at: row.get(start + 10)?,
        expires_at: row.get(start + 11)?,
        submitted_text: row.get(start + 12)?,
        submission_handle: row.get(start + 13)?,
        submitted_at: row.get(start + 14)?,
        auto_fill_text: row.get(start + 15)?,
        auto_filled: row.get(start + 16)?,
        completed_by: row.get(start + 17)?,
        notified_channels: serde_json::from_str(&channels).unwrap_or_default(),
        created_at: row.get(start + 19)?,
        events: Vec::new(),
    })
}

fn map_participant(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        status: row.get(3)?,
        handle: row.get(4)?,
        invited_at: row.get(5)?,
        responded_at: row.get(6)?,
    })
}

fn map_vault(row: &Row<'_>) -> rusqlite::Result<VaultEntry> {
    Ok(VaultEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        story_text: row.get(3)?,
        ai_story_text: row.get(4)?,
        summary_text: row.get(5)?,
        theme_prompt: row.get(6)?,
        visibility: row.get(7)?,
        published_at: row.get(8)?,
        published_by: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<TurnEvent> {
    Ok(TurnEvent {
        id: row.get(0)?,
        turn_id: row.get(1)?,
        session_id: row.get(2)?,
        event_type: row.get(3)?,
        payload: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn load_session(conn: &Connection, session_id: &str) -> StoreResult<Option<Session>> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM angry_lips_sessions s WHERE s.id = ?1"),
        params![session_id],
        |row| map_session(row, 0),
    )
    .optional_row()
}

fn require_session(conn: &Connection, session_id: &str) -> StoreResult<Session> {
    load_session(conn, session_id)?.ok_or_else(|| StoreError::not_found("Session not found"))
}

fn ensure_host(session: &Session, actor: Actor<'_>) -> StoreResult<()> {
    match actor {
        Actor::System => Ok(()),
        Actor::User(user_id) if user_id == session.host_id => Ok(()),
        Actor::User(_) => Err(StoreError::forbidden(
            "Only the session host can perform this action.",
        )),
    }
}

fn load_participants(conn: &Connection, session_id: &str) -> StoreResult<Vec<Participant>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM angry_lips_participants
         WHERE session_id = ?1
         ORDER BY CASE role WHEN 'host' THEN 0 ELSE 1 END, invited_at, user_id"
    ))?;
    let rows = stmt.query_map(params![session_id], map_participant)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_participant(
    conn: &Connection,
    session_id: &str,
    user_id: &str,
) -> StoreResult<Option<Participant>> {
    conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM angry_lips_participants
             WHERE session_id = ?1 AND user_id = ?2"
        ),
        params![session_id, user_id],
        map_participant,
    )
    .optional_row()
}

fn load_turns(conn: &Connection, session_id: &str, with_events: bool) -> StoreResult<Vec<Turn>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TURN_COLUMNS} FROM angry_lips_turns t
         WHERE t.session_id = ?1 ORDER BY t.order_index"
    ))?;
    let mut turns = stmt
        .query_map(params![session_id], |row| map_turn(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;

    if with_events {
        let mut stmt = conn.prepare_cached(
            "SELECT id, turn_id, session_id, event_type, payload, created_at
             FROM angry_lips_turn_events WHERE session_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let events = stmt
            .query_map(params![session_id], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        for event in events {
            if let Some(turn) = turns.iter_mut().find(|t| t.id == event.turn_id) {
                turn.events.push(event);
            }
        }
    }

    Ok(turns)
}

fn load_turn(conn: &Connection, turn_id: &str) -> StoreResult<Option<Turn>> {
    conn.query_row(
        &format!("SELECT {TURN_COLUMNS} FROM angry_lips_turns t WHERE t.id = ?1"),
        params![turn_id],
        |row| map_turn(row, 0),
    )
    .optional_row()
}

fn require_turn(conn: &Connection, turn_id: &str) -> StoreResult<Turn> {
    load_turn(conn, turn_id)?.ok_or_else(|| StoreError::not_found("Turn not found"))
}

fn load_vault(conn: &Connection, session_id: &str) -> StoreResult<Option<VaultEntry>> {
    conn.query_row(
        &format!("SELECT {VAULT_COLUMNS} FROM angry_lips_vault_entries v WHERE v.session_id = ?1"),
        params![session_id],
        map_vault,
    )
    .optional_row()
}

fn insert_event_in(
    conn: &Connection,
    turn_id: &str,
    session_id: &str,
    event_type: &str,
    payload: Value,
) -> StoreResult<TurnEvent> {
    let event = TurnEvent {
        id: Uuid::new_v4().to_string(),
        turn_id: turn_id.to_string(),
        session_id: session_id.to_string(),
        event_type: event_type.to_string(),
        payload,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO angry_lips_turn_events (id, turn_id, session_id, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.id,
            event.turn_id,
            event.session_id,
            event.event_type,
            event.payload,
            event.created_at
        ],
    )?;
    Ok(event)
}

/// Insert or re-invite a participant; the host row is never downgraded
fn upsert_participant_in(
    conn: &Connection,
    session_id: &str,
    user_id: &str,
    role: ParticipantRole,
    status: ParticipantStatus,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let responded_at = (status == ParticipantStatus::Accepted).then_some(now);
    conn.execute(
        "INSERT INTO angry_lips_participants (session_id, user_id, role, status, invited_at, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (session_id, user_id) DO UPDATE SET
             role = excluded.role,
             status = excluded.status,
             invited_at = excluded.invited_at,
             responded_at = excluded.responded_at
         WHERE angry_lips_participants.role != 'host' OR excluded.role = 'host'",
        params![session_id, user_id, role, status, now, responded_at],
    )?;
    Ok(())
}

fn invitee_ids<'a>(host_id: &str, ids: &'a [String]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && *id != host_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn title_for(title: Option<&str>, genre: Option<&str>) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    match genre.map(str::trim).filter(|g| !g.is_empty()) {
        Some(genre) => {
            let mut chars = genre.chars();
            let capitalized: String = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            format!("{} Party", capitalized)
        }
        None => "Angry Lips Session".to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= FEED_EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(FEED_EXCERPT_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

/// What `advance_turn` did after clearing the current turn
enum Advance {
    Next {
        turn_id: String,
        due_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Completed,
    /// The expected turn is no longer open
    Stale,
}

/// Angry Lips sessions, turns and vault entries
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<Store>,
    hub: Arc<ConnectionHub>,
    feed: FeedRepository,
    narrator: Arc<dyn Narrator>,
}

impl SessionRepository {
    pub fn new(
        store: Arc<Store>,
        hub: Arc<ConnectionHub>,
        feed: FeedRepository,
        narrator: Arc<dyn Narrator>,
    ) -> Self {
        Self {
            store,
            hub,
            feed,
            narrator,
        }
    }

    pub fn narrator(&self) -> &Arc<dyn Narrator> {
        &self.narrator
    }

    /// Create a draft session with one pending turn per template blank
    pub fn create_session(&self, host_id: &str, input: &NewSession) -> StoreResult<CreatedSession> {
        let source = input.source();
        let length = input.length();
        let seed_text = non_empty(input.seed_text.as_deref()).map(str::to_string);
        if source == TemplateSource::Custom && seed_text.is_none() {
            return Err(StoreError::invalid("Custom templates need seed text."));
        }

        let window = input.response_window_minutes.unwrap_or(DEFAULT_WINDOW_MINUTES);
        if !(1..=MAX_WINDOW_MINUTES).contains(&window) {
            return Err(StoreError::invalid(format!(
                "Response window must be between 1 and {} minutes.",
                MAX_WINDOW_MINUTES
            )));
        }

        let genre = non_empty(input.genre.as_deref()).map(str::to_string);
        let template = generate_template(&TemplateOptions {
            genre: genre.clone(),
            source,
            length,
            seed_text: seed_text.clone(),
        });

        let session_id = Uuid::new_v4().to_string();
        let title = title_for(input.title.as_deref(), genre.as_deref());
        let invitees = invitee_ids(host_id, &input.participant_ids);
        let now = Utc::now();

        self.store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO angry_lips_sessions (
                     id, host_id, title, genre, status, template_source, template_length,
                     template_text, seed_text, response_window_minutes, allow_ai_cohost,
                     vault_mode, timeout_strategy, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    session_id,
                    host_id,
                    title,
                    genre,
                    SessionStatus::Draft,
                    source.as_str(),
                    length.as_str(),
                    template.template,
                    seed_text,
                    window,
                    input.allow_ai_cohost.unwrap_or(true),
                    input.vault_mode.unwrap_or(Visibility::InviteOnly),
                    input.timeout_strategy.unwrap_or(TimeoutStrategy::AiAutofill),
                    now,
                ],
            )?;

            for (index, blank) in template.blanks.iter().enumerate() {
                let turn_id = Uuid::new_v4().to_string();
                let placeholder = blank.placeholder();
                tx.execute(
                    "INSERT INTO angry_lips_turns (
                         id, session_id, order_index, status, prompt, part_of_speech,
                         creative_nudge, placeholder, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        turn_id,
                        session_id,
                        index as i64,
                        TurnStatus::Pending,
                        blank.prompt,
                        blank.slot,
                        blank.creative_nudge(),
                        placeholder,
                        now,
                    ],
                )?;
                insert_event_in(
                    tx,
                    &turn_id,
                    &session_id,
                    "turn_seeded",
                    json!({
                        "slot": blank.slot,
                        "placeholder": placeholder,
                        "prompt": blank.prompt,
                        "description": blank.description,
                        "example": blank.example,
                    }),
                )?;
            }

            upsert_participant_in(
                tx,
                &session_id,
                host_id,
                ParticipantRole::Host,
                ParticipantStatus::Accepted,
                now,
            )?;
            for user_id in &invitees {
                upsert_participant_in(
                    tx,
                    &session_id,
                    user_id,
                    ParticipantRole::Player,
                    ParticipantStatus::Invited,
                    now,
                )?;
            }

            record_in(
                tx,
                &TransactionRequest::credit(
                    host_id,
                    Currency::Mythacoin,
                    HOST_REWARD,
                    "angry_lips_host_session",
                )
                .description("Hosted Angry Lips session")
                .reference(session_id.as_str())
                .metadata(json!({ "sessionId": session_id })),
            )?;
            Ok(())
        })?;

        tracing::info!(
            session_id = %session_id,
            host_id,
            blanks = template.blanks.len(),
            invited = invitees.len(),
            "Angry Lips session created"
        );

        self.hub.publish(WsEvent::session_event(
            &session_id,
            "session_created",
            json!({
                "templateSource": source.as_str(),
                "templateLength": length.as_str(),
                "blankCount": template.metadata.blank_count,
            }),
        ));
        for user_id in &invitees {
            self.notify_invite(user_id, &session_id, &title);
        }

        let session = self
            .get_session(&session_id)?
            .ok_or_else(|| StoreError::not_found("Session not found"))?;
        Ok(CreatedSession { session, template })
    }

    fn notify_invite(&self, user_id: &str, session_id: &str, title: &str) {
        self.hub.publish(WsEvent::notification(
            user_id,
            "angry_lips_invite",
            "Angry Lips invitation",
            &format!("You were invited to join \"{}\".", title),
            Some(format!("/angry-lips/session/{}", session_id)),
        ));
    }

    /// Session with participants, ordered turns and each turn's events
    pub fn get_session(&self, session_id: &str) -> StoreResult<Option<SessionDetail>> {
        self.store.with_conn(|conn| {
            let Some(session) = load_session(conn, session_id)? else {
                return Ok(None);
            };
            Ok(Some(SessionDetail {
                participants: load_participants(conn, session_id)?,
                turns: load_turns(conn, session_id, true)?,
                session,
            }))
        })
    }

    pub fn list_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<SessionDetail>> {
        let limit = clamp_limit(filter.limit, 20, 1, 100);
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SESSION_COLUMNS} FROM angry_lips_sessions s
                 WHERE (?1 IS NULL OR s.status = ?1)
                   AND (?2 IS NULL OR s.host_id = ?2 OR EXISTS (
                        SELECT 1 FROM angry_lips_participants p
                        WHERE p.session_id = s.id AND p.user_id = ?2))
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?3"
            ))?;
            let sessions = stmt
                .query_map(params![filter.status, filter.user_id, limit], |row| {
                    map_session(row, 0)
                })?
                .collect::<Result<Vec<_>, _>>()?;

            sessions
                .into_iter()
                .map(|session| {
                    Ok(SessionDetail {
                        participants: load_participants(conn, &session.id)?,
                        turns: Vec::new(),
                        session,
                    })
                })
                .collect()
        })
    }

    pub fn list_participants(&self, session_id: &str) -> StoreResult<Vec<Participant>> {
        self.store.with_conn(|conn| {
            require_session(conn, session_id)?;
            load_participants(conn, session_id)
        })
    }

    pub fn invite_participants(
        &self,
        session_id: &str,
        host_id: &str,
        user_ids: &[String],
    ) -> StoreResult<Vec<Participant>> {
        let invitees = invitee_ids(host_id, user_ids);
        let now = Utc::now();

        let (session, participants) = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, Actor::User(host_id))?;
            if session.status == SessionStatus::Completed {
                return Err(StoreError::conflict("Session has already been completed."));
            }
            for user_id in &invitees {
                upsert_participant_in(
                    tx,
                    session_id,
                    user_id,
                    ParticipantRole::Player,
                    ParticipantStatus::Invited,
                    now,
                )?;
            }
            Ok((session, load_participants(tx, session_id)?))
        })?;

        if !invitees.is_empty() {
            self.hub.publish(WsEvent::session_event(
                session_id,
                "participants_invited",
                json!({ "userIds": invitees }),
            ));
            for user_id in &invitees {
                self.notify_invite(user_id, session_id, &session.title);
            }
        }

        Ok(participants)
    }

    /// Accept, decline or leave; `None` when the user has no invitation
    pub fn respond_to_invitation(
        &self,
        session_id: &str,
        user_id: &str,
        action: &str,
    ) -> StoreResult<Option<Participant>> {
        let action = InvitationAction::parse(action.trim())
            .ok_or_else(|| StoreError::invalid("Unsupported invitation action."))?;
        let status = action.resulting_status();
        let now = Utc::now();

        let participant = self.store.with_tx(|tx| {
            let Some(current) = load_participant(tx, session_id, user_id)? else {
                return Ok(None);
            };
            if current.role == ParticipantRole::Host {
                return Ok(None);
            }

            tx.execute(
                "UPDATE angry_lips_participants SET status = ?3, responded_at = ?4
                 WHERE session_id = ?1 AND user_id = ?2",
                params![session_id, user_id, status, now],
            )?;

            let rewarded: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM ledger_transactions
                 WHERE user_id = ?1 AND transaction_type = 'angry_lips_participation'
                   AND reference_id = ?2)",
                params![user_id, session_id],
                |row| row.get(0),
            )?;
            if status == ParticipantStatus::Accepted && !rewarded {
                record_in(
                    tx,
                    &TransactionRequest::credit(
                        user_id,
                        Currency::Mythacoin,
                        PARTICIPATION_REWARD,
                        "angry_lips_participation",
                    )
                    .description("Accepted Angry Lips session invitation")
                    .reference(session_id)
                    .metadata(json!({ "sessionId": session_id })),
                )?;
            }

            load_participant(tx, session_id, user_id)
        })?;

        if let Some(participant) = &participant {
            self.hub.publish(WsEvent::session_event(
                session_id,
                "participant_status",
                json!({
                    "participantId": participant.user_id,
                    "status": participant.status,
                    "handle": participant.display_handle(),
                }),
            ));
        }

        Ok(participant)
    }

    /// Assign turns round-robin and open the first one
    pub fn start_session(&self, session_id: &str, host_id: &str) -> StoreResult<SessionDetail> {
        let now = Utc::now();

        let started = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, Actor::User(host_id))?;
            match session.status {
                SessionStatus::Active => return Ok(None),
                SessionStatus::Completed => {
                    return Err(StoreError::conflict("Session has already been completed."))
                }
                SessionStatus::Draft => {}
            }

            let active: Vec<Participant> = load_participants(tx, session_id)?
                .into_iter()
                .filter(Participant::is_active)
                .collect();
            if active.is_empty() {
                return Err(StoreError::invalid(
                    "At least one participant must accept before starting the session.",
                ));
            }

            let turns = load_turns(tx, session_id, false)?;
            for (index, turn) in turns.iter().enumerate() {
                let participant = &active[index % active.len()];
                tx.execute(
                    "UPDATE angry_lips_turns SET assigned_user_id = ?2, assigned_handle = ?3
                     WHERE id = ?1",
                    params![turn.id, participant.user_id, participant.display_handle()],
                )?;
            }

            let expires_at = now + Duration::minutes(session.response_window_minutes);
            let first_turn_id = turns.first().map(|t| t.id.clone());
            if let Some(turn_id) = &first_turn_id {
                tx.execute(
                    "UPDATE angry_lips_turns SET due_at = ?2, expires_at = ?3 WHERE id = ?1",
                    params![turn_id, now, expires_at],
                )?;
            }

            tx.execute(
                "UPDATE angry_lips_sessions SET status = ?2, started_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![session_id, SessionStatus::Active, now],
            )?;

            let order: Vec<Value> = active
                .iter()
                .map(|p| json!({ "userId": p.user_id, "handle": p.display_handle() }))
                .collect();
            Ok(Some((order, first_turn_id, expires_at)))
        })?;

        if let Some((order, first_turn_id, expires_at)) = started {
            tracing::info!(session_id, players = order.len(), "Angry Lips session started");
            self.hub.publish(WsEvent::session_event(
                session_id,
                "session_started",
                json!({
                    "participantOrder": order,
                    "firstTurnId": first_turn_id,
                    "dueAt": now,
                    "expiresAt": expires_at,
                }),
            ));
        }

        self.get_session(session_id)?
            .ok_or_else(|| StoreError::not_found("Session not found"))
    }

    /// Close the current turn and open the next pending one
    ///
    /// A still-pending current turn is skipped. With no pending turns left
    /// the session completes. When `expected_turn_id` is given the call is a
    /// no-op unless that turn is still the open one.
    pub fn advance_turn(
        &self,
        session_id: &str,
        actor: Actor<'_>,
        expected_turn_id: Option<&str>,
    ) -> StoreResult<SessionDetail> {
        let now = Utc::now();

        let (advance, skipped) = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, actor)?;
            if let Some(expected) = expected_turn_id {
                let open: Option<String> = tx
                    .query_row(
                        "SELECT id FROM angry_lips_turns
                         WHERE session_id = ?1 AND due_at IS NOT NULL
                         ORDER BY order_index LIMIT 1",
                        params![session_id],
                        |row| row.get(0),
                    )
                    .optional_row()?;
                if session.status != SessionStatus::Active || open.as_deref() != Some(expected) {
                    return Ok((Advance::Stale, None));
                }
            }
            if session.status != SessionStatus::Active {
                return Err(StoreError::conflict("Session is not active."));
            }

            let current: Option<String> = tx
                .query_row(
                    "SELECT id FROM angry_lips_turns
                     WHERE session_id = ?1 AND status = 'pending' AND due_at IS NOT NULL
                     ORDER BY order_index LIMIT 1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional_row()?;

            let mut skipped = None;
            if let Some(turn_id) = current {
                tx.execute(
                    "UPDATE angry_lips_turns SET status = ?2 WHERE id = ?1",
                    params![turn_id, TurnStatus::Skipped],
                )?;
                let by = match actor {
                    Actor::User(_) => "host",
                    Actor::System => "system",
                };
                skipped = Some(insert_event_in(tx, &turn_id, session_id, "skipped", json!({ "by": by }))?);
            }
            tx.execute(
                "UPDATE angry_lips_turns SET due_at = NULL, expires_at = NULL
                 WHERE session_id = ?1 AND due_at IS NOT NULL",
                params![session_id],
            )?;

            let next: Option<String> = tx
                .query_row(
                    "SELECT id FROM angry_lips_turns
                     WHERE session_id = ?1 AND status = 'pending' AND due_at IS NULL
                     ORDER BY order_index LIMIT 1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional_row()?;

            let advance = match next {
                Some(turn_id) => {
                    let expires_at = now + Duration::minutes(session.response_window_minutes);
                    tx.execute(
                        "UPDATE angry_lips_turns SET due_at = ?2, expires_at = ?3 WHERE id = ?1",
                        params![turn_id, now, expires_at],
                    )?;
                    tx.execute(
                        "UPDATE angry_lips_sessions SET updated_at = ?2 WHERE id = ?1",
                        params![session_id, now],
                    )?;
                    Advance::Next {
                        turn_id,
                        due_at: now,
                        expires_at,
                    }
                }
                None => {
                    tx.execute(
                        "UPDATE angry_lips_sessions
                         SET status = ?2, completed_at = COALESCE(completed_at, ?3), updated_at = ?3
                         WHERE id = ?1",
                        params![session_id, SessionStatus::Completed, now],
                    )?;
                    Advance::Completed
                }
            };
            Ok((advance, skipped))
        })?;

        if let Some(event) = skipped {
            self.publish_turn_event(&event);
        }
        match advance {
            Advance::Next {
                turn_id,
                due_at,
                expires_at,
            } => {
                tracing::debug!(session_id, turn_id = %turn_id, "Angry Lips turn advanced");
                self.hub.publish(WsEvent::session_event(
                    session_id,
                    "turn_advanced",
                    json!({ "turnId": turn_id, "dueAt": due_at, "expiresAt": expires_at }),
                ));
            }
            Advance::Stale => {
                tracing::debug!(session_id, "Turn already moved on, nothing to advance");
            }
            Advance::Completed => {
                tracing::info!(session_id, "Angry Lips session ran out of turns");
                self.hub.publish(WsEvent::session_event(
                    session_id,
                    "session_completed",
                    json!({ "sessionId": session_id }),
                ));
            }
        }

        self.get_session(session_id)?
            .ok_or_else(|| StoreError::not_found("Session not found"))
    }

    fn publish_turn_event(&self, event: &TurnEvent) {
        self.hub.publish(WsEvent::turn_event(
            &event.session_id,
            &event.turn_id,
            &event.event_type,
            event.payload.clone(),
        ));
    }

    pub fn submit_turn(
        &self,
        turn_id: &str,
        user_id: &str,
        text: &str,
        handle: Option<&str>,
    ) -> StoreResult<Turn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::invalid("Submission text is required."));
        }
        let now = Utc::now();

        let (turn, event) = self.store.with_tx(|tx| {
            let turn = require_turn(tx, turn_id)?;
            let session = require_session(tx, &turn.session_id)?;
            if session.status != SessionStatus::Active {
                return Err(StoreError::conflict("Session is not active."));
            }
            if let Some(assigned) = &turn.assigned_user_id {
                if assigned != user_id {
                    return Err(StoreError::forbidden(
                        "This turn is assigned to another participant.",
                    ));
                }
            }
            if turn.status.is_finished() {
                return Err(StoreError::conflict("This turn has already been completed."));
            }

            let handle = non_empty(handle)
                .map(str::to_string)
                .or_else(|| turn.assigned_handle.clone())
                .unwrap_or_else(|| default_handle(user_id));

            tx.execute(
                "UPDATE angry_lips_turns
                 SET status = ?2, submitted_text = ?3, submission_handle = ?4,
                     submitted_at = ?5, completed_by = 'player'
                 WHERE id = ?1",
                params![turn_id, TurnStatus::Submitted, text, handle, now],
            )?;
            let event = insert_event_in(
                tx,
                turn_id,
                &turn.session_id,
                "submitted",
                json!({ "handle": handle, "userId": user_id, "text": text }),
            )?;
            Ok((require_turn(tx, turn_id)?, event))
        })?;

        self.publish_turn_event(&event);
        Ok(turn)
    }

    /// Fill a turn without its player
    ///
    /// Without `text` the narrator picks a word for the turn's slot.
    pub async fn auto_fill_turn(
        &self,
        turn_id: &str,
        requester: Actor<'_>,
        text: Option<&str>,
        handle: Option<&str>,
    ) -> StoreResult<Turn> {
        let (turn, session) = self.store.with_conn(|conn| {
            let turn = require_turn(conn, turn_id)?;
            let session = require_session(conn, &turn.session_id)?;
            Ok((turn, session))
        })?;

        if let Actor::User(user_id) = requester {
            let assigned = turn.assigned_user_id.as_deref() == Some(user_id);
            if user_id != session.host_id && !assigned {
                return Err(StoreError::forbidden(
                    "Only the host or the assigned player can auto-fill this turn.",
                ));
            }
        }
        if turn.status.is_finished() {
            return Err(StoreError::conflict("This turn has already been completed."));
        }

        let fill = match non_empty(text) {
            Some(text) => text.to_string(),
            None => {
                if !session.allow_ai_cohost {
                    return Err(StoreError::invalid("The AI co-host is disabled for this session."));
                }
                let slot = turn.part_of_speech.as_deref().unwrap_or("silly_word");
                self.narrator.fill_blank(slot, &turn.prompt).await
            }
        };
        let handle = non_empty(handle).unwrap_or("ai").to_string();
        let now = Utc::now();

        let (turn, event) = self.store.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE angry_lips_turns
                 SET status = ?2, auto_fill_text = ?3, auto_filled = 1,
                     submission_handle = ?4, submitted_at = ?5, completed_by = 'ai'
                 WHERE id = ?1 AND status = 'pending'",
                params![turn_id, TurnStatus::AutoFilled, fill, handle, now],
            )?;
            if updated == 0 {
                return Err(StoreError::conflict("This turn has already been completed."));
            }
            let event = insert_event_in(
                tx,
                turn_id,
                &session.id,
                "auto_filled",
                json!({ "handle": handle, "text": fill }),
            )?;
            Ok((require_turn(tx, turn_id)?, event))
        })?;

        tracing::debug!(turn_id, session_id = %session.id, "Angry Lips turn auto-filled");
        self.publish_turn_event(&event);
        Ok(turn)
    }

    pub fn log_turn_event(
        &self,
        turn_id: &str,
        event_type: &str,
        payload: Value,
    ) -> StoreResult<TurnEvent> {
        let event_type = event_type.trim();
        if event_type.is_empty() {
            return Err(StoreError::invalid("Event type is required."));
        }
        let event = self.store.with_tx(|tx| {
            let turn = require_turn(tx, turn_id)?;
            insert_event_in(tx, turn_id, &turn.session_id, event_type, payload)
        })?;
        self.publish_turn_event(&event);
        Ok(event)
    }

    /// Finish the session and write (or rewrite) its vault entry
    pub fn complete_session(
        &self,
        session_id: &str,
        actor: Actor<'_>,
        story_text: Option<&str>,
        title: Option<&str>,
        visibility: Option<Visibility>,
    ) -> StoreResult<VaultEntry> {
        let entry = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, actor)?;
            finalize_in(tx, &session, story_text, title, visibility)
        })?;
        self.announce_completed(&entry);
        Ok(entry)
    }

    fn announce_completed(&self, entry: &VaultEntry) {
        tracing::info!(session_id = %entry.session_id, vault_entry_id = %entry.id, "Angry Lips session completed");
        self.hub.publish(WsEvent::session_event(
            &entry.session_id,
            "session_completed",
            json!({ "vaultEntryId": entry.id, "visibility": entry.visibility }),
        ));
    }

    /// Summaries are open to the host and accepted players
    fn ensure_member(conn: &Connection, session: &Session, user_id: &str) -> StoreResult<()> {
        if session.host_id == user_id {
            return Ok(());
        }
        match load_participant(conn, &session.id, user_id)? {
            None => Err(StoreError::forbidden("You are not part of this Angry Lips session.")),
            Some(p) if p.status != ParticipantStatus::Accepted => Err(StoreError::forbidden(
                "You need to accept the invitation before running this action.",
            )),
            Some(_) => Ok(()),
        }
    }

    /// Complete the session if needed, then have the narrator summarize it
    pub async fn summarize_session(
        &self,
        session_id: &str,
        requester: &str,
        focus: Option<&str>,
    ) -> StoreResult<(VaultEntry, String)> {
        let (entry, newly_completed) = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            Self::ensure_member(tx, &session, requester)?;
            let existing = load_vault(tx, session_id)?;
            match existing {
                Some(entry) if session.status == SessionStatus::Completed => Ok((entry, false)),
                existing => {
                    let story = existing.as_ref().map(|e| e.story_text.clone());
                    Ok((finalize_in(tx, &session, story.as_deref(), None, None)?, true))
                }
            }
        })?;
        if newly_completed {
            self.announce_completed(&entry);
        }

        let focus = non_empty(focus);
        let summary = self.narrator.summarize(&entry.story_text, focus).await;

        let entry = self.store.with_tx(|tx| {
            tx.execute(
                "UPDATE angry_lips_vault_entries
                 SET summary_text = ?2, theme_prompt = COALESCE(?3, theme_prompt), updated_at = ?4
                 WHERE id = ?1",
                params![entry.id, summary, focus, Utc::now()],
            )?;
            load_vault(tx, session_id)?.ok_or_else(|| StoreError::not_found("Vault entry not found"))
        })?;

        Ok((entry, summary))
    }

    /// Have the narrator retell the finished story
    pub async fn generate_ai_story(
        &self,
        session_id: &str,
        host_id: &str,
        prompt: Option<&str>,
    ) -> StoreResult<(VaultEntry, String)> {
        let (entry, newly_completed) = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, Actor::User(host_id))?;
            match load_vault(tx, session_id)? {
                Some(entry) => Ok((entry, false)),
                None => Ok((finalize_in(tx, &session, None, None, None)?, true)),
            }
        })?;
        if newly_completed {
            self.announce_completed(&entry);
        }

        let prompt = non_empty(prompt);
        let story = self
            .narrator
            .compose_story(prompt.unwrap_or_default(), &entry.story_text)
            .await;

        let entry = self.store.with_tx(|tx| {
            tx.execute(
                "UPDATE angry_lips_vault_entries
                 SET ai_story_text = ?2, theme_prompt = COALESCE(?3, theme_prompt), updated_at = ?4
                 WHERE id = ?1",
                params![entry.id, story, prompt, Utc::now()],
            )?;
            load_vault(tx, session_id)?.ok_or_else(|| StoreError::not_found("Vault entry not found"))
        })?;

        Ok((entry, story))
    }

    /// Change a vault entry's visibility, posting to the feed on first publish
    pub fn publish_vault_entry(
        &self,
        session_id: &str,
        host_id: &str,
        visibility: Option<Visibility>,
    ) -> StoreResult<VaultEntry> {
        let visibility = visibility.unwrap_or(Visibility::Public);
        let now = Utc::now();

        let (entry, post) = self.store.with_tx(|tx| {
            let session = require_session(tx, session_id)?;
            ensure_host(&session, Actor::User(host_id))?;
            let entry = load_vault(tx, session_id)?
                .ok_or_else(|| StoreError::not_found("Vault entry not found"))?;

            let public = visibility == Visibility::Public;
            tx.execute(
                "UPDATE angry_lips_vault_entries
                 SET visibility = ?2,
                     published_at = CASE WHEN ?3 THEN COALESCE(published_at, ?4) ELSE NULL END,
                     published_by = CASE WHEN ?3 THEN ?5 ELSE NULL END,
                     updated_at = ?4
                 WHERE id = ?1",
                params![entry.id, visibility, public, now, host_id],
            )?;
            tx.execute(
                "UPDATE angry_lips_sessions SET vault_mode = ?2, updated_at = ?3 WHERE id = ?1",
                params![session_id, visibility, now],
            )?;

            let mut post = None;
            if public {
                let new_post = NewPost {
                    author_id: host_id.to_string(),
                    event_type: FeedEventType::AngryLipsPublished,
                    title: Some(entry.title.clone()),
                    body: excerpt(&entry.story_text),
                    metadata: json!({
                        "sessionId": session_id,
                        "vaultEntryId": entry.id,
                        "genre": session.genre,
                    }),
                    reference_id: Some(entry.id.clone()),
                };
                if let Some(post_id) = insert_post_in(tx, &new_post)? {
                    post = Some((post_id, new_post));
                }
            }

            let entry = load_vault(tx, session_id)?
                .ok_or_else(|| StoreError::not_found("Vault entry not found"))?;
            Ok((entry, post))
        })?;

        if let Some((post_id, new_post)) = post {
            self.feed.announce(&post_id, &new_post);
        }
        self.hub.publish(WsEvent::session_event(
            session_id,
            "vault_visibility",
            json!({ "vaultEntryId": entry.id, "visibility": entry.visibility }),
        ));

        Ok(entry)
    }

    pub fn list_published_entries(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<PublishedEntry>> {
        let limit = clamp_limit(limit, 20, 1, 100);
        let offset = offset.unwrap_or(0).max(0);
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {VAULT_COLUMNS}, s.title, s.genre, s.host_id, pr.username, pr.display_name
                 FROM angry_lips_vault_entries v
                 JOIN angry_lips_sessions s ON s.id = v.session_id
                 LEFT JOIN profiles pr ON pr.id = s.host_id
                 WHERE v.visibility = 'public'
                 ORDER BY COALESCE(v.published_at, v.created_at) DESC, v.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![limit, offset], |row| {
                Ok(PublishedEntry {
                    entry: map_vault(row)?,
                    session_title: row.get(12)?,
                    genre: row.get(13)?,
                    host_id: row.get(14)?,
                    host_username: row.get(15)?,
                    host_display_name: row.get(16)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn build_session_story(&self, session_id: &str) -> StoreResult<String> {
        self.store.with_conn(|conn| {
            let session = require_session(conn, session_id)?;
            let turns = load_turns(conn, session_id, false)?;
            Ok(build_story(&session.template_text, &turns))
        })
    }

    /// Pending turns of active sessions that carry a due time, oldest first
    pub fn due_turns(&self, batch_size: i64) -> StoreResult<Vec<(Session, Turn)>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {TURN_COLUMNS}, {SESSION_COLUMNS}
                 FROM angry_lips_turns t
                 JOIN angry_lips_sessions s ON s.id = t.session_id
                 WHERE s.status = 'active' AND t.status = 'pending' AND t.due_at IS NOT NULL
                 ORDER BY t.created_at, t.order_index
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![batch_size.max(1)], |row| {
                Ok((map_session(row, TURN_WIDTH)?, map_turn(row, 0)?))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn set_expiration(&self, turn_id: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE angry_lips_turns SET expires_at = ?2 WHERE id = ?1",
                params![turn_id, expires_at],
            )?;
            Ok(())
        })
    }

    /// Merge channels into a turn's notified set, returning the new set
    pub fn record_notified(&self, turn_id: &str, channels: &[String]) -> StoreResult<Vec<String>> {
        self.store.with_tx(|tx| {
            let turn = require_turn(tx, turn_id)?;
            let mut merged = turn.notified_channels;
            for channel in channels {
                if !merged.contains(channel) {
                    merged.push(channel.clone());
                }
            }
            tx.execute(
                "UPDATE angry_lips_turns SET notified_channels = ?2 WHERE id = ?1",
                params![turn_id, serde_json::to_string(&merged)?],
            )?;
            Ok(merged)
        })
    }
}

/// Mark the session completed and upsert its vault entry
fn finalize_in(
    conn: &Connection,
    session: &Session,
    story_text: Option<&str>,
    title: Option<&str>,
    visibility: Option<Visibility>,
) -> StoreResult<VaultEntry> {
    let existing = load_vault(conn, &session.id)?;
    let story = match non_empty(story_text) {
        Some(text) => text.to_string(),
        None => build_story(&session.template_text, &load_turns(conn, &session.id, false)?),
    };
    let title = non_empty(title)
        .map(str::to_string)
        .or_else(|| existing.as_ref().map(|e| e.title.clone()))
        .or_else(|| non_empty(Some(&session.title)).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_STORY_TITLE.to_string());
    let visibility = visibility
        .or_else(|| existing.as_ref().map(|e| e.visibility))
        .unwrap_or(session.vault_mode);
    let now = Utc::now();

    conn.execute(
        "UPDATE angry_lips_sessions
         SET status = ?2, vault_mode = ?3, completed_at = COALESCE(completed_at, ?4), updated_at = ?4
         WHERE id = ?1",
        params![session.id, SessionStatus::Completed, visibility, now],
    )?;
    conn.execute(
        "UPDATE angry_lips_turns SET due_at = NULL, expires_at = NULL WHERE session_id = ?1",
        params![session.id],
    )?;
    conn.execute(
        "INSERT INTO angry_lips_vault_entries (id, session_id, title, story_text, visibility, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT (session_id) DO UPDATE SET
             title = excluded.title,
             story_text = excluded.story_text,
             visibility = excluded.visibility,
             updated_at = excluded.updated_at",
        params![Uuid::new_v4().to_string(), session.id, title, story, visibility, now],
    )?;

    load_vault(conn, &session.id)?.ok_or_else(|| StoreError::not_found("Vault entry not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angry_lips::narrator::LocalNarrator;
    use crate::feed::FeedQuery;
    use crate::ledger::Ledger;
    use crate::realtime::{HubConfig, ServerMessage};

    struct Fixture {
        repo: SessionRepository,
        feed: FeedRepository,
        ledger: Ledger,
        hub: Arc<ConnectionHub>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let feed = FeedRepository::new(store.clone(), hub.clone());
        let repo = SessionRepository::new(store.clone(), hub.clone(), feed.clone(), Arc::new(LocalNarrator));
        Fixture {
            repo,
            feed,
            ledger: Ledger::new(store),
            hub,
        }
    }

    fn create(fx: &Fixture, players: &[&str]) -> SessionDetail {
        fx.repo
            .create_session(
                "host-1",
                &NewSession {
                    genre: Some("heist".into()),
                    participant_ids: players.iter().map(|p| p.to_string()).collect(),
                    ..Default::default()
                },
            )
            .unwrap()
            .session
    }

    fn started(fx: &Fixture) -> SessionDetail {
        let session = create(fx, &["player-1"]);
        fx.repo
            .respond_to_invitation(&session.session.id, "player-1", "accept")
            .unwrap();
        fx.repo.start_session(&session.session.id, "host-1").unwrap()
    }

    fn session_events(rx: &mut tokio::sync::broadcast::Receiver<WsEvent>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ServerMessage::SessionEvent { event, .. } = event.message {
                names.push(event);
            }
        }
        names
    }

    #[test]
    fn test_create_session_seeds_turns_and_rewards_host() {
        let fx = fixture();
        let mut rx = fx.hub.subscribe_broadcast();
        let created = fx
            .repo
            .create_session(
                "host-1",
                &NewSession {
                    participant_ids: vec!["p1".into(), "p1".into(), "host-1".into(), " ".into()],
                    template_length: Some("EPIC".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let session = &created.session;
        assert_eq!(session.session.title, "Angry Lips Session");
        assert_eq!(session.session.status, SessionStatus::Draft);
        assert_eq!(session.session.template_length, "epic");
        assert_eq!(session.session.vault_mode, Visibility::InviteOnly);
        assert_eq!(session.session.response_window_minutes, 5);
        assert_eq!(session.turns.len(), 23);
        assert_eq!(session.turns[0].order_index, 0);
        assert_eq!(session.turns[0].status, TurnStatus::Pending);
        assert_eq!(session.turns[0].events[0].event_type, "turn_seeded");
        assert_eq!(
            session.turns[0].creative_nudge.as_deref(),
            Some("Action word in present tense, something happening right now. Example: sprint.")
        );

        assert_eq!(session.participants.len(), 2);
        assert_eq!(session.participants[0].role, ParticipantRole::Host);
        assert_eq!(session.participants[0].status, ParticipantStatus::Accepted);
        assert_eq!(session.participants[1].user_id, "p1");
        assert_eq!(session.participants[1].status, ParticipantStatus::Invited);

        assert_eq!(fx.ledger.balance("host-1", Currency::Mythacoin).unwrap(), 10);
        assert!(session_events(&mut rx).contains(&"session_created".to_string()));
    }

    #[test]
    fn test_title_defaults_from_genre() {
        assert_eq!(title_for(None, Some("heist")), "Heist Party");
        assert_eq!(title_for(Some("  "), Some("sci-fi")), "Sci-fi Party");
        assert_eq!(title_for(Some("Night Shift"), Some("heist")), "Night Shift");
        assert_eq!(title_for(None, None), "Angry Lips Session");
    }

    #[test]
    fn test_custom_source_requires_seed() {
        let fx = fixture();
        let err = fx
            .repo
            .create_session(
                "host-1",
                &NewSession {
                    template_source: Some("custom".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_respond_to_invitation() {
        let fx = fixture();
        let session = create(&fx, &["p1"]);
        let id = &session.session.id;

        let err = fx.repo.respond_to_invitation(id, "p1", "maybe").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(fx.repo.respond_to_invitation(id, "stranger", "accept").unwrap().is_none());

        let accepted = fx.repo.respond_to_invitation(id, "p1", "accept").unwrap().unwrap();
        assert_eq!(accepted.status, ParticipantStatus::Accepted);
        fx.repo.respond_to_invitation(id, "p1", "accept").unwrap();
        assert_eq!(fx.ledger.balance("p1", Currency::Mythacoin).unwrap(), 5);

        let left = fx.repo.respond_to_invitation(id, "p1", "leave").unwrap().unwrap();
        assert_eq!(left.status, ParticipantStatus::Left);
    }

    #[test]
    fn test_rejoining_does_not_pay_accept_reward_again() {
        let fx = fixture();
        let session = create(&fx, &["p1"]);
        let id = &session.session.id;

        for _ in 0..5 {
            fx.repo.respond_to_invitation(id, "p1", "accept").unwrap();
            fx.repo.respond_to_invitation(id, "p1", "leave").unwrap();
        }
        let rejoined = fx.repo.respond_to_invitation(id, "p1", "accept").unwrap().unwrap();

        assert_eq!(rejoined.status, ParticipantStatus::Accepted);
        assert_eq!(fx.ledger.balance("p1", Currency::Mythacoin).unwrap(), 5);
    }

    #[test]
    fn test_invite_is_host_only() {
        let fx = fixture();
        let session = create(&fx, &[]);
        let id = &session.session.id;

        let err = fx
            .repo
            .invite_participants(id, "p1", &["p2".to_string()])
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let participants = fx
            .repo
            .invite_participants(id, "host-1", &["p2".into(), "p3".into(), "p2".into()])
            .unwrap();
        assert_eq!(participants.len(), 3);
    }

    #[test]
    fn test_start_assigns_round_robin_and_opens_first_turn() {
        let fx = fixture();
        let mut rx = fx.hub.subscribe_broadcast();
        let session = started(&fx);

        assert_eq!(session.session.status, SessionStatus::Active);
        assert!(session.session.started_at.is_some());
        assert_eq!(session.turns[0].assigned_user_id.as_deref(), Some("host-1"));
        assert_eq!(session.turns[0].assigned_handle.as_deref(), Some("@host-1"));
        assert_eq!(session.turns[1].assigned_user_id.as_deref(), Some("player-1"));
        assert_eq!(session.turns[2].assigned_user_id.as_deref(), Some("host-1"));

        let first = &session.turns[0];
        let window = first.expires_at.unwrap() - first.due_at.unwrap();
        assert_eq!(window, Duration::minutes(5));
        assert!(session.turns[1].due_at.is_none());
        assert!(session_events(&mut rx).contains(&"session_started".to_string()));

        let again = fx.repo.start_session(&session.session.id, "host-1").unwrap();
        assert_eq!(again.session.started_at, session.session.started_at);
    }

    #[test]
    fn test_start_counts_only_active_participants() {
        let fx = fixture();
        let session = create(&fx, &["p1"]);
        let started = fx.repo.start_session(&session.session.id, "host-1").unwrap();
        assert!(started
            .turns
            .iter()
            .all(|t| t.assigned_user_id.as_deref() == Some("host-1")));
    }

    #[test]
    fn test_submit_rules() {
        let fx = fixture();
        let session = started(&fx);
        let first = &session.turns[0];
        let second = &session.turns[1];

        let err = fx.repo.submit_turn(&first.id, "host-1", "   ", None).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let err = fx.repo.submit_turn(&second.id, "host-1", "jump", None).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let turn = fx.repo.submit_turn(&first.id, "host-1", " sprint ", None).unwrap();
        assert_eq!(turn.status, TurnStatus::Submitted);
        assert_eq!(turn.submitted_text.as_deref(), Some("sprint"));
        assert_eq!(turn.submission_handle.as_deref(), Some("@host-1"));
        assert_eq!(turn.completed_by.as_deref(), Some("player"));

        let err = fx.repo.submit_turn(&first.id, "host-1", "again", None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let missing = fx.repo.submit_turn("nope", "host-1", "x", None).unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[test]
    fn test_advance_skips_pending_and_completes() {
        let fx = fixture();
        let session = started(&fx);
        let id = session.session.id.clone();

        let err = fx.repo.advance_turn(&id, Actor::User("player-1"), None).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let after = fx.repo.advance_turn(&id, Actor::User("host-1"), None).unwrap();
        assert_eq!(after.turns[0].status, TurnStatus::Skipped);
        assert!(after.turns[0].due_at.is_none());
        assert!(after.turns[1].due_at.is_some());

        fx.repo.submit_turn(&after.turns[1].id, "player-1", "hid", None).unwrap();
        let after = fx.repo.advance_turn(&id, Actor::System, None).unwrap();
        assert_eq!(after.turns[1].status, TurnStatus::Submitted);
        assert!(after.turns[2].due_at.is_some());

        let mut rx = fx.hub.subscribe_broadcast();
        let mut current = after;
        while current.session.status == SessionStatus::Active {
            current = fx.repo.advance_turn(&id, Actor::System, None).unwrap();
        }
        assert!(current.session.completed_at.is_some());
        assert!(session_events(&mut rx).contains(&"session_completed".to_string()));
    }

    #[tokio::test]
    async fn test_system_advance_is_noop_after_host_moved_on() {
        let fx = fixture();
        let session = started(&fx);
        let id = session.session.id.clone();
        let first = session.turns[0].id.clone();

        fx.repo
            .auto_fill_turn(&first, Actor::System, None, Some("ai"))
            .await
            .unwrap();
        let after_host = fx.repo.advance_turn(&id, Actor::User("host-1"), None).unwrap();
        assert!(after_host.turns[1].due_at.is_some());

        let after_system = fx
            .repo
            .advance_turn(&id, Actor::System, Some(&first))
            .unwrap();
        let statuses: Vec<TurnStatus> = after_system.turns.iter().take(3).map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![TurnStatus::AutoFilled, TurnStatus::Pending, TurnStatus::Pending]
        );
        assert_eq!(after_system.turns[1].due_at, after_host.turns[1].due_at);
        assert!(after_system.turns[2].due_at.is_none());
    }

    #[tokio::test]
    async fn test_system_advance_closes_expected_turn() {
        let fx = fixture();
        let session = started(&fx);
        let id = session.session.id.clone();
        let first = session.turns[0].id.clone();

        fx.repo
            .auto_fill_turn(&first, Actor::System, None, Some("ai"))
            .await
            .unwrap();
        let after = fx
            .repo
            .advance_turn(&id, Actor::System, Some(&first))
            .unwrap();

        assert_eq!(after.turns[0].status, TurnStatus::AutoFilled);
        assert!(after.turns[0].due_at.is_none());
        assert!(after.turns[1].due_at.is_some());
    }

    #[tokio::test]
    async fn test_auto_fill_uses_narrator_and_rejects_finished_turns() {
        let fx = fixture();
        let session = started(&fx);
        let first = &session.turns[0];

        let err = fx
            .repo
            .auto_fill_turn(&first.id, Actor::User("stranger"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let turn = fx
            .repo
            .auto_fill_turn(&first.id, Actor::System, None, None)
            .await
            .unwrap();
        assert_eq!(turn.status, TurnStatus::AutoFilled);
        assert!(turn.auto_filled);
        assert_eq!(turn.completed_by.as_deref(), Some("ai"));
        assert_eq!(turn.submission_handle.as_deref(), Some("ai"));
        assert!(!turn.auto_fill_text.unwrap_or_default().is_empty());

        let err = fx
            .repo
            .auto_fill_turn(&first.id, Actor::System, Some("late"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let detail = fx.repo.get_session(&session.session.id).unwrap().unwrap();
        let kinds: Vec<&str> = detail.turns[0].events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["turn_seeded", "auto_filled"]);
    }

    #[test]
    fn test_log_turn_event() {
        let fx = fixture();
        let session = create(&fx, &[]);
        let turn_id = &session.turns[3].id;

        let event = fx
            .repo
            .log_turn_event(turn_id, "reaction", json!({ "emoji": "🔥" }))
            .unwrap();
        assert_eq!(event.session_id, session.session.id);
        assert_eq!(event.payload["emoji"], "🔥");

        let err = fx.repo.log_turn_event("missing", "reaction", Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_build_story_and_complete() {
        let fx = fixture();
        let session = started(&fx);
        let id = &session.session.id;
        fx.repo.submit_turn(&session.turns[0].id, "host-1", "moonwalk", None).unwrap();

        let story = fx.repo.build_session_story(id).unwrap();
        assert!(story.contains("moonwalk"));
        assert!(story.contains("person name"));
        assert!(!story.contains("[["));

        let err = fx
            .repo
            .complete_session(id, Actor::User("player-1"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let entry = fx
            .repo
            .complete_session(id, Actor::User("host-1"), None, Some("Moon Heist"), None)
            .unwrap();
        assert_eq!(entry.title, "Moon Heist");
        assert_eq!(entry.story_text, story);
        assert_eq!(entry.visibility, Visibility::InviteOnly);

        let again = fx
            .repo
            .complete_session(id, Actor::User("host-1"), Some("Rewritten."), None, Some(Visibility::Private))
            .unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(again.title, "Moon Heist");
        assert_eq!(again.story_text, "Rewritten.");

        let detail = fx.repo.get_session(id).unwrap().unwrap();
        assert_eq!(detail.session.status, SessionStatus::Completed);
        assert_eq!(detail.session.vault_mode, Visibility::Private);
    }

    #[tokio::test]
    async fn test_summarize_access_and_theme() {
        let fx = fixture();
        let session = create(&fx, &["invited"]);
        let id = &session.session.id;

        let err = fx.repo.summarize_session(id, "stranger", None).await.unwrap_err();
        assert_eq!(err.to_string(), "You are not part of this Angry Lips session.");
        let err = fx.repo.summarize_session(id, "invited", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "You need to accept the invitation before running this action."
        );

        let (entry, summary) = fx
            .repo
            .summarize_session(id, "host-1", Some("friendship"))
            .await
            .unwrap();
        assert!(!summary.is_empty());
        assert_eq!(entry.summary_text.as_deref(), Some(summary.as_str()));
        assert_eq!(entry.theme_prompt.as_deref(), Some("friendship"));

        let (entry, story) = fx
            .repo
            .generate_ai_story(id, "host-1", Some("a space opera"))
            .await
            .unwrap();
        assert_eq!(entry.ai_story_text.as_deref(), Some(story.as_str()));
        assert_eq!(entry.theme_prompt.as_deref(), Some("a space opera"));
    }

    #[test]
    fn test_publish_posts_once_and_lists_public_entries() {
        let fx = fixture();
        let session = create(&fx, &[]);
        let id = &session.session.id;

        let err = fx.repo.publish_vault_entry(id, "host-1", None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        fx.repo
            .complete_session(id, Actor::User("host-1"), Some("The end."), None, None)
            .unwrap();
        let published = fx.repo.publish_vault_entry(id, "host-1", None).unwrap();
        assert_eq!(published.visibility, Visibility::Public);
        let first_published_at = published.published_at.unwrap();
        assert_eq!(published.published_by.as_deref(), Some("host-1"));

        let again = fx.repo.publish_vault_entry(id, "host-1", Some(Visibility::Public)).unwrap();
        assert_eq!(again.published_at, Some(first_published_at));

        let posts = fx
            .feed
            .list_feed(&FeedQuery {
                event_types: vec!["angry_lips_published".into()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, "The end.");

        let listed = fx.repo.list_published_entries(None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_title, "Heist Party");
        assert_eq!(listed[0].host_id, "host-1");

        let hidden = fx.repo.publish_vault_entry(id, "host-1", Some(Visibility::Private)).unwrap();
        assert!(hidden.published_at.is_none());
        assert!(fx.repo.list_published_entries(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_sessions_filters() {
        let fx = fixture();
        let first = create(&fx, &["p1"]);
        create(&fx, &[]);

        let all = fx.repo.list_sessions(&SessionFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].turns.is_empty());

        let mine = fx
            .repo
            .list_sessions(&SessionFilter {
                user_id: Some("p1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].session.id, first.session.id);

        let active = fx
            .repo
            .list_sessions(&SessionFilter {
                status: Some(SessionStatus::Active),
                ..Default::default()
            })
            .unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn test_due_turns_and_notified_channels() {
        let fx = fixture();
        let session = started(&fx);
        let due = fx.repo.due_turns(50).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.id, session.turns[0].id);
        assert_eq!(due[0].0.id, session.session.id);

        let merged = fx
            .repo
            .record_notified(&session.turns[0].id, &["web".into(), "warning".into()])
            .unwrap();
        let merged_again = fx.repo.record_notified(&session.turns[0].id, &["web".into()]).unwrap();
        assert_eq!(merged, merged_again);
    }
}
