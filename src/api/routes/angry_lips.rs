//! Angry Lips Routes
//!
//! - GET /api/angry-lips/templates - Prebuilt template catalog
//! - GET /api/angry-lips/templates/:id - One prebuilt template
//! - POST /api/angry-lips/templates/generate - Generate a template
//! - POST /api/angry-lips/sessions - Create a session
//! - GET /api/angry-lips/sessions - List sessions
//! - GET /api/angry-lips/sessions/:id - Session with participants and turns
//! - POST /api/angry-lips/sessions/:id/{invite,respond,start,advance,complete}
//! - POST /api/angry-lips/sessions/:id/{summarize,ai-story,publish}
//! - GET /api/angry-lips/sessions/:id/story - Assembled story text
//! - POST /api/angry-lips/turns/:id/{submit,auto-fill,events}
//! - GET /api/angry-lips/vault/published - Public vault entries
//! - GET /api/angry-lips/realtime/token - Token for the `/ws` socket

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::angry_lips::template::{
    generate_template, prebuilt_template, prebuilt_templates, GeneratedTemplate,
    PrebuiltTemplate, TemplateLength, TemplateOptions, TemplateSource,
};
use crate::angry_lips::{
    Actor, CreatedSession, NewSession, Participant, PublishedEntry, SessionDetail,
    SessionFilter, SessionStatus,
};
use crate::api::dto::{
    AiStoryRequest, AutoFillRequest, CompleteSessionRequest, GenerateTemplateRequest,
    InviteRequest, Items, PageParams, PublishRequest, RealtimeTokenParams,
    RealtimeTokenResponse, RespondRequest, SessionListParams, SubmitTurnRequest,
    SummarizeRequest, TemplateCatalogParams, TurnEventRequest,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::{AuthUser, REALTIME_SCOPE};
use crate::realtime::{user_topic, FEED_TOPIC};

// ============================================
// TEMPLATES
// ============================================

/// GET /api/angry-lips/templates
pub async fn list_templates(
    Query(params): Query<TemplateCatalogParams>,
) -> Json<Items<PrebuiltTemplate>> {
    Json(prebuilt_templates(params.difficulty, params.age).into())
}

/// GET /api/angry-lips/templates/:id
pub async fn get_template(Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let template =
        prebuilt_template(&id).ok_or_else(|| ApiError::not_found("Template not found"))?;
    Ok(Json(json!({ "template": template })))
}

/// POST /api/angry-lips/templates/generate
///
/// Preview a generated template without creating a session.
pub async fn generate(
    Json(req): Json<GenerateTemplateRequest>,
) -> ApiResult<Json<GeneratedTemplate>> {
    let source = TemplateSource::normalize(req.template_source.as_deref());
    let seed_text = req
        .seed_text
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if source == TemplateSource::Custom && seed_text.is_none() {
        return Err(ApiError::validation("Custom templates need seed text."));
    }

    Ok(Json(generate_template(&TemplateOptions {
        genre: req.genre,
        source,
        length: TemplateLength::normalize(req.template_length.as_deref()),
        seed_text,
    })))
}

// ============================================
// SESSIONS
// ============================================

/// POST /api/angry-lips/sessions
///
/// The caller becomes the host.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<CreatedSession>)> {
    let created = state.sessions.create_session(&user.user_id, &req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/angry-lips/sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SessionListParams>,
) -> ApiResult<Json<Items<SessionDetail>>> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            SessionStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("Unknown session status: {raw}")))?,
        ),
        None => None,
    };

    let filter = SessionFilter {
        status,
        user_id: params.mine.then(|| user.user_id.clone()),
        limit: params.limit,
    };
    Ok(Json(state.sessions.list_sessions(&filter)?.into()))
}

/// GET /api/angry-lips/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state
        .sessions
        .get_session(&id)?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    Ok(Json(json!({ "session": session })))
}

/// GET /api/angry-lips/sessions/:id/participants
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Items<Participant>>> {
    Ok(Json(state.sessions.list_participants(&id)?.into()))
}

/// POST /api/angry-lips/sessions/:id/invite
pub async fn invite(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Json<Items<Participant>>> {
    let participants = state
        .sessions
        .invite_participants(&id, &user.user_id, &req.participant_ids)?;
    Ok(Json(participants.into()))
}

/// POST /api/angry-lips/sessions/:id/respond
///
/// Accept, decline or leave an invitation.
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Value>> {
    let participant = state
        .sessions
        .respond_to_invitation(&id, &user.user_id, &req.action)?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;
    Ok(Json(json!({ "participant": participant })))
}

/// POST /api/angry-lips/sessions/:id/start
pub async fn start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.start_session(&id, &user.user_id)?;
    Ok(Json(json!({ "session": session })))
}

/// POST /api/angry-lips/sessions/:id/advance
pub async fn advance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state
        .sessions
        .advance_turn(&id, Actor::User(&user.user_id), None)?;
    Ok(Json(json!({ "session": session })))
}

/// POST /api/angry-lips/sessions/:id/complete
///
/// Archive the story in the vault.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<CompleteSessionRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let entry = state.sessions.complete_session(
        &id,
        Actor::User(&user.user_id),
        req.story_text.as_deref(),
        req.title.as_deref(),
        req.visibility,
    )?;
    Ok(Json(json!({ "entry": entry })))
}

/// POST /api/angry-lips/sessions/:id/summarize
pub async fn summarize(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<SummarizeRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let (entry, summary) = state
        .sessions
        .summarize_session(&id, &user.user_id, req.focus.as_deref())
        .await?;
    Ok(Json(json!({ "entry": entry, "summary": summary })))
}

/// POST /api/angry-lips/sessions/:id/ai-story
///
/// Host only. The AI co-host retells the finished story.
pub async fn ai_story(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<AiStoryRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let (entry, story) = state
        .sessions
        .generate_ai_story(&id, &user.user_id, req.prompt.as_deref())
        .await?;
    Ok(Json(json!({ "entry": entry, "story": story })))
}

/// POST /api/angry-lips/sessions/:id/publish
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<PublishRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let entry = state
        .sessions
        .publish_vault_entry(&id, &user.user_id, req.visibility)?;
    Ok(Json(json!({ "entry": entry })))
}

/// GET /api/angry-lips/sessions/:id/story
pub async fn story(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let story = state.sessions.build_session_story(&id)?;
    Ok(Json(json!({ "story": story })))
}

// ============================================
// TURNS
// ============================================

/// POST /api/angry-lips/turns/:id/submit
pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<SubmitTurnRequest>,
) -> ApiResult<Json<Value>> {
    let turn = state
        .sessions
        .submit_turn(&id, &user.user_id, &req.text, req.handle.as_deref())?;
    Ok(Json(json!({ "turn": turn })))
}

/// POST /api/angry-lips/turns/:id/auto-fill
///
/// Without `text` the AI co-host picks the word.
pub async fn auto_fill_turn(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<AutoFillRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let turn = state
        .sessions
        .auto_fill_turn(
            &id,
            Actor::User(&user.user_id),
            req.text.as_deref(),
            req.handle.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "turn": turn })))
}

/// POST /api/angry-lips/turns/:id/events
pub async fn log_turn_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TurnEventRequest>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .log_turn_event(&id, &req.event_type, req.payload)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================
// VAULT & REALTIME
// ============================================

/// GET /api/angry-lips/vault/published
pub async fn list_published(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Items<PublishedEntry>>> {
    let entries = state
        .sessions
        .list_published_entries(page.limit, page.offset)?;
    Ok(Json(entries.into()))
}

/// GET /api/angry-lips/realtime/token
///
/// Mint a short-lived token for the realtime socket.
pub async fn realtime_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<RealtimeTokenParams>,
) -> ApiResult<Json<RealtimeTokenResponse>> {
    if !state.config.realtime.enabled {
        return Err(ApiError::ServiceUnavailable(
            "Realtime is disabled".to_string(),
        ));
    }

    let (token, expires_at) = state.auth.issue_scoped(
        &user,
        state.config.realtime.token_ttl_secs,
        Some(REALTIME_SCOPE),
    )?;

    Ok(Json(RealtimeTokenResponse {
        token,
        client_id: params
            .client_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| user.user_id.clone()),
        expires_at,
        topics: vec![user_topic(&user.user_id), FEED_TOPIC.to_string()],
    }))
}
