//! Social Routes
//!
//! - GET /api/social/profile - Caller's profile
//! - PUT /api/social/profile - Create or update the caller's profile
//! - GET /api/social/profiles/:username - Lookup by username
//! - GET /api/social/bookworms?limit - Caller's connections
//! - DELETE /api/social/bookworms/:friendId - Remove a connection
//! - GET /api/social/requests?direction&limit - Pending requests
//! - POST /api/social/requests - Send a request
//! - POST /api/social/requests/:id/respond - Accept, decline or cancel
//! - GET /api/social/stats - Connection counts

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{
    ConnectionRequestBody, Items, PageParams, RequestListParams, RespondToRequestBody,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::AuthUser;
use crate::social::{Bookworm, ConnectionRequest, ConnectionStats, ProfileUpdate};

/// GET /api/social/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let profile = state.social.get_profile(&user.user_id)?;
    Ok(Json(json!({ "profile": profile })))
}

/// PUT /api/social/profile
pub async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Value>> {
    let profile = state.social.upsert_profile(&user.user_id, &update)?;
    Ok(Json(json!({ "profile": profile })))
}

/// GET /api/social/profiles/:username
pub async fn lookup_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<Json<Value>> {
    let profile = state
        .social
        .lookup_profile_by_username(&username)?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(json!({ "profile": profile })))
}

/// GET /api/social/bookworms
pub async fn list_bookworms(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Items<Bookworm>>> {
    Ok(Json(
        state.social.list_bookworms(&user.user_id, page.limit)?.into(),
    ))
}

/// DELETE /api/social/bookworms/:friendId
pub async fn remove_bookworm(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(friend_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.social.remove_bookworm(&user.user_id, &friend_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/social/requests
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<RequestListParams>,
) -> ApiResult<Json<Items<ConnectionRequest>>> {
    let requests =
        state
            .social
            .list_connection_requests(&user.user_id, params.direction, params.limit)?;
    Ok(Json(requests.into()))
}

/// POST /api/social/requests
///
/// A request to someone who already invited the caller accepts theirs.
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ConnectionRequestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = state.social.create_connection_request(
        &user.user_id,
        &req.target_id,
        req.message.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(json!({ "request": request }))))
}

/// POST /api/social/requests/:id/respond
pub async fn respond_to_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<RespondToRequestBody>,
) -> ApiResult<Json<Value>> {
    let request = state
        .social
        .respond_to_request(&id, &user.user_id, req.action)?
        .ok_or_else(|| ApiError::not_found("Connection request not found"))?;
    Ok(Json(json!({ "request": request })))
}

/// GET /api/social/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ConnectionStats>> {
    Ok(Json(state.social.connection_stats(&user.user_id)?))
}
