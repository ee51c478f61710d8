//! Feed Routes
//!
//! - GET /api/feed?sort&search&eventTypes&limit&offset
//! - POST /api/feed/posts
//! - GET /api/feed/posts/:id
//! - PUT|DELETE /api/feed/posts/:id/like
//! - PUT|DELETE /api/feed/posts/:id/repost
//! - GET /api/feed/posts/:id/comments
//! - POST /api/feed/posts/:id/comments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{CreateCommentRequest, CreatePostRequest, FeedParams, Items, PageParams};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::auth::AuthUser;
use crate::feed::{FeedCard, FeedComment, FeedQuery, FeedSort, LikeState, RepostState};

/// GET /api/feed
pub async fn list_feed(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<Items<FeedCard>>> {
    let event_types = params
        .event_types
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let query = FeedQuery {
        viewer_id: Some(user.user_id),
        sort: FeedSort::parse(params.sort.as_deref()),
        search: params.search,
        event_types,
        limit: params.limit,
        offset: params.offset,
    };
    Ok(Json(state.feed.list_feed(&query)?.into()))
}

/// POST /api/feed/posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let post = state.feed.create_post(
        &user.user_id,
        &req.body,
        req.title.as_deref(),
        req.metadata,
    )?;
    Ok((StatusCode::CREATED, Json(json!({ "post": post }))))
}

/// GET /api/feed/posts/:id
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let post = state.feed.get_card(&id, Some(&user.user_id))?;
    Ok(Json(json!({ "post": post })))
}

/// PUT /api/feed/posts/:id/like
pub async fn like(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeState>> {
    Ok(Json(state.feed.set_like(&id, &user.user_id, true)?))
}

/// DELETE /api/feed/posts/:id/like
pub async fn unlike(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeState>> {
    Ok(Json(state.feed.set_like(&id, &user.user_id, false)?))
}

/// PUT /api/feed/posts/:id/repost
pub async fn repost(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<RepostState>> {
    Ok(Json(state.feed.set_repost(&id, &user.user_id, true)?))
}

/// DELETE /api/feed/posts/:id/repost
pub async fn unrepost(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<RepostState>> {
    Ok(Json(state.feed.set_repost(&id, &user.user_id, false)?))
}

/// GET /api/feed/posts/:id/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Items<FeedComment>>> {
    let comments = state.feed.list_comments(&id, page.limit, page.offset)?;
    Ok(Json(comments.into()))
}

/// POST /api/feed/posts/:id/comments
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let comment = state.feed.create_comment(&id, &user.user_id, &req.body)?;
    Ok((StatusCode::CREATED, Json(json!({ "comment": comment }))))
}
