//! Switching Order Routes
//!
//! - GET /api/field/switching-orders?status
//! - POST /api/field/switching-orders
//! - GET /api/field/switching-orders/:id
//! - POST /api/field/switching-orders/:id/transition
//! - POST /api/field/switching-orders/:id/isolation-points/:index/verify
//! - POST /api/field/switching-orders/:id/grounds/:index/install
//! - POST /api/field/switching-orders/:id/grounds/:index/remove

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{Items, OrderListParams, TransitionRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::field::switching::{NewSwitchingOrder, SwitchingOrder};
use crate::field::FieldScope;

/// GET /api/field/switching-orders
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Query(params): Query<OrderListParams>,
) -> ApiResult<Json<Items<SwitchingOrder>>> {
    Ok(Json(state.switching.list(&scope, params.status)?.into()))
}

/// POST /api/field/switching-orders
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Json(input): Json<NewSwitchingOrder>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let order = state.switching.create(&scope, &input)?;
    Ok((StatusCode::CREATED, Json(json!({ "order": order }))))
}

/// GET /api/field/switching-orders/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let order = state.switching.get(&scope, &id)?;
    Ok(Json(json!({ "order": order })))
}

/// POST /api/field/switching-orders/:id/transition
pub async fn transition(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<Value>> {
    let order = state.switching.transition(&scope, &id, req.status)?;
    Ok(Json(json!({ "order": order })))
}

/// POST /api/field/switching-orders/:id/isolation-points/:index/verify
pub async fn verify_isolation_point(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<Value>> {
    let order = state.switching.verify_isolation_point(&scope, &id, index)?;
    Ok(Json(json!({ "order": order })))
}

/// POST /api/field/switching-orders/:id/grounds/:index/install
pub async fn install_ground(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<Value>> {
    let order = state.switching.install_ground(&scope, &id, index)?;
    Ok(Json(json!({ "order": order })))
}

/// POST /api/field/switching-orders/:id/grounds/:index/remove
pub async fn remove_ground(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<Value>> {
    let order = state.switching.remove_ground(&scope, &id, index)?;
    Ok(Json(json!({ "order": order })))
}
