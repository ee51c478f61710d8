//! Arc Flash Routes
//!
//! - POST /api/field/arc-flash/calculate - Stateless calculation
//! - POST /api/field/arc-flash - Save an equipment study
//! - GET /api/field/arc-flash - List studies
//! - GET /api/field/arc-flash/:id - One study

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::Items;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::field::arc_flash::{calculate as run_calculation, ArcFlashStudy, NewStudy};
use crate::field::{ArcFlashInputs, ArcFlashResult, FieldScope};

/// POST /api/field/arc-flash/calculate
pub async fn calculate(Json(inputs): Json<ArcFlashInputs>) -> ApiResult<Json<ArcFlashResult>> {
    Ok(Json(run_calculation(&inputs)?))
}

/// POST /api/field/arc-flash
pub async fn save_study(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Json(input): Json<NewStudy>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let study = state.arc_flash.save_study(&scope, &input)?;
    Ok((StatusCode::CREATED, Json(json!({ "study": study }))))
}

/// GET /api/field/arc-flash
pub async fn list_studies(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
) -> ApiResult<Json<Items<ArcFlashStudy>>> {
    Ok(Json(state.arc_flash.list_studies(&scope)?.into()))
}

/// GET /api/field/arc-flash/:id
pub async fn get_study(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let study = state.arc_flash.get_study(&scope, &id)?;
    Ok(Json(json!({ "study": study })))
}
