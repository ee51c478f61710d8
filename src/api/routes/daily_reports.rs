//! Daily Report Routes
//!
//! - GET /api/field/daily-reports?start_date&end_date&status
//! - POST /api/field/daily-reports
//! - GET /api/field/daily-reports/summary?start_date&end_date
//! - GET /api/field/daily-reports/:id
//! - PUT /api/field/daily-reports/:id
//! - DELETE /api/field/daily-reports/:id
//! - POST /api/field/daily-reports/:id/submit

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{Items, SummaryParams};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::field::daily_reports::{
    DailyReport, DailyReportUpdate, NewDailyReport, ProductionSummary, ReportFilter,
};
use crate::field::FieldScope;

/// GET /api/field/daily-reports
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Query(filter): Query<ReportFilter>,
) -> ApiResult<Json<Items<DailyReport>>> {
    Ok(Json(state.daily_reports.list(&scope, &filter)?.into()))
}

/// POST /api/field/daily-reports
///
/// Saved as a draft unless `submit` is set.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Json(input): Json<NewDailyReport>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let report = state.daily_reports.create(&scope, &input)?;
    Ok((StatusCode::CREATED, Json(json!({ "report": report }))))
}

/// GET /api/field/daily-reports/summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Query(params): Query<SummaryParams>,
) -> ApiResult<Json<ProductionSummary>> {
    let summary =
        state
            .daily_reports
            .production_summary(&scope, params.start_date, params.end_date)?;
    Ok(Json(summary))
}

/// GET /api/field/daily-reports/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = state.daily_reports.get(&scope, &id)?;
    Ok(Json(json!({ "report": report })))
}

/// PUT /api/field/daily-reports/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
    Json(update): Json<DailyReportUpdate>,
) -> ApiResult<Json<Value>> {
    let report = state.daily_reports.update(&scope, &id, &update)?;
    Ok(Json(json!({ "report": report })))
}

/// POST /api/field/daily-reports/:id/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = state.daily_reports.submit(&scope, &id)?;
    Ok(Json(json!({ "report": report })))
}

/// DELETE /api/field/daily-reports/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.daily_reports.delete(&scope, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
