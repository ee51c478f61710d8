//! Receipt Routes
//!
//! All routes are scoped to the caller's company.
//!
//! - GET /api/field/receipts - List with filters
//! - POST /api/field/receipts - Create (image optional)
//! - POST /api/field/receipts/upload - Create from an image
//! - POST /api/field/receipts/scan - Parse OCR text
//! - GET /api/field/receipts/stats - Totals and monthly trend
//! - GET /api/field/receipts/export - CSV download
//! - GET /api/field/receipts/:id
//! - PUT /api/field/receipts/:id
//! - DELETE /api/field/receipts/:id
//! - GET /api/field/receipts/:id/image - Raw image bytes
//! - POST /api/field/receipts/:id/approve
//! - POST /api/field/receipts/:id/reject

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{ApproveRequest, Items, RejectRequest, ScanRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::field::receipt_scan::{scan_text, ScanResult};
use crate::field::receipts::{NewReceipt, Receipt, ReceiptFilter, ReceiptStats, ReceiptUpdate};
use crate::field::FieldScope;

/// GET /api/field/receipts
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Query(filter): Query<ReceiptFilter>,
) -> ApiResult<Json<Items<Receipt>>> {
    Ok(Json(state.receipts.list(&scope, &filter)?.into()))
}

/// POST /api/field/receipts
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Json(input): Json<NewReceipt>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let receipt = state.receipts.create(&scope, &input)?;
    Ok((StatusCode::CREATED, Json(json!({ "receipt": receipt }))))
}

/// POST /api/field/receipts/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Json(input): Json<NewReceipt>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let receipt = state.receipts.upload(&scope, &input)?;
    Ok((StatusCode::CREATED, Json(json!({ "receipt": receipt }))))
}

/// POST /api/field/receipts/scan
///
/// Extract vendor, amount, date and a cost code from recognized text.
pub async fn scan(Json(req): Json<ScanRequest>) -> Json<ScanResult> {
    Json(scan_text(&req.text))
}

/// GET /api/field/receipts/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
) -> ApiResult<Json<ReceiptStats>> {
    Ok(Json(state.receipts.stats(&scope)?))
}

/// GET /api/field/receipts/export
pub async fn export(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Query(filter): Query<ReceiptFilter>,
) -> ApiResult<impl IntoResponse> {
    let csv = state.receipts.export_csv(&scope, &filter)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"receipts.csv\"",
            ),
        ],
        csv,
    ))
}

/// GET /api/field/receipts/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let receipt = state.receipts.get(&scope, &id)?;
    Ok(Json(json!({ "receipt": receipt })))
}

/// GET /api/field/receipts/:id/image
pub async fn image(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let image = state.receipts.image(&scope, &id)?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes))
}

/// PUT /api/field/receipts/:id
///
/// Submitter only, while pending.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
    Json(update): Json<ReceiptUpdate>,
) -> ApiResult<Json<Value>> {
    let receipt = state.receipts.update(&scope, &id, &update)?;
    Ok(Json(json!({ "receipt": receipt })))
}

/// DELETE /api/field/receipts/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.receipts.delete(&scope, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/field/receipts/:id/approve
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> ApiResult<Json<Value>> {
    let notes = body.and_then(|Json(b)| b.notes);
    let receipt = state.receipts.approve(&scope, &id, notes.as_deref())?;
    Ok(Json(json!({ "receipt": receipt })))
}

/// POST /api/field/receipts/:id/reject
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<FieldScope>,
    Path(id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<Value>> {
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let receipt = state.receipts.reject(&scope, &id, &reason)?;
    Ok(Json(json!({ "receipt": receipt })))
}
