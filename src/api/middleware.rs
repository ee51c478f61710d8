//! Request authentication layers
//!
//! `require_auth` verifies the bearer token and stores the caller in the
//! request extensions; `require_company` additionally demands a company
//! claim and stores the resulting [`FieldScope`].

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::{bearer_token, AuthUser};
use crate::field::FieldScope;

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = bearer_token(header)?;
    let user = state.auth.verify(token)?;

    tracing::debug!(user_id = %user.user_id, "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Runs after `require_auth`
pub async fn require_company(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let scope = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
        .clone();
    let scope = FieldScope::from_user(&scope)
        .ok_or_else(|| ApiError::forbidden("Company membership required"))?;

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}
