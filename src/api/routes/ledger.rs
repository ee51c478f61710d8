//! Currency Routes
//!
//! Sparks (premium currency):
//! - GET /api/sparks/balance
//! - GET /api/sparks/transactions?limit
//! - POST /api/sparks/use
//! - POST /api/sparks/daily-bonus
//! - GET /api/sparks/packages
//! - POST /api/sparks/purchase
//! - GET /api/sparks/tiers
//! - POST /api/sparks/subscribe
//! - GET /api/sparks/subscription
//! - POST /api/sparks/subscription/cancel
//! - POST /api/sparks/referrals
//! - GET /api/sparks/usage
//! - GET /api/sparks/user/:userId - Account summary (own account only)
//!
//! Mythacoin (earned currency):
//! - GET /api/mythacoin/balance
//! - GET /api/mythacoin/transactions?limit
//! - POST /api/mythacoin/transfer

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::dto::{
    BalanceResponse, CancelSubscriptionRequest, DailyBonusResponse, Items, PageParams,
    PurchaseRequest, ReferralRequest, SubscribeRequest, TransferRequest, UseSparksRequest,
    UseSparksResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::AuthUser;
use crate::ledger::{
    AccountSummary, Currency, LedgerTransaction, PurchaseOutcome, SparksPackage,
    SubscriptionOutcome, SubscriptionTier, UsageStat,
};

fn balance_of(state: &AppState, user: &AuthUser, currency: Currency) -> ApiResult<BalanceResponse> {
    Ok(BalanceResponse {
        currency: currency.as_str(),
        balance: state.ledger.balance(&user.user_id, currency)?,
    })
}

// ============================================
// SPARKS
// ============================================

/// GET /api/sparks/balance
pub async fn sparks_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<BalanceResponse>> {
    Ok(Json(balance_of(&state, &user, Currency::Sparks)?))
}

/// GET /api/sparks/transactions
pub async fn sparks_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Items<LedgerTransaction>>> {
    let txs = state
        .ledger
        .list_transactions(&user.user_id, Some(Currency::Sparks), page.limit)?;
    Ok(Json(txs.into()))
}

/// POST /api/sparks/use
///
/// Spend Sparks on a feature. `success` is false when the balance is short.
pub async fn use_sparks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UseSparksRequest>,
) -> ApiResult<Json<UseSparksResponse>> {
    let success = state.ledger.use_sparks(
        &user.user_id,
        req.amount,
        &req.feature,
        req.reference_id.as_deref(),
    )?;
    let balance = state.ledger.balance(&user.user_id, Currency::Sparks)?;
    Ok(Json(UseSparksResponse { success, balance }))
}

/// POST /api/sparks/daily-bonus
pub async fn daily_bonus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<DailyBonusResponse>> {
    let sparks_added = state.ledger.claim_daily_bonus(&user.user_id)?;
    if sparks_added == 0 {
        return Err(ApiError::validation("Daily bonus already claimed"));
    }
    let balance = state.ledger.balance(&user.user_id, Currency::Sparks)?;
    Ok(Json(DailyBonusResponse {
        sparks_added,
        balance,
    }))
}

/// GET /api/sparks/packages
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Items<SparksPackage>>> {
    Ok(Json(state.ledger.list_packages()?.into()))
}

/// POST /api/sparks/purchase
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Json<PurchaseOutcome>> {
    let outcome = state.ledger.purchase_package(&user.user_id, &req.package_id)?;
    Ok(Json(outcome))
}

/// GET /api/sparks/tiers
pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Items<SubscriptionTier>>> {
    Ok(Json(state.ledger.list_tiers()?.into()))
}

/// POST /api/sparks/subscribe
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<SubscriptionOutcome>> {
    let outcome = state
        .ledger
        .subscribe(&user.user_id, &req.tier_id, req.billing_cycle)?;
    Ok(Json(outcome))
}

/// GET /api/sparks/subscription
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let subscription = state.ledger.subscription(&user.user_id)?;
    Ok(Json(json!({ "subscription": subscription })))
}

/// POST /api/sparks/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<CancelSubscriptionRequest>>,
) -> ApiResult<Json<Value>> {
    let at_period_end = body.map(|Json(b)| b.at_period_end).unwrap_or(true);
    let cancelled = state
        .ledger
        .cancel_subscription(&user.user_id, at_period_end)?;
    if !cancelled {
        return Err(ApiError::not_found("No active subscription"));
    }
    Ok(Json(json!({ "cancelled": true, "atPeriodEnd": at_period_end })))
}

/// POST /api/sparks/referrals
///
/// The caller is the referred user; the referrer earns the reward.
pub async fn record_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ReferralRequest>,
) -> ApiResult<Json<Value>> {
    let recorded = state
        .ledger
        .record_referral(&req.referrer_id, &user.user_id, req.reward_type)?;
    Ok(Json(json!({ "recorded": recorded })))
}

/// GET /api/sparks/usage
///
/// Spending over the last 30 days by feature and day.
pub async fn usage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Items<UsageStat>>> {
    Ok(Json(state.ledger.usage_stats(&user.user_id)?.into()))
}

/// GET /api/sparks/user/:userId
pub async fn account_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AccountSummary>> {
    if user_id != user.user_id {
        return Err(ApiError::forbidden("You can only view your own account"));
    }
    Ok(Json(state.ledger.account_summary(&user_id)?))
}

// ============================================
// MYTHACOIN
// ============================================

/// GET /api/mythacoin/balance
pub async fn mythacoin_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<BalanceResponse>> {
    Ok(Json(balance_of(&state, &user, Currency::Mythacoin)?))
}

/// GET /api/mythacoin/transactions
pub async fn mythacoin_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Items<LedgerTransaction>>> {
    let txs = state
        .ledger
        .list_transactions(&user.user_id, Some(Currency::Mythacoin), page.limit)?;
    Ok(Json(txs.into()))
}

/// POST /api/mythacoin/transfer
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<Value>> {
    let (debit, credit) = state.ledger.transfer(
        &user.user_id,
        &req.to_user_id,
        Currency::Mythacoin,
        req.amount,
        req.note.as_deref(),
    )?;

    tracing::info!(
        from = %user.user_id,
        to = %req.to_user_id,
        amount = req.amount,
        "Mythacoin transferred"
    );

    Ok(Json(json!({
        "debit": debit,
        "credit": credit,
        "balance": debit.balance_after,
    })))
}
