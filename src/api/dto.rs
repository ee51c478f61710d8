//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! Domain records serialize themselves; the types here are the envelopes
//! and request bodies that only exist at the HTTP boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::angry_lips::Visibility;
use crate::ledger::{BillingCycle, ReferralReward};

// ============================================
// ENVELOPES
// ============================================

/// List responses: `{ "items": [...] }`
#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// Paging shared by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================
// ANGRY LIPS DTOs
// ============================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTemplateRequest {
    pub genre: Option<String>,
    pub template_source: Option<String>,
    pub template_length: Option<String>,
    pub seed_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateCatalogParams {
    pub difficulty: Option<crate::angry_lips::template::Difficulty>,
    pub age: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionListParams {
    pub status: Option<String>,
    /// Only sessions the caller hosts or was invited to
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    #[serde(default)]
    pub text: String,
    pub handle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutoFillRequest {
    pub text: Option<String>,
    pub handle: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    pub story_text: Option<String>,
    pub title: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarizeRequest {
    pub focus: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AiStoryRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeTokenParams {
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeTokenResponse {
    pub token: String,
    pub client_id: String,
    /// Unix seconds
    pub expires_at: usize,
    pub topics: Vec<String>,
}

// ============================================
// LEDGER DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub currency: &'static str,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseSparksRequest {
    pub amount: i64,
    pub feature: String,
    pub reference_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseSparksResponse {
    pub success: bool,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBonusResponse {
    pub sparks_added: i64,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub package_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub tier_id: String,
    pub billing_cycle: BillingCycle,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    #[serde(default = "default_true")]
    pub at_period_end: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRequest {
    pub referrer_id: String,
    pub reward_type: ReferralReward,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_user_id: String,
    pub amount: i64,
    pub note: Option<String>,
}

// ============================================
// SOCIAL & FEED DTOs
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestBody {
    pub target_id: String,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListParams {
    #[serde(default)]
    pub direction: crate::social::RequestDirection,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RespondToRequestBody {
    pub action: crate::social::RequestAction,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    pub sort: Option<String>,
    pub search: Option<String>,
    /// Comma separated event types
    pub event_types: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub body: String,
    pub title: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub body: String,
}

// ============================================
// FIELD DTOs
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub status: Option<crate::field::switching::OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: crate::field::switching::OrderStatus,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Database status
    pub storage: String,
    /// Open realtime connections
    pub realtime_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}
