//! Virtual Currency Ledger
//!
//! Two currencies share one double-entry-free ledger: every balance change
//! is an account update plus an append-only transaction row, written in the
//! same SQLite transaction.
//!
//! - **Mythacoin**: earned by playing (hosting Angry Lips, accepting invites)
//! - **Sparks**: premium currency bought in packages or via subscription

mod repository;

pub use repository::Ledger;
pub(crate) use repository::record_in;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sparks granted by the daily bonus
pub const DAILY_BONUS_SPARKS: i64 = 10;

/// Currency held in a ledger account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Mythacoin,
    Sparks,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Mythacoin => "mythacoin",
            Currency::Sparks => "sparks",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Currency::Mythacoin => "Mythacoin",
            Currency::Sparks => "Sparks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mythacoin" => Some(Currency::Mythacoin),
            "sparks" => Some(Currency::Sparks),
            _ => None,
        }
    }
}

/// A balance change to apply
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub user_id: String,
    pub currency: Currency,
    /// Positive credits, negative debits
    pub amount: i64,
    pub transaction_type: String,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    /// Feature that consumed the currency (usage stats)
    pub feature: Option<String>,
    pub metadata: Value,
}

impl TransactionRequest {
    pub fn credit(
        user_id: impl Into<String>,
        currency: Currency,
        amount: i64,
        transaction_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            currency,
            amount,
            transaction_type: transaction_type.into(),
            description: None,
            reference_id: None,
            feature: None,
            metadata: Value::Null,
        }
    }

    pub fn debit(
        user_id: impl Into<String>,
        currency: Currency,
        amount: i64,
        transaction_type: impl Into<String>,
    ) -> Self {
        Self::credit(user_id, currency, -amount, transaction_type)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    pub currency: Currency,
    pub amount: i64,
    pub balance_after: i64,
    pub transaction_type: String,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    pub feature: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SparksPackage {
    pub id: String,
    pub name: String,
    pub sparks_amount: i64,
    pub bonus_sparks: i64,
    pub total_sparks: i64,
    pub price_cents: i64,
    pub is_popular: bool,
    pub is_best_value: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTier {
    pub id: String,
    pub name: String,
    pub monthly_price_cents: i64,
    pub yearly_price_cents: i64,
    pub monthly_sparks: i64,
    pub benefits: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    fn period_months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Yearly => 12,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
    pub user_id: String,
    pub tier_id: String,
    pub status: String,
    pub billing_cycle: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOutcome {
    pub success: bool,
    pub purchase_id: String,
    pub new_balance: i64,
    pub sparks_added: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOutcome {
    pub success: bool,
    pub subscription: UserSubscription,
    pub monthly_sparks: i64,
    pub new_balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralReward {
    Signup,
    FirstAction,
}

impl ReferralReward {
    pub fn amount(&self) -> i64 {
        match self {
            ReferralReward::Signup => 25,
            ReferralReward::FirstAction => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralReward::Signup => "signup",
            ReferralReward::FirstAction => "first_action",
        }
    }
}

/// Sparks spent on one feature on one day
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStat {
    pub feature: String,
    pub date: NaiveDate,
    pub total_uses: i64,
    pub total_sparks_used: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub balance: i64,
    pub subscription: Option<UserSubscription>,
    pub recent_transactions: Vec<LedgerTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_round_trip_names() {
        for currency in [Currency::Mythacoin, Currency::Sparks] {
            assert_eq!(Currency::parse(currency.as_str()), Some(currency));
        }
        assert_eq!(Currency::parse("gold"), None);
        assert_eq!(Currency::Sparks.display_name(), "Sparks");
    }

    #[test]
    fn test_referral_amounts() {
        assert_eq!(ReferralReward::Signup.amount(), 25);
        assert_eq!(ReferralReward::FirstAction.amount(), 50);
    }

    #[test]
    fn test_debit_negates_amount() {
        let req = TransactionRequest::debit("u", Currency::Sparks, 15, "use").feature("poetry");
        assert_eq!(req.amount, -15);
        assert_eq!(req.feature.as_deref(), Some("poetry"));
    }
}
