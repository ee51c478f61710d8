//! Ledger repository
//!
//! Balance changes are validated and applied inside one transaction so a
//! debit can never drive a balance negative.

use chrono::{Months, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    AccountSummary, BillingCycle, Currency, LedgerTransaction, PurchaseOutcome, ReferralReward,
    SparksPackage, SubscriptionOutcome, SubscriptionTier, TransactionRequest, UsageStat,
    UserSubscription, DAILY_BONUS_SPARKS,
};
use crate::store::{clamp_limit, OptionalRow, Store, StoreError, StoreResult};

impl ToSql for Currency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Currency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Currency::parse(raw).ok_or_else(|| FromSqlError::Other(format!("unknown currency {raw}").into()))
    }
}

/// Sparks and Mythacoin accounts
#[derive(Clone)]
pub struct Ledger {
    store: Arc<Store>,
}

const TRANSACTION_COLUMNS: &str = "id, user_id, currency, amount, balance_after, transaction_type,
     description, reference_id, feature, metadata, created_at";

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<LedgerTransaction> {
    Ok(LedgerTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        currency: row.get(2)?,
        amount: row.get(3)?,
        balance_after: row.get(4)?,
        transaction_type: row.get(5)?,
        description: row.get(6)?,
        reference_id: row.get(7)?,
        feature: row.get(8)?,
        metadata: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_subscription(row: &Row<'_>) -> rusqlite::Result<UserSubscription> {
    Ok(UserSubscription {
        user_id: row.get(0)?,
        tier_id: row.get(1)?,
        status: row.get(2)?,
        billing_cycle: row.get(3)?,
        current_period_start: row.get(4)?,
        current_period_end: row.get(5)?,
        cancel_at_period_end: row.get(6)?,
    })
}

fn read_balance(conn: &Connection, user_id: &str, currency: Currency) -> StoreResult<i64> {
    let balance = conn
        .query_row(
            "SELECT balance FROM ledger_accounts WHERE user_id = ?1 AND currency = ?2",
            params![user_id, currency],
            |row| row.get(0),
        )
        .optional_row()?;
    Ok(balance.unwrap_or(0))
}

/// Apply a balance change on an open connection or transaction
///
/// Callers that already hold a transaction (purchases, Angry Lips rewards)
/// use this directly so the credit commits with their own writes.
pub(crate) fn record_in(conn: &Connection, req: &TransactionRequest) -> StoreResult<LedgerTransaction> {
    if req.amount == 0 {
        return Err(StoreError::invalid("Amount must not be zero"));
    }

    let now = Utc::now();
    let balance = read_balance(conn, &req.user_id, req.currency)?;
    let balance_after = balance + req.amount;
    if balance_after < 0 {
        return Err(StoreError::invalid(format!(
            "Insufficient {} balance",
            req.currency.display_name()
        )));
    }

    conn.execute(
        "INSERT INTO ledger_accounts (user_id, currency, balance, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, currency) DO UPDATE SET balance = excluded.balance, updated_at = excluded.updated_at",
        params![req.user_id, req.currency, balance_after, now],
    )?;

    let transaction = LedgerTransaction {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id.clone(),
        currency: req.currency,
        amount: req.amount,
        balance_after,
        transaction_type: req.transaction_type.clone(),
        description: req.description.clone(),
        reference_id: req.reference_id.clone(),
        feature: req.feature.clone(),
        metadata: req.metadata.clone(),
        created_at: now,
    };

    conn.execute(
        &format!("INSERT INTO ledger_transactions ({TRANSACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            transaction.id,
            transaction.user_id,
            transaction.currency,
            transaction.amount,
            transaction.balance_after,
            transaction.transaction_type,
            transaction.description,
            transaction.reference_id,
            transaction.feature,
            transaction.metadata,
            transaction.created_at,
        ],
    )?;

    tracing::debug!(
        user_id = %transaction.user_id,
        currency = transaction.currency.as_str(),
        amount = transaction.amount,
        balance_after = transaction.balance_after,
        kind = %transaction.transaction_type,
        "Ledger transaction recorded"
    );

    Ok(transaction)
}

impl Ledger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn balance(&self, user_id: &str, currency: Currency) -> StoreResult<i64> {
        self.store.with_conn(|conn| read_balance(conn, user_id, currency))
    }

    /// Apply a credit or debit atomically
    pub fn record(&self, req: &TransactionRequest) -> StoreResult<LedgerTransaction> {
        self.store.with_tx(|tx| record_in(tx, req))
    }

    /// Credit Sparks, returning the new balance
    pub fn add_sparks(
        &self,
        user_id: &str,
        amount: i64,
        transaction_type: &str,
        description: &str,
        reference_id: Option<&str>,
    ) -> StoreResult<i64> {
        if amount <= 0 {
            return Err(StoreError::invalid("Amount must be positive"));
        }
        let mut req = TransactionRequest::credit(user_id, Currency::Sparks, amount, transaction_type)
            .description(description);
        req.reference_id = reference_id.map(str::to_string);
        Ok(self.record(&req)?.balance_after)
    }

    /// Spend Sparks on a feature; `false` when the balance is too low
    pub fn use_sparks(
        &self,
        user_id: &str,
        amount: i64,
        feature: &str,
        reference_id: Option<&str>,
    ) -> StoreResult<bool> {
        if amount <= 0 {
            return Err(StoreError::invalid("Amount must be positive"));
        }
        let mut req = TransactionRequest::debit(user_id, Currency::Sparks, amount, "usage")
            .feature(feature)
            .description(format!("Used Sparks on {feature}"));
        req.reference_id = reference_id.map(str::to_string);

        match self.record(&req) {
            Ok(_) => Ok(true),
            Err(StoreError::Invalid(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Newest first; limit clamped to 1..=100 (default 50)
    pub fn list_transactions(
        &self,
        user_id: &str,
        currency: Option<Currency>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        let limit = clamp_limit(limit, 50, 1, 100);
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions
                 WHERE user_id = ?1 AND (?2 IS NULL OR currency = ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![user_id, currency, limit], map_transaction)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Move currency between users; both legs commit together
    pub fn transfer(
        &self,
        from_user: &str,
        to_user: &str,
        currency: Currency,
        amount: i64,
        note: Option<&str>,
    ) -> StoreResult<(LedgerTransaction, LedgerTransaction)> {
        if from_user == to_user {
            return Err(StoreError::invalid("You cannot transfer to yourself."));
        }
        if amount <= 0 {
            return Err(StoreError::invalid("Amount must be positive"));
        }

        let transfer_id = Uuid::new_v4().to_string();
        let description = note.unwrap_or("Transfer").to_string();

        self.store.with_tx(|tx| {
            let debit = record_in(
                tx,
                &TransactionRequest::debit(from_user, currency, amount, "transfer_out")
                    .description(description.clone())
                    .reference(transfer_id.clone())
                    .metadata(json!({ "toUserId": to_user })),
            )?;
            let credit = record_in(
                tx,
                &TransactionRequest::credit(to_user, currency, amount, "transfer_in")
                    .description(description.clone())
                    .reference(transfer_id.clone())
                    .metadata(json!({ "fromUserId": from_user })),
            )?;
            Ok((debit, credit))
        })
    }

    /// Grant the daily Sparks bonus; returns 0 when already claimed today (UTC)
    pub fn claim_daily_bonus(&self, user_id: &str) -> StoreResult<i64> {
        self.claim_daily_bonus_on(user_id, Utc::now().date_naive())
    }

    pub fn claim_daily_bonus_on(&self, user_id: &str, day: NaiveDate) -> StoreResult<i64> {
        self.store.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO daily_bonus_claims (user_id, claim_date, amount)
                 VALUES (?1, ?2, ?3)",
                params![user_id, day, DAILY_BONUS_SPARKS],
            )?;
            if inserted == 0 {
                return Ok(0);
            }

            record_in(
                tx,
                &TransactionRequest::credit(user_id, Currency::Sparks, DAILY_BONUS_SPARKS, "daily_bonus")
                    .description("Daily login bonus")
                    .reference(day.to_string()),
            )?;
            Ok(DAILY_BONUS_SPARKS)
        })
    }

    pub fn list_packages(&self) -> StoreResult<Vec<SparksPackage>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, sparks_amount, bonus_sparks, price_cents, popular, best_value
                 FROM spark_packages WHERE active = 1 ORDER BY display_order",
            )?;
            let rows = stmt.query_map([], |row| {
                let sparks_amount: i64 = row.get(2)?;
                let bonus_sparks: i64 = row.get(3)?;
                Ok(SparksPackage {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sparks_amount,
                    bonus_sparks,
                    total_sparks: sparks_amount + bonus_sparks,
                    price_cents: row.get(4)?,
                    is_popular: row.get(5)?,
                    is_best_value: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn list_tiers(&self) -> StoreResult<Vec<SubscriptionTier>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, monthly_price_cents, yearly_price_cents, monthly_sparks, features
                 FROM subscription_tiers WHERE active = 1 ORDER BY display_order",
            )?;
            let rows = stmt.query_map([], |row| {
                let features: serde_json::Value = row.get(5)?;
                Ok(SubscriptionTier {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    monthly_price_cents: row.get(2)?,
                    yearly_price_cents: row.get(3)?,
                    monthly_sparks: row.get(4)?,
                    benefits: serde_json::from_value(features).unwrap_or_default(),
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Buy a Sparks package; payment is settled outside this service
    pub fn purchase_package(&self, user_id: &str, package_id: &str) -> StoreResult<PurchaseOutcome> {
        let package = self
            .list_packages()?
            .into_iter()
            .find(|p| p.id == package_id)
            .ok_or_else(|| StoreError::not_found("Package not found"))?;

        let purchase_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        self.store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO spark_purchases
                    (id, user_id, package_id, sparks_amount, bonus_amount, total_sparks, price_cents, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
                params![
                    purchase_id,
                    user_id,
                    package.id,
                    package.sparks_amount,
                    package.bonus_sparks,
                    package.total_sparks,
                    package.price_cents,
                    now,
                ],
            )?;

            let credit = record_in(
                tx,
                &TransactionRequest::credit(user_id, Currency::Sparks, package.total_sparks, "purchase")
                    .description(format!("Purchased {}", package.name))
                    .reference(purchase_id.clone()),
            )?;

            tx.execute(
                "UPDATE spark_purchases SET status = 'completed', completed_at = ?2 WHERE id = ?1",
                params![purchase_id, Utc::now()],
            )?;

            tracing::info!(user_id = %user_id, package = %package.id, sparks = package.total_sparks, "Sparks package purchased");

            Ok(PurchaseOutcome {
                success: true,
                purchase_id: purchase_id.clone(),
                new_balance: credit.balance_after,
                sparks_added: package.total_sparks,
            })
        })
    }

    /// Start or replace the user's subscription and grant its monthly Sparks
    pub fn subscribe(
        &self,
        user_id: &str,
        tier_id: &str,
        cycle: BillingCycle,
    ) -> StoreResult<SubscriptionOutcome> {
        let tier = self
            .list_tiers()?
            .into_iter()
            .find(|t| t.id == tier_id)
            .ok_or_else(|| StoreError::not_found("Tier not found"))?;

        let start = Utc::now();
        let end = start
            .checked_add_months(Months::new(cycle.period_months()))
            .ok_or_else(|| StoreError::invalid("Subscription period out of range"))?;

        self.store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO user_subscriptions
                    (user_id, tier_id, billing_period, status, current_period_start, current_period_end,
                     cancel_at_period_end, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'active', ?4, ?5, 0, ?4, ?4)
                 ON CONFLICT (user_id) DO UPDATE SET
                    tier_id = excluded.tier_id,
                    billing_period = excluded.billing_period,
                    status = 'active',
                    current_period_start = excluded.current_period_start,
                    current_period_end = excluded.current_period_end,
                    cancel_at_period_end = 0,
                    updated_at = excluded.updated_at",
                params![user_id, tier.id, cycle.as_str(), start, end],
            )?;

            let mut new_balance = read_balance(tx, user_id, Currency::Sparks)?;
            if tier.monthly_sparks > 0 {
                new_balance = record_in(
                    tx,
                    &TransactionRequest::credit(user_id, Currency::Sparks, tier.monthly_sparks, "subscription")
                        .description("Monthly subscription Sparks")
                        .reference(tier.id.clone()),
                )?
                .balance_after;
            }

            let subscription = UserSubscription {
                user_id: user_id.to_string(),
                tier_id: tier.id.clone(),
                status: "active".to_string(),
                billing_cycle: cycle.as_str().to_string(),
                current_period_start: start,
                current_period_end: end,
                cancel_at_period_end: false,
            };

            Ok(SubscriptionOutcome {
                success: true,
                subscription,
                monthly_sparks: tier.monthly_sparks,
                new_balance,
            })
        })
    }

    /// Active subscription, if any
    pub fn subscription(&self, user_id: &str) -> StoreResult<Option<UserSubscription>> {
        self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, tier_id, status, billing_period, current_period_start,
                        current_period_end, cancel_at_period_end
                 FROM user_subscriptions WHERE user_id = ?1 AND status = 'active'",
                params![user_id],
                map_subscription,
            )
            .optional_row()
        })
    }

    /// Returns false when there is no active subscription
    pub fn cancel_subscription(&self, user_id: &str, at_period_end: bool) -> StoreResult<bool> {
        let sql = if at_period_end {
            "UPDATE user_subscriptions SET cancel_at_period_end = 1, updated_at = ?2
             WHERE user_id = ?1 AND status = 'active'"
        } else {
            "UPDATE user_subscriptions SET status = 'cancelled', updated_at = ?2
             WHERE user_id = ?1 AND status = 'active'"
        };
        self.store
            .with_conn(|conn| Ok(conn.execute(sql, params![user_id, Utc::now()])? > 0))
    }

    /// Pay a referral reward once per (referrer, referred, reward)
    ///
    /// Returns true when the reward was paid by this call.
    pub fn record_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        reward: ReferralReward,
    ) -> StoreResult<bool> {
        if referrer_id == referred_id {
            return Err(StoreError::invalid("You cannot refer yourself."));
        }

        self.store.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO referral_rewards (referrer_id, referred_id, reward_type, amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![referrer_id, referred_id, reward.as_str(), reward.amount(), Utc::now()],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            record_in(
                tx,
                &TransactionRequest::credit(referrer_id, Currency::Sparks, reward.amount(), "referral")
                    .description(format!("Referral {} reward", reward.as_str()))
                    .reference(referred_id),
            )?;
            Ok(true)
        })
    }

    /// Sparks spending over the last 30 days grouped by feature and day
    pub fn usage_stats(&self, user_id: &str) -> StoreResult<Vec<UsageStat>> {
        let since = Utc::now() - chrono::Duration::days(30);
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT COALESCE(feature, transaction_type), substr(created_at, 1, 10) AS day,
                        COUNT(*), SUM(-amount)
                 FROM ledger_transactions
                 WHERE user_id = ?1 AND currency = 'sparks' AND amount < 0 AND created_at >= ?2
                 GROUP BY 1, 2
                 ORDER BY day DESC, 1",
            )?;
            let rows = stmt.query_map(params![user_id, since], |row| {
                Ok(UsageStat {
                    feature: row.get(0)?,
                    date: row.get(1)?,
                    total_uses: row.get(2)?,
                    total_sparks_used: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Balance, active subscription and the 20 most recent Sparks transactions
    pub fn account_summary(&self, user_id: &str) -> StoreResult<AccountSummary> {
        Ok(AccountSummary {
            balance: self.balance(user_id, Currency::Sparks)?,
            subscription: self.subscription(user_id)?,
            recent_transactions: self.list_transactions(user_id, Some(Currency::Sparks), Some(20))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_credit_then_debit() {
        let ledger = ledger();
        assert_eq!(ledger.add_sparks("u1", 100, "grant", "Welcome", None).unwrap(), 100);
        assert!(ledger.use_sparks("u1", 30, "poetry", None).unwrap());
        assert_eq!(ledger.balance("u1", Currency::Sparks).unwrap(), 70);
        assert_eq!(ledger.balance("u1", Currency::Mythacoin).unwrap(), 0);
    }

    #[test]
    fn test_insufficient_balance_leaves_ledger_untouched() {
        let ledger = ledger();
        ledger.add_sparks("u1", 10, "grant", "Welcome", None).unwrap();

        assert!(!ledger.use_sparks("u1", 11, "poetry", None).unwrap());
        assert_eq!(ledger.balance("u1", Currency::Sparks).unwrap(), 10);
        assert_eq!(ledger.list_transactions("u1", None, None).unwrap().len(), 1);

        let err = ledger
            .record(&TransactionRequest::debit("u2", Currency::Mythacoin, 1, "spend"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient Mythacoin balance");
    }

    #[test]
    fn test_daily_bonus_once_per_day() {
        let ledger = ledger();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        assert_eq!(ledger.claim_daily_bonus_on("u1", day).unwrap(), DAILY_BONUS_SPARKS);
        assert_eq!(ledger.claim_daily_bonus_on("u1", day).unwrap(), 0);
        assert_eq!(
            ledger.claim_daily_bonus_on("u1", day.succ_opt().unwrap()).unwrap(),
            DAILY_BONUS_SPARKS
        );
        assert_eq!(ledger.balance("u1", Currency::Sparks).unwrap(), 2 * DAILY_BONUS_SPARKS);
    }

    #[test]
    fn test_purchase_credits_amount_plus_bonus() {
        let ledger = ledger();
        let outcome = ledger.purchase_package("u1", "explorer").unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.sparks_added, 550);
        assert_eq!(outcome.new_balance, 550);

        let status: String = ledger
            .store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT status FROM spark_purchases WHERE id = ?1",
                    params![outcome.purchase_id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(status, "completed");

        assert!(matches!(
            ledger.purchase_package("u1", "nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_subscribe_and_cancel() {
        let ledger = ledger();
        let outcome = ledger.subscribe("u1", "storyteller", BillingCycle::Yearly).unwrap();
        assert_eq!(outcome.monthly_sparks, 1200);
        assert_eq!(outcome.new_balance, 1200);
        assert!(outcome.subscription.current_period_end > outcome.subscription.current_period_start);

        assert!(ledger.cancel_subscription("u1", true).unwrap());
        let sub = ledger.subscription("u1").unwrap().unwrap();
        assert!(sub.cancel_at_period_end);

        assert!(ledger.cancel_subscription("u1", false).unwrap());
        assert!(ledger.subscription("u1").unwrap().is_none());
        assert!(!ledger.cancel_subscription("u1", false).unwrap());
    }

    #[test]
    fn test_referral_is_idempotent() {
        let ledger = ledger();
        assert!(ledger.record_referral("a", "b", ReferralReward::Signup).unwrap());
        assert!(!ledger.record_referral("a", "b", ReferralReward::Signup).unwrap());
        assert!(ledger.record_referral("a", "b", ReferralReward::FirstAction).unwrap());
        assert_eq!(ledger.balance("a", Currency::Sparks).unwrap(), 75);
        assert!(ledger.record_referral("a", "a", ReferralReward::Signup).is_err());
    }

    #[test]
    fn test_transfer_moves_both_legs() {
        let ledger = ledger();
        ledger
            .record(&TransactionRequest::credit("a", Currency::Mythacoin, 20, "grant"))
            .unwrap();

        let (debit, credit) = ledger.transfer("a", "b", Currency::Mythacoin, 15, Some("thanks")).unwrap();
        assert_eq!(debit.balance_after, 5);
        assert_eq!(credit.balance_after, 15);
        assert_eq!(debit.reference_id, credit.reference_id);

        assert!(ledger.transfer("a", "b", Currency::Mythacoin, 6, None).is_err());
        assert_eq!(ledger.balance("b", Currency::Mythacoin).unwrap(), 15);
        assert!(ledger.transfer("a", "a", Currency::Mythacoin, 1, None).is_err());
    }

    #[test]
    fn test_usage_stats_and_summary() {
        let ledger = ledger();
        ledger.add_sparks("u1", 100, "grant", "Welcome", None).unwrap();
        ledger.use_sparks("u1", 5, "poetry", None).unwrap();
        ledger.use_sparks("u1", 7, "poetry", None).unwrap();
        ledger.use_sparks("u1", 3, "songs", None).unwrap();

        let stats = ledger.usage_stats("u1").unwrap();
        let poetry = stats.iter().find(|s| s.feature == "poetry").unwrap();
        assert_eq!(poetry.total_uses, 2);
        assert_eq!(poetry.total_sparks_used, 12);
        assert_eq!(poetry.date, Utc::now().date_naive());

        let summary = ledger.account_summary("u1").unwrap();
        assert_eq!(summary.balance, 85);
        assert_eq!(summary.recent_transactions.len(), 4);
        assert_eq!(summary.recent_transactions[0].amount, -3);
        assert!(summary.subscription.is_none());
    }

    #[test]
    fn test_catalog_listing() {
        let ledger = ledger();
        let packages = ledger.list_packages().unwrap();
        assert_eq!(packages.first().map(|p| p.id.as_str()), Some("starter"));
        assert!(packages.iter().any(|p| p.is_popular));

        let tiers = ledger.list_tiers().unwrap();
        assert_eq!(tiers.len(), 3);
        assert!(!tiers[0].benefits.is_empty());
    }
}
