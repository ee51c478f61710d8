//! Expense receipts
//!
//! Crew members submit receipts (optionally with a photo); managers
//! approve or reject them. Pending receipts stay editable by their
//! submitter.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Months, NaiveDate, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::FieldScope;
use crate::store::{text_enum, OptionalRow, Store, StoreError, StoreResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

text_enum!(
    /// Review state of a receipt
    ReceiptStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: String,
    pub company_id: String,
    pub submitted_by: String,
    pub merchant_name: String,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub receipt_date: NaiveDate,
    pub project_id: Option<String>,
    pub payment_method: Option<String>,
    pub status: ReceiptStatus,
    pub has_image: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a create or upload request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReceipt {
    pub merchant_name: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub project_id: Option<String>,
    pub payment_method: Option<String>,
    /// Base64 image, with or without a `data:` URL prefix
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptUpdate {
    pub merchant_name: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub project_id: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptFilter {
    pub status: Option<ReceiptStatus>,
    pub category: Option<String>,
    pub project_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiptImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    pub pending_count: i64,
    pub approved_count: i64,
    pub rejected_count: i64,
    pub pending_amount: f64,
    pub approved_amount: f64,
    pub rejected_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub count: i64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: String,
    pub count: i64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStats {
    pub summary: StatusSummary,
    pub by_category: Vec<CategoryTotal>,
    pub monthly_trend: Vec<MonthTotal>,
}

/// Decode a base64 image, honoring a `data:<type>;base64,` prefix
pub fn decode_image(raw: &str) -> StoreResult<ReceiptImage> {
    let raw = raw.trim();
    let (content_type, payload) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| StoreError::invalid("Malformed image data URL"))?;
            let mime = header.trim_end_matches(";base64");
            let mime = if mime.is_empty() { DEFAULT_CONTENT_TYPE } else { mime };
            (mime.to_string(), data)
        }
        None => (DEFAULT_CONTENT_TYPE.to_string(), raw),
    };

    // base64 grows by 4/3, so anything this long cannot decode under the cap
    if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
        return Err(StoreError::invalid("Image size exceeds 5MB limit"));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| StoreError::invalid("Image data is not valid base64"))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(StoreError::invalid("Image size exceeds 5MB limit"));
    }
    Ok(ReceiptImage {
        bytes,
        content_type,
    })
}

fn required_text(value: Option<&str>, field: &str) -> StoreResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::invalid(format!("{field} is required")))
}

fn check_amount(amount: f64) -> StoreResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(StoreError::invalid("amount must be greater than zero"))
    }
}

const RECEIPT_COLUMNS: &str = "id, company_id, submitted_by, merchant_name, amount, category,
    description, receipt_date, project_id, payment_method, status, image_data IS NOT NULL,
    reviewed_by, reviewed_at, review_notes, rejection_reason, created_at, updated_at";

fn map_receipt(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: row.get(0)?,
        company_id: row.get(1)?,
        submitted_by: row.get(2)?,
        merchant_name: row.get(3)?,
        amount: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        receipt_date: row.get(7)?,
        project_id: row.get(8)?,
        payment_method: row.get(9)?,
        status: row.get(10)?,
        has_image: row.get(11)?,
        reviewed_by: row.get(12)?,
        reviewed_at: row.get(13)?,
        review_notes: row.get(14)?,
        rejection_reason: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

#[derive(Clone)]
pub struct ReceiptRepository {
    store: Arc<Store>,
}

impl ReceiptRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a receipt from form fields; the date is required
    pub fn create(&self, scope: &FieldScope, input: &NewReceipt) -> StoreResult<Receipt> {
        let date = input
            .receipt_date
            .ok_or_else(|| StoreError::invalid("receipt_date is required"))?;
        let image = input.image.as_deref().map(decode_image).transpose()?;
        self.insert(scope, input, date, image)
    }

    /// Create a receipt from a captured photo; the date defaults to today
    pub fn upload(&self, scope: &FieldScope, input: &NewReceipt) -> StoreResult<Receipt> {
        let raw = input
            .image
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| StoreError::invalid("Image is required"))?;
        let image = decode_image(raw)?;
        let date = input.receipt_date.unwrap_or_else(|| Utc::now().date_naive());
        self.insert(scope, input, date, Some(image))
    }

    fn insert(
        &self,
        scope: &FieldScope,
        input: &NewReceipt,
        date: NaiveDate,
        image: Option<ReceiptImage>,
    ) -> StoreResult<Receipt> {
        let merchant = required_text(input.merchant_name.as_deref(), "merchant_name")?;
        let category = required_text(input.category.as_deref(), "category")?;
        let amount = input
            .amount
            .ok_or_else(|| StoreError::invalid("amount is required"))?;
        check_amount(amount)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (bytes, content_type) = match image {
            Some(img) => (Some(img.bytes), Some(img.content_type)),
            None => (None, None),
        };

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO receipts (id, company_id, submitted_by, merchant_name, amount, category,
                     description, receipt_date, project_id, payment_method, status,
                     image_data, image_content_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    id,
                    scope.company_id,
                    scope.user_id,
                    merchant,
                    amount,
                    category,
                    input.description,
                    date,
                    input.project_id,
                    input.payment_method,
                    ReceiptStatus::Pending,
                    bytes,
                    content_type,
                    now,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(receipt_id = %id, company_id = %scope.company_id, amount, "Receipt submitted");
        self.get(scope, &id)
    }

    pub fn list(&self, scope: &FieldScope, filter: &ReceiptFilter) -> StoreResult<Vec<Receipt>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECEIPT_COLUMNS} FROM receipts
                 WHERE company_id = ?1
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR category = ?3)
                   AND (?4 IS NULL OR project_id = ?4)
                   AND (?5 IS NULL OR receipt_date >= ?5)
                   AND (?6 IS NULL OR receipt_date <= ?6)
                   AND (?7 IS NULL
                        OR merchant_name LIKE '%' || ?7 || '%'
                        OR COALESCE(description, '') LIKE '%' || ?7 || '%')
                 ORDER BY receipt_date DESC, created_at DESC"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![
                    scope.company_id,
                    filter.status,
                    filter.category,
                    filter.project_id,
                    filter.start_date,
                    filter.end_date,
                    search,
                ],
                map_receipt,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn get(&self, scope: &FieldScope, id: &str) -> StoreResult<Receipt> {
        self.store
            .with_conn(|conn| {
                conn.query_row(
                    &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1 AND company_id = ?2"),
                    params![id, scope.company_id],
                    map_receipt,
                )
                .optional_row()
            })?
            .ok_or_else(|| StoreError::not_found("Receipt not found"))
    }

    pub fn image(&self, scope: &FieldScope, id: &str) -> StoreResult<ReceiptImage> {
        let found = self.store.with_conn(|conn| {
            conn.query_row(
                "SELECT image_data, image_content_type FROM receipts WHERE id = ?1 AND company_id = ?2",
                params![id, scope.company_id],
                |row| {
                    Ok((
                        row.get::<_, Option<Vec<u8>>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional_row()
        })?;
        match found {
            Some((Some(bytes), content_type)) => Ok(ReceiptImage {
                bytes,
                content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            }),
            _ => Err(StoreError::not_found("Receipt image not found")),
        }
    }

    /// Edit a pending receipt; only its submitter may do so
    pub fn update(&self, scope: &FieldScope, id: &str, update: &ReceiptUpdate) -> StoreResult<Receipt> {
        if let Some(amount) = update.amount {
            check_amount(amount)?;
        }
        let merchant = update.merchant_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let category = update.category.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let changed = self.store.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE receipts SET
                     merchant_name = COALESCE(?4, merchant_name),
                     amount = COALESCE(?5, amount),
                     category = COALESCE(?6, category),
                     description = COALESCE(?7, description),
                     receipt_date = COALESCE(?8, receipt_date),
                     project_id = COALESCE(?9, project_id),
                     payment_method = COALESCE(?10, payment_method),
                     updated_at = ?11
                 WHERE id = ?1 AND company_id = ?2 AND submitted_by = ?3 AND status = 'pending'",
                params![
                    id,
                    scope.company_id,
                    scope.user_id,
                    merchant,
                    update.amount,
                    category,
                    update.description,
                    update.receipt_date,
                    update.project_id,
                    update.payment_method,
                    Utc::now(),
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::not_found("Receipt not found or cannot be modified"));
        }
        self.get(scope, id)
    }

    pub fn delete(&self, scope: &FieldScope, id: &str) -> StoreResult<()> {
        let removed = self.store.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM receipts
                 WHERE id = ?1 AND company_id = ?2 AND submitted_by = ?3 AND status = 'pending'",
                params![id, scope.company_id, scope.user_id],
            )?)
        })?;
        if removed == 0 {
            return Err(StoreError::not_found("Receipt not found or cannot be modified"));
        }
        tracing::info!(receipt_id = %id, "Receipt deleted");
        Ok(())
    }

    pub fn approve(&self, scope: &FieldScope, id: &str, notes: Option<&str>) -> StoreResult<Receipt> {
        if !scope.is_manager() {
            return Err(StoreError::forbidden("Only managers can approve receipts"));
        }
        self.review(scope, id, ReceiptStatus::Approved, notes, None)
    }

    pub fn reject(&self, scope: &FieldScope, id: &str, reason: &str) -> StoreResult<Receipt> {
        if !scope.is_manager() {
            return Err(StoreError::forbidden("Only managers can reject receipts"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(StoreError::invalid("Rejection reason is required"));
        }
        self.review(scope, id, ReceiptStatus::Rejected, None, Some(reason))
    }

    fn review(
        &self,
        scope: &FieldScope,
        id: &str,
        status: ReceiptStatus,
        notes: Option<&str>,
        reason: Option<&str>,
    ) -> StoreResult<Receipt> {
        let now = Utc::now();
        let changed = self.store.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE receipts SET status = ?3, reviewed_by = ?4, reviewed_at = ?5,
                     review_notes = ?6, rejection_reason = ?7, updated_at = ?5
                 WHERE id = ?1 AND company_id = ?2 AND status = 'pending'",
                params![id, scope.company_id, status, scope.user_id, now, notes, reason],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::not_found("Receipt not found or already processed"));
        }
        tracing::info!(receipt_id = %id, status = %status, reviewer = %scope.user_id, "Receipt reviewed");
        self.get(scope, id)
    }

    pub fn stats(&self, scope: &FieldScope) -> StoreResult<ReceiptStats> {
        self.stats_as_of(scope, Utc::now().date_naive())
    }

    /// Totals by status and category plus a six-month approved trend ending at `today`
    pub fn stats_as_of(&self, scope: &FieldScope, today: NaiveDate) -> StoreResult<ReceiptStats> {
        let since = today.checked_sub_months(Months::new(6)).unwrap_or(today);
        self.store.with_conn(|conn| {
            let summary = conn.query_row(
                "SELECT
                     COUNT(*) FILTER (WHERE status = 'pending'),
                     COUNT(*) FILTER (WHERE status = 'approved'),
                     COUNT(*) FILTER (WHERE status = 'rejected'),
                     COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0),
                     COALESCE(SUM(amount) FILTER (WHERE status = 'approved'), 0),
                     COALESCE(SUM(amount) FILTER (WHERE status = 'rejected'), 0)
                 FROM receipts WHERE company_id = ?1",
                params![scope.company_id],
                |row| {
                    Ok(StatusSummary {
                        pending_count: row.get(0)?,
                        approved_count: row.get(1)?,
                        rejected_count: row.get(2)?,
                        pending_amount: row.get(3)?,
                        approved_amount: row.get(4)?,
                        rejected_amount: row.get(5)?,
                    })
                },
            )?;

            let mut stmt = conn.prepare_cached(
                "SELECT category, COUNT(*), SUM(amount) FROM receipts
                 WHERE company_id = ?1 AND status = 'approved'
                 GROUP BY category ORDER BY SUM(amount) DESC",
            )?;
            let by_category = stmt
                .query_map(params![scope.company_id], |row| {
                    Ok(CategoryTotal {
                        category: row.get(0)?,
                        count: row.get(1)?,
                        total: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare_cached(
                "SELECT substr(receipt_date, 1, 7) AS month, COUNT(*), SUM(amount) FROM receipts
                 WHERE company_id = ?1 AND status = 'approved' AND receipt_date >= ?2
                 GROUP BY month ORDER BY month",
            )?;
            let monthly_trend = stmt
                .query_map(params![scope.company_id, since], |row| {
                    Ok(MonthTotal {
                        month: row.get(0)?,
                        count: row.get(1)?,
                        total: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ReceiptStats {
                summary,
                by_category,
                monthly_trend,
            })
        })
    }

    /// Render the filtered receipts as CSV
    pub fn export_csv(&self, scope: &FieldScope, filter: &ReceiptFilter) -> StoreResult<String> {
        let receipts = self.list(scope, filter)?;
        let csv_err = |e: csv::Error| StoreError::Serialization(e.to_string());

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "Date",
                "Merchant",
                "Category",
                "Amount",
                "Status",
                "Project",
                "Payment Method",
                "Description",
                "Submitted By",
            ])
            .map_err(csv_err)?;
        for r in &receipts {
            writer
                .write_record([
                    r.receipt_date.to_string().as_str(),
                    r.merchant_name.as_str(),
                    r.category.as_str(),
                    format!("{:.2}", r.amount).as_str(),
                    r.status.as_str(),
                    r.project_id.as_deref().unwrap_or(""),
                    r.payment_method.as_deref().unwrap_or(""),
                    r.description.as_deref().unwrap_or(""),
                    r.submitted_by.as_str(),
                ])
                .map_err(csv_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> ReceiptRepository {
        ReceiptRepository::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn crew() -> FieldScope {
        FieldScope::new("acme", "worker-1").with_role("foreman")
    }

    fn manager() -> FieldScope {
        FieldScope::new("acme", "boss").with_role("manager")
    }

    fn receipt(merchant: &str, amount: f64, category: &str, date: &str) -> NewReceipt {
        NewReceipt {
            merchant_name: Some(merchant.to_string()),
            amount: Some(amount),
            category: Some(category.to_string()),
            receipt_date: Some(date.parse().unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_image_variants() {
        let png = decode_image("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(png.bytes, b"hello");
        assert_eq!(png.content_type, "image/png");

        let plain = decode_image("aGVsbG8=").unwrap();
        assert_eq!(plain.content_type, "image/jpeg");

        assert!(matches!(decode_image("%%%"), Err(StoreError::Invalid(_))));

        let big = STANDARD.encode(vec![0u8; MAX_IMAGE_BYTES + 1]);
        let err = decode_image(&big).unwrap_err();
        assert_eq!(err.to_string(), "Image size exceeds 5MB limit");
    }

    #[test]
    fn test_create_validates_fields() {
        let repo = repo();
        let mut input = receipt("Shell", 0.0, "Fuel", "2024-03-01");
        assert!(matches!(repo.create(&crew(), &input), Err(StoreError::Invalid(_))));

        input.amount = Some(45.5);
        input.receipt_date = None;
        assert!(matches!(repo.create(&crew(), &input), Err(StoreError::Invalid(_))));

        input.receipt_date = Some("2024-03-01".parse().unwrap());
        let created = repo.create(&crew(), &input).unwrap();
        assert_eq!(created.status, ReceiptStatus::Pending);
        assert!(!created.has_image);
    }

    #[test]
    fn test_upload_requires_image_and_defaults_date() {
        let repo = repo();
        let mut input = NewReceipt {
            merchant_name: Some("Home Depot".into()),
            amount: Some(12.0),
            category: Some("Tools".into()),
            ..Default::default()
        };
        assert!(repo.upload(&crew(), &input).is_err());

        input.image = Some("data:image/png;base64,aGVsbG8=".into());
        let created = repo.upload(&crew(), &input).unwrap();
        assert!(created.has_image);
        assert_eq!(created.receipt_date, Utc::now().date_naive());

        let image = repo.image(&crew(), &created.id).unwrap();
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.content_type, "image/png");
    }

    #[test]
    fn test_receipts_are_company_scoped() {
        let repo = repo();
        let created = repo.create(&crew(), &receipt("Shell", 40.0, "Fuel", "2024-03-01")).unwrap();

        let outsider = FieldScope::new("other-co", "worker-1");
        assert!(matches!(repo.get(&outsider, &created.id), Err(StoreError::NotFound(_))));
        assert!(repo.list(&outsider, &ReceiptFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_list_filters_and_order() {
        let repo = repo();
        repo.create(&crew(), &receipt("Shell", 40.0, "Fuel", "2024-03-01")).unwrap();
        repo.create(&crew(), &receipt("Marriott", 210.0, "Lodging", "2024-03-05")).unwrap();
        repo.create(&crew(), &receipt("Chevron", 55.0, "Fuel", "2024-02-20")).unwrap();

        let all = repo.list(&crew(), &ReceiptFilter::default()).unwrap();
        let merchants: Vec<_> = all.iter().map(|r| r.merchant_name.as_str()).collect();
        assert_eq!(merchants, vec!["Marriott", "Shell", "Chevron"]);

        let fuel = repo
            .list(
                &crew(),
                &ReceiptFilter {
                    category: Some("Fuel".into()),
                    start_date: Some("2024-03-01".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(fuel.len(), 1);
        assert_eq!(fuel[0].merchant_name, "Shell");

        let searched = repo
            .list(&crew(), &ReceiptFilter { search: Some("marr".into()), ..Default::default() })
            .unwrap();
        assert_eq!(searched.len(), 1);
    }

    #[test]
    fn test_only_submitter_edits_pending() {
        let repo = repo();
        let created = repo.create(&crew(), &receipt("Shell", 40.0, "Fuel", "2024-03-01")).unwrap();

        let update = ReceiptUpdate { amount: Some(42.0), ..Default::default() };
        let err = repo.update(&manager(), &created.id, &update).unwrap_err();
        assert_eq!(err.to_string(), "Receipt not found or cannot be modified");

        let updated = repo.update(&crew(), &created.id, &update).unwrap();
        assert_eq!(updated.amount, 42.0);
        assert_eq!(updated.merchant_name, "Shell");

        repo.approve(&manager(), &created.id, Some("ok")).unwrap();
        assert!(repo.update(&crew(), &created.id, &update).is_err());
        assert!(repo.delete(&crew(), &created.id).is_err());
    }

    #[test]
    fn test_review_flow() {
        let repo = repo();
        let a = repo.create(&crew(), &receipt("Shell", 40.0, "Fuel", "2024-03-01")).unwrap();
        let b = repo.create(&crew(), &receipt("Taco Hut", 18.0, "Meals", "2024-03-02")).unwrap();

        let err = repo.approve(&crew(), &a.id, None).unwrap_err();
        assert_eq!(err.to_string(), "Only managers can approve receipts");

        let approved = repo.approve(&manager(), &a.id, Some("fine")).unwrap();
        assert_eq!(approved.status, ReceiptStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("boss"));
        assert_eq!(approved.review_notes.as_deref(), Some("fine"));

        let err = repo.approve(&manager(), &a.id, None).unwrap_err();
        assert_eq!(err.to_string(), "Receipt not found or already processed");

        let err = repo.reject(&manager(), &b.id, "  ").unwrap_err();
        assert_eq!(err.to_string(), "Rejection reason is required");
        let rejected = repo.reject(&manager(), &b.id, "No itemized receipt").unwrap();
        assert_eq!(rejected.status, ReceiptStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("No itemized receipt"));
    }

    #[test]
    fn test_stats_and_export() {
        let repo = repo();
        let today: NaiveDate = "2024-06-15".parse().unwrap();
        let a = repo.create(&crew(), &receipt("Shell", 40.0, "Fuel", "2024-05-01")).unwrap();
        let b = repo.create(&crew(), &receipt("Chevron", 60.0, "Fuel", "2024-06-02")).unwrap();
        let c = repo.create(&crew(), &receipt("Marriott", 210.0, "Lodging", "2024-06-03")).unwrap();
        let old = repo.create(&crew(), &receipt("Motel 6", 90.0, "Lodging", "2023-10-01")).unwrap();
        repo.create(&crew(), &receipt("Taco Hut", 18.0, "Meals", "2024-06-04")).unwrap();
        for id in [&a.id, &b.id, &c.id, &old.id] {
            repo.approve(&manager(), id, None).unwrap();
        }

        let stats = repo.stats_as_of(&crew(), today).unwrap();
        assert_eq!(stats.summary.approved_count, 4);
        assert_eq!(stats.summary.pending_count, 1);
        assert_eq!(stats.summary.approved_amount, 400.0);
        assert_eq!(stats.summary.pending_amount, 18.0);
        assert_eq!(stats.by_category[0].category, "Lodging");
        assert_eq!(stats.by_category[0].total, 300.0);
        assert_eq!(
            stats.monthly_trend,
            vec![
                MonthTotal { month: "2024-05".into(), count: 1, total: 40.0 },
                MonthTotal { month: "2024-06".into(), count: 2, total: 270.0 },
            ]
        );

        let csv = repo.export_csv(&crew(), &ReceiptFilter::default()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Merchant,Category,Amount,Status,Project,Payment Method,Description,Submitted By")
        );
        assert_eq!(csv.lines().count(), 6);
        assert!(csv.contains("2024-06-03,Marriott,Lodging,210.00,approved,,,,worker-1"));
    }
}
