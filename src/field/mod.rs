//! Field Operations
//!
//! Company-scoped records for construction crews:
//!
//! - **receipts**: Expense receipts with images, review and CSV export
//! - **receipt_scan**: Vendor, amount, date and cost code from OCR text
//! - **daily_reports**: Foreman daily reports and production totals
//! - **arc_flash**: Incident energy calculation and saved studies
//! - **switching**: Switching orders and their approval workflow
//!
//! Every query is filtered by the caller's company.

pub mod arc_flash;
pub mod daily_reports;
pub mod receipt_scan;
pub mod receipts;
pub mod switching;

pub use arc_flash::{ArcFlashInputs, ArcFlashRepository, ArcFlashResult, Enclosure};
pub use daily_reports::DailyReportRepository;
pub use receipts::ReceiptRepository;
pub use switching::SwitchingRepository;

use crate::auth::AuthUser;

/// The caller as seen by field repositories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldScope {
    pub company_id: String,
    pub user_id: String,
    pub role: Option<String>,
}

impl FieldScope {
    pub fn new(company_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            user_id: user_id.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// `None` when the token carries no company
    pub fn from_user(user: &AuthUser) -> Option<Self> {
        let company_id = user.company_id.clone()?;
        Some(Self {
            company_id,
            user_id: user.user_id.clone(),
            role: user.role.clone(),
        })
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.role.as_deref(), Some("manager") | Some("admin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_user() {
        assert!(FieldScope::from_user(&AuthUser::new("u1")).is_none());

        let scope = FieldScope::from_user(&AuthUser::new("u1").with_company("c1", "admin")).unwrap();
        assert_eq!(scope.company_id, "c1");
        assert!(scope.is_manager());
        assert!(!FieldScope::new("c1", "u2").with_role("foreman").is_manager());
    }
}
