//! API Routes
//!
//! Route handlers organized by functionality.

pub mod angry_lips;
pub mod arc_flash;
pub mod daily_reports;
pub mod feed;
pub mod health;
pub mod ledger;
pub mod receipts;
pub mod social;
pub mod switching;
