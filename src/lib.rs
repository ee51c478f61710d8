//! # FieldForge
//!
//! Backend for a social storytelling app and a set of field-operations tools
//! for electrical construction crews, served from one HTTP API over SQLite.
//!
//! ## Features
//!
//! - **Angry Lips**: Turn-based mad-lib sessions with response windows
//! - **Hourglass**: Background worker enforcing turn deadlines
//! - **Ledger**: Sparks and Mythacoin balances with an append-only history
//! - **Social**: Profiles, bookworm connections and a public feed
//! - **Field**: Receipts, daily reports, arc flash studies and switching orders
//! - **Real-time**: WebSocket fan-out of session, user and feed events
//!
//! ## Modules
//!
//! - [`store`]: SQLite connection and schema
//! - [`auth`]: Bearer token issue and verification
//! - [`angry_lips`]: Sessions, turns, templates and the AI co-host
//! - [`hourglass`]: Turn deadline worker and notification channels
//! - [`ledger`]: Currency accounts
//! - [`social`] / [`feed`]: Profiles, connections and posts
//! - [`field`]: Company-scoped field records
//! - [`realtime`]: WebSocket hub
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fieldforge::{AppState, Config, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default();
//!     config.validate()?;
//!
//!     let store = Arc::new(Store::open(&config.storage.database_path())?);
//!     let server = config.server.clone();
//!     let state = AppState::new(store, config);
//!
//!     fieldforge::serve(state, &server).await?;
//!     Ok(())
//! }
//! ```

pub mod angry_lips;
pub mod api;
pub mod auth;
pub mod config;
pub mod feed;
pub mod field;
pub mod hourglass;
pub mod ledger;
pub mod realtime;
pub mod social;
pub mod store;
pub mod telemetry;

pub use api::{build_router, serve, ApiError, ApiResult, AppState};

pub use auth::{AuthError, AuthKeys, AuthUser};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};

pub use hourglass::{Hourglass, PassReport};

pub use store::{Store, StoreError, StoreResult};
