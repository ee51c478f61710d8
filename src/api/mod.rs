//! FieldForge REST API
//!
//! HTTP API layer built with Axum. Everything under `/api` requires a
//! bearer token; `/api/field/*` additionally requires a company claim.
//!
//! # Endpoints
//!
//! ## Angry Lips
//! - `/api/angry-lips/templates` - Prebuilt and generated templates
//! - `/api/angry-lips/sessions` - Session lifecycle
//! - `/api/angry-lips/turns/:id/*` - Submissions, auto-fill and turn events
//! - `/api/angry-lips/vault/published` - Public stories
//! - `/api/angry-lips/realtime/token` - Socket token
//!
//! ## Social and feed
//! - `/api/social/*` - Profiles and BookWorm connections
//! - `/api/feed/*` - Story feed, likes, reposts and comments
//!
//! ## Currency
//! - `/api/sparks/*` - Balance, bonus, packages, subscriptions, referrals
//! - `/api/mythacoin/*` - Balance, history and transfers
//!
//! ## Field operations
//! - `/api/field/receipts` - Expense receipts
//! - `/api/field/daily-reports` - Foreman daily reports
//! - `/api/field/arc-flash` - Incident energy calculator and studies
//! - `/api/field/switching-orders` - Switching orders
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws?token=` - Realtime event stream
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldforge::api::{serve, AppState};
//! use fieldforge::config::Config;
//! use fieldforge::store::Store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default();
//!     let store = Arc::new(Store::open(&config.storage.database_path())?);
//!     let server = config.server.clone();
//!
//!     serve(AppState::new(store, config), &server).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::realtime::websocket_handler;
use routes::{
    angry_lips, arc_flash, daily_reports, feed, health, ledger, receipts, social, switching,
};

type ApiRouter = Router<Arc<AppState>>;

fn angry_lips_routes() -> ApiRouter {
    Router::new()
        .route("/templates", get(angry_lips::list_templates))
        .route("/templates/generate", post(angry_lips::generate))
        .route("/templates/:id", get(angry_lips::get_template))
        .route(
            "/sessions",
            get(angry_lips::list_sessions).post(angry_lips::create_session),
        )
        .route("/sessions/:id", get(angry_lips::get_session))
        .route("/sessions/:id/participants", get(angry_lips::list_participants))
        .route("/sessions/:id/invite", post(angry_lips::invite))
        .route("/sessions/:id/respond", post(angry_lips::respond))
        .route("/sessions/:id/start", post(angry_lips::start))
        .route("/sessions/:id/advance", post(angry_lips::advance))
        .route("/sessions/:id/complete", post(angry_lips::complete))
        .route("/sessions/:id/summarize", post(angry_lips::summarize))
        .route("/sessions/:id/ai-story", post(angry_lips::ai_story))
        .route("/sessions/:id/publish", post(angry_lips::publish))
        .route("/sessions/:id/story", get(angry_lips::story))
        .route("/turns/:id/submit", post(angry_lips::submit_turn))
        .route("/turns/:id/auto-fill", post(angry_lips::auto_fill_turn))
        .route("/turns/:id/events", post(angry_lips::log_turn_event))
        .route("/vault/published", get(angry_lips::list_published))
        .route("/realtime/token", get(angry_lips::realtime_token))
}

fn social_routes() -> ApiRouter {
    Router::new()
        .route(
            "/profile",
            get(social::get_profile).put(social::upsert_profile),
        )
        .route("/profiles/:username", get(social::lookup_profile))
        .route("/bookworms", get(social::list_bookworms))
        .route("/bookworms/:friend_id", axum::routing::delete(social::remove_bookworm))
        .route(
            "/requests",
            get(social::list_requests).post(social::create_request),
        )
        .route("/requests/:id/respond", post(social::respond_to_request))
        .route("/stats", get(social::stats))
}

fn feed_routes() -> ApiRouter {
    Router::new()
        .route("/", get(feed::list_feed))
        .route("/posts", post(feed::create_post))
        .route("/posts/:id", get(feed::get_post))
        .route("/posts/:id/like", put(feed::like).delete(feed::unlike))
        .route("/posts/:id/repost", put(feed::repost).delete(feed::unrepost))
        .route(
            "/posts/:id/comments",
            get(feed::list_comments).post(feed::create_comment),
        )
}

fn sparks_routes() -> ApiRouter {
    Router::new()
        .route("/balance", get(ledger::sparks_balance))
        .route("/transactions", get(ledger::sparks_transactions))
        .route("/use", post(ledger::use_sparks))
        .route("/daily-bonus", post(ledger::daily_bonus))
        .route("/packages", get(ledger::list_packages))
        .route("/purchase", post(ledger::purchase))
        .route("/tiers", get(ledger::list_tiers))
        .route("/subscribe", post(ledger::subscribe))
        .route("/subscription", get(ledger::get_subscription))
        .route("/subscription/cancel", post(ledger::cancel_subscription))
        .route("/referrals", post(ledger::record_referral))
        .route("/usage", get(ledger::usage))
        .route("/user/:user_id", get(ledger::account_summary))
}

fn mythacoin_routes() -> ApiRouter {
    Router::new()
        .route("/balance", get(ledger::mythacoin_balance))
        .route("/transactions", get(ledger::mythacoin_transactions))
        .route("/transfer", post(ledger::transfer))
}

fn field_routes() -> ApiRouter {
    let receipts = Router::new()
        .route("/", get(receipts::list).post(receipts::create))
        .route("/upload", post(receipts::upload))
        .route("/scan", post(receipts::scan))
        .route("/stats", get(receipts::stats))
        .route("/export", get(receipts::export))
        .route(
            "/:id",
            get(receipts::get)
                .put(receipts::update)
                .delete(receipts::delete),
        )
        .route("/:id/image", get(receipts::image))
        .route("/:id/approve", post(receipts::approve))
        .route("/:id/reject", post(receipts::reject));

    let daily_reports = Router::new()
        .route("/", get(daily_reports::list).post(daily_reports::create))
        .route("/summary", get(daily_reports::summary))
        .route(
            "/:id",
            get(daily_reports::get)
                .put(daily_reports::update)
                .delete(daily_reports::delete),
        )
        .route("/:id/submit", post(daily_reports::submit));

    let arc_flash = Router::new()
        .route("/calculate", post(arc_flash::calculate))
        .route("/", get(arc_flash::list_studies).post(arc_flash::save_study))
        .route("/:id", get(arc_flash::get_study));

    let switching = Router::new()
        .route("/", get(switching::list).post(switching::create))
        .route("/:id", get(switching::get))
        .route("/:id/transition", post(switching::transition))
        .route(
            "/:id/isolation-points/:index/verify",
            post(switching::verify_isolation_point),
        )
        .route("/:id/grounds/:index/install", post(switching::install_ground))
        .route("/:id/grounds/:index/remove", post(switching::remove_ground));

    Router::new()
        .nest("/receipts", receipts)
        .nest("/daily-reports", daily_reports)
        .nest("/arc-flash", arc_flash)
        .nest("/switching-orders", switching)
        .route_layer(from_fn(middleware::require_company))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    let cors = cors_layer(&state.config.server.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    let api_routes = Router::new()
        .nest("/angry-lips", angry_lips_routes())
        .nest("/social", social_routes())
        .nest("/feed", feed_routes())
        .nest("/sparks", sparks_routes())
        .nest("/mythacoin", mythacoin_routes())
        .nest("/field", field_routes())
        .route_layer(from_fn_with_state(
            Arc::clone(&shared_state),
            middleware::require_auth,
        ));

    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/", get(health::full_health));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("FieldForge API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("FieldForge API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthKeys, AuthUser};
    use crate::config::Config;
    use crate::store::Store;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        keys: AuthKeys,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn token(&self, user: &AuthUser) -> String {
            self.keys.issue(user, 3600).unwrap().0
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            user: Option<&AuthUser>,
            body: Option<&str>,
        ) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            self.router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap()
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_test_app_with(mut config: Config) -> TestApp {
        let dir = tempdir().unwrap();
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        config.auth.jwt_secret = "test-secret".to_string();

        let store = Arc::new(Store::open(&config.storage.database_path()).unwrap());
        let keys = AuthKeys::from_secret(&config.auth.jwt_secret);
        let router = build_router(AppState::new(store, config));

        TestApp {
            router,
            keys,
            _dir: dir,
        }
    }

    fn create_test_app() -> TestApp {
        create_test_app_with(Config::default())
    }

    fn player(id: &str) -> AuthUser {
        AuthUser::new(id)
    }

    fn crew(id: &str, role: &str) -> AuthUser {
        AuthUser::new(id).with_company("acme", role)
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app();
        let response = app.send("GET", "/health/live", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_test_app();
        let response = app.send("GET", "/health/ready", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app();
        let response = app.send("GET", "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = create_test_app();
        let response = app.send("GET", "/api/sparks/balance", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_field_requires_company() {
        let app = create_test_app();
        let response = app
            .send("GET", "/api/field/receipts", Some(&player("u1")), None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_and_fetch_session() {
        let app = create_test_app();
        let host = player("host-1");

        let response = app
            .send(
                "POST",
                "/api/angry-lips/sessions",
                Some(&host),
                Some(r#"{"genre": "heist", "participantIds": ["guest-1"]}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["session"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["session"]["status"], "draft");

        let response = app
            .send("GET", &format!("/api/angry-lips/sessions/{id}"), Some(&host), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["session"]["id"], id.as_str());

        let response = app
            .send("GET", "/api/angry-lips/sessions/missing", Some(&host), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_sessions_rejects_unknown_status() {
        let app = create_test_app();
        let response = app
            .send(
                "GET",
                "/api/angry-lips/sessions?status=sleeping",
                Some(&player("u1")),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_daily_bonus_once_per_day() {
        let app = create_test_app();
        let user = player("u1");

        let response = app
            .send("POST", "/api/sparks/daily-bonus", Some(&user), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["sparksAdded"], 10);
        assert_eq!(body["balance"], 10);

        let response = app
            .send("POST", "/api/sparks/daily-bonus", Some(&user), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Daily bonus already claimed");
    }

    #[tokio::test]
    async fn test_account_summary_is_private() {
        let app = create_test_app();
        let response = app
            .send("GET", "/api/sparks/user/someone-else", Some(&player("u1")), None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send("GET", "/api/sparks/user/u1", Some(&player("u1")), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mythacoin_transfer_to_self_rejected() {
        let app = create_test_app();
        let response = app
            .send(
                "POST",
                "/api/mythacoin/transfer",
                Some(&player("u1")),
                Some(r#"{"toUserId": "u1", "amount": 5}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_realtime_token_scoped_to_user() {
        let app = create_test_app();
        let response = app
            .send("GET", "/api/angry-lips/realtime/token", Some(&player("u1")), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["clientId"], "u1");
        assert_eq!(body["topics"][0], "user.u1");

        // Socket tokens are not API tokens
        let token = body["token"].as_str().unwrap();
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/sparks/balance")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_realtime_token_disabled() {
        let mut config = Config::default();
        config.realtime.enabled = false;
        let app = create_test_app_with(config);

        let response = app
            .send("GET", "/api/angry-lips/realtime/token", Some(&player("u1")), None)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_feed_post_and_like() {
        let app = create_test_app();
        let user = player("u1");

        let response = app
            .send(
                "POST",
                "/api/feed/posts",
                Some(&user),
                Some(r#"{"body": "Finished the vault story"}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let post_id = json_body(response).await["post"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .send("PUT", &format!("/api/feed/posts/{post_id}/like"), Some(&user), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["liked"], true);
        assert_eq!(body["likeCount"], 1);

        let response = app
            .send("GET", "/api/feed?sort=popular", Some(&user), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_arc_flash_calculate() {
        let app = create_test_app();
        let response = app
            .send(
                "POST",
                "/api/field/arc-flash/calculate",
                Some(&crew("u1", "foreman")),
                Some(
                    r#"{"voltage_kv": 0.48, "fault_current_ka": 25, "clearing_time_s": 0.1,
                        "working_distance_in": 18, "gap_mm": 32, "enclosure": "box"}"#,
                ),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["incident_energy"].as_f64().unwrap() > 0.0);
        assert!(body["ppe_category"].is_u64());

        let response = app
            .send(
                "POST",
                "/api/field/arc-flash/calculate",
                Some(&crew("u1", "foreman")),
                Some(
                    r#"{"voltage_kv": 0.48, "fault_current_ka": -1, "clearing_time_s": 0.1,
                        "working_distance_in": 18, "gap_mm": 32, "enclosure": "open"}"#,
                ),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_receipt_review_and_export() {
        let app = create_test_app();
        let foreman = crew("u1", "foreman");
        let manager = crew("m1", "manager");

        let response = app
            .send(
                "POST",
                "/api/field/receipts",
                Some(&foreman),
                Some(
                    r#"{"merchant_name": "Home Depot", "amount": 42.5,
                        "category": "tools", "receipt_date": "2024-03-14"}"#,
                ),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["receipt"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/api/field/receipts/{id}/approve");
        let response = app.send("POST", &uri, Some(&foreman), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send("POST", &uri, Some(&manager), Some(r#"{"notes": "ok"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["receipt"]["status"], "approved");

        let response = app
            .send("GET", "/api/field/receipts/export", Some(&manager), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
    }

    #[tokio::test]
    async fn test_switching_order_approval_requires_manager() {
        let app = create_test_app();
        let foreman = crew("u1", "foreman");

        let response = app
            .send(
                "POST",
                "/api/field/switching-orders",
                Some(&foreman),
                Some(
                    r#"{"affected_circuits": ["FDR-12"],
                        "isolation_points": [{"switch_id": "SW-1", "required_position": "open"}]}"#,
                ),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["order"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/api/field/switching-orders/{id}/transition");
        let response = app
            .send("POST", &uri, Some(&foreman), Some(r#"{"status": "approved"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send("POST", &uri, Some(&foreman), Some(r#"{"status": "completed"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let app = create_test_app();
        let response = app
            .send("POST", "/api/feed/posts", Some(&player("u1")), Some("not json"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
