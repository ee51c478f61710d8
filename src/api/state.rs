//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::angry_lips::{build_narrator, Narrator, SessionRepository};
use crate::auth::AuthKeys;
use crate::config::Config;
use crate::feed::FeedRepository;
use crate::field::{
    ArcFlashRepository, DailyReportRepository, ReceiptRepository, SwitchingRepository,
};
use crate::hourglass::{Hourglass, NotificationDispatcher};
use crate::ledger::Ledger;
use crate::realtime::{ConnectionHub, HubConfig};
use crate::social::SocialRepository;
use crate::store::Store;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub auth: Arc<AuthKeys>,
    /// WebSocket connection hub for realtime fan-out
    pub hub: Arc<ConnectionHub>,
    pub narrator: Arc<dyn Narrator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sessions: Arc<SessionRepository>,
    pub ledger: Arc<Ledger>,
    pub social: Arc<SocialRepository>,
    pub feed: Arc<FeedRepository>,
    pub receipts: Arc<ReceiptRepository>,
    pub daily_reports: Arc<DailyReportRepository>,
    pub arc_flash: Arc<ArcFlashRepository>,
    pub switching: Arc<SwitchingRepository>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire every repository onto one store
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        let hub = Arc::new(ConnectionHub::new(HubConfig {
            max_connections: config.realtime.max_connections,
            ..HubConfig::default()
        }));
        let narrator = build_narrator(&config.narrator);
        let dispatcher = Arc::new(NotificationDispatcher::from_config(
            &config.notifications,
            Arc::clone(&hub),
        ));

        let feed = FeedRepository::new(Arc::clone(&store), Arc::clone(&hub));
        let sessions = SessionRepository::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            feed.clone(),
            Arc::clone(&narrator),
        );
        let social = SocialRepository::new(Arc::clone(&store), feed.clone());

        Self {
            auth: Arc::new(AuthKeys::from_secret(&config.auth.jwt_secret)),
            config: Arc::new(config),
            hub,
            narrator,
            dispatcher,
            sessions: Arc::new(sessions),
            ledger: Arc::new(Ledger::new(Arc::clone(&store))),
            social: Arc::new(social),
            feed: Arc::new(feed),
            receipts: Arc::new(ReceiptRepository::new(Arc::clone(&store))),
            daily_reports: Arc::new(DailyReportRepository::new(Arc::clone(&store))),
            arc_flash: Arc::new(ArcFlashRepository::new(Arc::clone(&store))),
            switching: Arc::new(SwitchingRepository::new(Arc::clone(&store))),
            store,
            start_time: Instant::now(),
        }
    }

    /// Build the expiry worker over this state's repositories
    pub fn hourglass(&self) -> Hourglass {
        Hourglass::new(
            (*self.sessions).clone(),
            (*self.social).clone(),
            Arc::clone(&self.dispatcher),
            self.config.hourglass.clone(),
        )
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}
