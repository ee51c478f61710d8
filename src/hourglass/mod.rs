//! Hourglass
//!
//! Background worker enforcing Angry Lips response windows. Each pass
//! scans the open turns of active sessions, notifies the assignee when a
//! turn opens, warns shortly before it expires and, once it has expired,
//! either lets the AI co-host fill the blank and moves on or asks the host
//! to step in.

pub mod notify;

pub use notify::{
    format_duration, turn_url, Channel, DiscordWebhookNotifier, HubNotifier, NoticeKind,
    NotificationDispatcher, Notifier, NotifyError, Recipient, RelayWebhookNotifier, TurnNotice,
};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::angry_lips::model::default_handle;
use crate::angry_lips::{Actor, Session, SessionRepository, TimeoutStrategy, Turn};
use crate::config::HourglassConfig;
use crate::social::SocialRepository;
use crate::store::{StoreError, StoreResult};

/// Marker stored in `notified_channels` once the warning went out
const WARNING_MARK: &str = "warning";
/// Marker stored once the host was asked to override
const TIMEOUT_MARK: &str = "timeout";

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub scanned: usize,
    pub expirations_set: usize,
    pub notified: usize,
    pub warned: usize,
    pub timed_out: usize,
    pub auto_filled: usize,
}

pub struct Hourglass {
    sessions: SessionRepository,
    social: SocialRepository,
    dispatcher: Arc<NotificationDispatcher>,
    config: HourglassConfig,
    running: Arc<AtomicBool>,
    pass: Mutex<()>,
}

impl Hourglass {
    pub fn new(
        sessions: SessionRepository,
        social: SocialRepository,
        dispatcher: Arc<NotificationDispatcher>,
        config: HourglassConfig,
    ) -> Self {
        Self {
            sessions,
            social,
            dispatcher,
            config,
            running: Arc::new(AtomicBool::new(false)),
            pass: Mutex::new(()),
        }
    }

    /// Tick every `interval_secs` until [`Hourglass::stop`] is called
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let worker = self.clone();
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                interval_secs = worker.config.interval_secs,
                batch_size = worker.config.batch_size,
                "Hourglass started"
            );

            let period = std::time::Duration::from_secs(worker.config.interval_secs.max(1));
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                if !worker.running.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = worker.run_once().await {
                    tracing::error!(error = %e, "Hourglass pass failed");
                }
            }

            tracing::info!("Hourglass stopped");
        })
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a single pass; a pass already in flight makes this a no-op
    pub async fn run_once(&self) -> StoreResult<PassReport> {
        let Ok(_guard) = self.pass.try_lock() else {
            tracing::debug!("Hourglass pass already running, skipping");
            return Ok(PassReport::default());
        };

        let batch = i64::try_from(self.config.batch_size).unwrap_or(i64::MAX);
        let due = self.sessions.due_turns(batch)?;
        let mut report = PassReport {
            scanned: due.len(),
            ..Default::default()
        };

        for (session, turn) in due {
            if let Err(e) = self.process(&session, turn, &mut report).await {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Hourglass could not process turn"
                );
            }
        }

        if report != PassReport::default() {
            tracing::info!(
                scanned = report.scanned,
                expirations_set = report.expirations_set,
                notified = report.notified,
                warned = report.warned,
                timed_out = report.timed_out,
                auto_filled = report.auto_filled,
                "Hourglass pass complete"
            );
        }
        Ok(report)
    }

    async fn process(&self, session: &Session, mut turn: Turn, report: &mut PassReport) -> StoreResult<()> {
        let now = Utc::now();
        let expires_at = match turn.expires_at {
            Some(expires_at) => expires_at,
            None => {
                let start = turn.due_at.unwrap_or(turn.created_at);
                let expires_at = start + Duration::minutes(session.response_window_minutes);
                self.sessions.set_expiration(&turn.id, expires_at)?;
                turn.expires_at = Some(expires_at);
                report.expirations_set += 1;
                expires_at
            }
        };
        let remaining = remaining_secs(expires_at, now);
        let assignee = self.recipient(session, &turn)?;
        let url = turn_url(&self.config.app_base_url, &turn.id);

        if turn.notified_channels.is_empty() {
            let notice = self.notice(session, &turn, NoticeKind::TurnPrompt, remaining, &url);
            let delivered = self.dispatcher.dispatch(&assignee, &notice).await;
            let names: Vec<String> = delivered.iter().map(|c| c.as_str().to_string()).collect();
            turn.notified_channels = self.sessions.record_notified(&turn.id, &names)?;
            report.notified += 1;
        }

        if remaining > 0 {
            if remaining <= self.config.warning_threshold_secs && !self.marked(&turn, WARNING_MARK) {
                let notice = self.notice(session, &turn, NoticeKind::Warning, remaining, &url);
                self.dispatcher.dispatch(&assignee, &notice).await;
                self.sessions.record_notified(&turn.id, &[WARNING_MARK.to_string()])?;
                report.warned += 1;
            }
            return Ok(());
        }

        let host_decides =
            session.timeout_strategy == TimeoutStrategy::HostOverride || !session.allow_ai_cohost;
        if host_decides {
            if !self.marked(&turn, TIMEOUT_MARK) {
                let host = self.contact(&session.host_id, None)?;
                let notice = self.notice(session, &turn, NoticeKind::Timeout { fill: None }, 0, &url);
                self.dispatcher.dispatch(&host, &notice).await;
                self.sessions.record_notified(&turn.id, &[TIMEOUT_MARK.to_string()])?;
                report.timed_out += 1;
            }
            return Ok(());
        }

        let filled = match self
            .sessions
            .auto_fill_turn(&turn.id, Actor::System, None, Some("ai"))
            .await
        {
            Ok(filled) => filled,
            Err(StoreError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        report.timed_out += 1;
        report.auto_filled += 1;

        let notice = self.notice(
            session,
            &turn,
            NoticeKind::Timeout {
                fill: filled.auto_fill_text.clone(),
            },
            0,
            &url,
        );
        self.dispatcher.dispatch(&assignee, &notice).await;

        self.sessions
            .advance_turn(&session.id, Actor::System, Some(&turn.id))?;
        Ok(())
    }

    fn marked(&self, turn: &Turn, mark: &str) -> bool {
        turn.notified_channels.iter().any(|c| c == mark)
    }

    fn notice(
        &self,
        session: &Session,
        turn: &Turn,
        kind: NoticeKind,
        remaining_secs: i64,
        url: &str,
    ) -> TurnNotice {
        TurnNotice {
            kind,
            story_title: session.title.clone(),
            prompt: turn.prompt.clone(),
            remaining_secs,
            url: url.to_string(),
        }
    }

    fn recipient(&self, session: &Session, turn: &Turn) -> StoreResult<Recipient> {
        let user_id = turn.assigned_user_id.as_deref().unwrap_or(&session.host_id);
        self.contact(user_id, turn.assigned_handle.as_deref())
    }

    fn contact(&self, user_id: &str, handle: Option<&str>) -> StoreResult<Recipient> {
        let profile = self.social.get_profile(user_id)?;
        let handle = handle
            .map(str::to_string)
            .or_else(|| {
                profile
                    .as_ref()
                    .and_then(|p| p.username.as_ref())
                    .map(|u| format!("@{}", u))
            })
            .unwrap_or_else(|| default_handle(user_id));

        Ok(match profile {
            Some(profile) => Recipient {
                user_id: user_id.to_string(),
                handle,
                email: profile.email,
                phone: profile.phone,
                discord_handle: profile.discord_handle,
            },
            None => Recipient {
                user_id: user_id.to_string(),
                handle,
                ..Default::default()
            },
        })
    }
}

/// Seconds left before `expires_at`, negative once it has passed
pub fn remaining_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds()
}
