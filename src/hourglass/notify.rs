//! Turn notifications
//!
//! One [`Notifier`] per channel. `web` goes through the realtime hub and is
//! always available; Discord uses an incoming webhook; email and SMS are
//! posted to a relay webhook that owns the actual delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::NotificationsConfig;
use crate::realtime::{ConnectionHub, WsEvent};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook rejected notification: {status}")]
    Rejected { status: u16 },

    #[error("Recipient has no {0} address")]
    NoAddress(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Discord,
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Discord => "discord",
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

/// Who a notice goes to and how to reach them
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub user_id: String,
    pub handle: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub discord_handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The turn just opened
    TurnPrompt,
    Warning,
    /// The window ran out; `fill` is what the AI co-host wrote, if anything
    Timeout { fill: Option<String> },
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::TurnPrompt => "angry_lips_turn",
            NoticeKind::Warning => "angry_lips_warning",
            NoticeKind::Timeout { .. } => "angry_lips_timeout",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnNotice {
    pub kind: NoticeKind,
    pub story_title: String,
    pub prompt: String,
    pub remaining_secs: i64,
    pub url: String,
}

/// `1h 5m`, `4m 10s` or `42s`; negative values read as zero
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn turn_url(base: &str, turn_id: &str) -> String {
    format!("{}/angry-lips/turn/{}", base.trim_end_matches('/'), turn_id)
}

impl TurnNotice {
    fn countdown(&self) -> String {
        format_duration(self.remaining_secs)
    }

    pub fn web_title(&self) -> String {
        match &self.kind {
            NoticeKind::TurnPrompt => "It's your turn".to_string(),
            NoticeKind::Warning => format!("{} left on your turn", self.countdown()),
            NoticeKind::Timeout { .. } => "Hourglass expired".to_string(),
        }
    }

    pub fn web_body(&self) -> String {
        match &self.kind {
            NoticeKind::TurnPrompt | NoticeKind::Warning => {
                format!("{}: {} ({} left)", self.story_title, self.prompt, self.countdown())
            }
            NoticeKind::Timeout { fill: Some(fill) } => {
                format!("{}: the AI co-host filled the blank with \"{}\".", self.story_title, fill)
            }
            NoticeKind::Timeout { fill: None } => {
                format!("{}: host override needed to keep the story moving.", self.story_title)
            }
        }
    }

    pub fn discord_content(&self, handle: &str) -> String {
        match &self.kind {
            NoticeKind::TurnPrompt => {
                format!("⏳ **{}** left · {}, it's your turn!", self.countdown(), handle)
            }
            NoticeKind::Warning => format!("⚠️ **{}** left!", self.countdown()),
            NoticeKind::Timeout { fill } => {
                let outcome = match fill {
                    Some(fill) => format!("AI co-host filled the blank with:\n> {}", fill),
                    None => "Host override needed to keep the story moving.".to_string(),
                };
                format!("⌛ Hourglass expired for **{}**\n{}", self.story_title, outcome)
            }
        }
    }

    pub fn sms_text(&self) -> String {
        match &self.kind {
            NoticeKind::TurnPrompt => format!(
                "Angry Lips: {} ({} left) → {}",
                self.prompt,
                self.countdown(),
                self.url
            ),
            NoticeKind::Warning => format!(
                "Angry Lips: {} left! {} → {}",
                self.countdown(),
                self.prompt,
                self.url
            ),
            NoticeKind::Timeout { fill: Some(fill) } => {
                format!("Angry Lips: timer expired. AI filled with \"{}\".", fill)
            }
            NoticeKind::Timeout { fill: None } => {
                "Angry Lips: timer expired. Host override needed.".to_string()
            }
        }
    }

    pub fn email_subject(&self) -> String {
        match &self.kind {
            NoticeKind::Timeout { .. } => format!("Angry Lips – hourglass expired ({})", self.story_title),
            _ => format!("Angry Lips – {} left ({})", self.countdown(), self.story_title),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    /// Whether this recipient can be reached on the channel
    fn reaches(&self, recipient: &Recipient) -> bool;

    async fn send(&self, recipient: &Recipient, notice: &TurnNotice) -> Result<(), NotifyError>;
}

/// In-app notifications on the recipient's `user.<id>` topic
pub struct HubNotifier {
    hub: Arc<ConnectionHub>,
}

impl HubNotifier {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Notifier for HubNotifier {
    fn channel(&self) -> Channel {
        Channel::Web
    }

    fn reaches(&self, _recipient: &Recipient) -> bool {
        true
    }

    async fn send(&self, recipient: &Recipient, notice: &TurnNotice) -> Result<(), NotifyError> {
        self.hub.publish(WsEvent::notification(
            &recipient.user_id,
            notice.kind.as_str(),
            &notice.web_title(),
            &notice.web_body(),
            Some(notice.url.clone()),
        ));
        Ok(())
    }
}

fn http_client(timeout_ms: u64) -> Result<Client, NotifyError> {
    Ok(Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

async fn post_json(client: &Client, url: &str, body: &serde_json::Value) -> Result<(), NotifyError> {
    let response = client.post(url).json(body).send().await?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(NotifyError::Rejected {
            status: response.status().as_u16(),
        })
    }
}

pub struct DiscordWebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout_ms: u64) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client(timeout_ms)?,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordWebhookNotifier {
    fn channel(&self) -> Channel {
        Channel::Discord
    }

    fn reaches(&self, recipient: &Recipient) -> bool {
        recipient.discord_handle.as_deref().is_some_and(|h| !h.trim().is_empty())
    }

    async fn send(&self, recipient: &Recipient, notice: &TurnNotice) -> Result<(), NotifyError> {
        let mention = recipient
            .discord_handle
            .as_deref()
            .ok_or(NotifyError::NoAddress("discord"))?;
        let body = json!({
            "content": notice.discord_content(mention),
            "embeds": [{
                "title": notice.story_title,
                "description": notice.prompt,
                "url": notice.url,
            }],
        });
        post_json(&self.client, &self.webhook_url, &body).await
    }
}

/// Email or SMS through the delivery relay
pub struct RelayWebhookNotifier {
    client: Client,
    webhook_url: String,
    channel: Channel,
}

impl RelayWebhookNotifier {
    pub fn email(webhook_url: impl Into<String>, timeout_ms: u64) -> Result<Self, NotifyError> {
        Self::new(webhook_url, timeout_ms, Channel::Email)
    }

    pub fn sms(webhook_url: impl Into<String>, timeout_ms: u64) -> Result<Self, NotifyError> {
        Self::new(webhook_url, timeout_ms, Channel::Sms)
    }

    fn new(webhook_url: impl Into<String>, timeout_ms: u64, channel: Channel) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client(timeout_ms)?,
            webhook_url: webhook_url.into(),
            channel,
        })
    }

    fn address<'a>(&self, recipient: &'a Recipient) -> Option<&'a str> {
        let address = match self.channel {
            Channel::Sms => recipient.phone.as_deref(),
            _ => recipient.email.as_deref(),
        };
        address.filter(|a| !a.trim().is_empty())
    }
}

#[async_trait]
impl Notifier for RelayWebhookNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn reaches(&self, recipient: &Recipient) -> bool {
        self.address(recipient).is_some()
    }

    async fn send(&self, recipient: &Recipient, notice: &TurnNotice) -> Result<(), NotifyError> {
        let to = self
            .address(recipient)
            .ok_or(NotifyError::NoAddress(self.channel.as_str()))?;
        let body = match self.channel {
            Channel::Sms => json!({
                "channel": "sms",
                "to": to,
                "text": notice.sms_text(),
            }),
            _ => json!({
                "channel": "email",
                "to": to,
                "subject": notice.email_subject(),
                "text": format!("{}\n\n{}", notice.web_body(), notice.url),
            }),
        };
        post_json(&self.client, &self.webhook_url, &body).await
    }
}

/// Fans a notice out to every channel that reaches the recipient
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Web always; Discord, email and SMS when their webhooks are configured
    pub fn from_config(config: &NotificationsConfig, hub: Arc<ConnectionHub>) -> Self {
        let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(HubNotifier::new(hub))];
        let timeout = config.request_timeout_ms;

        if let Some(url) = config.discord_webhook_url.as_deref().filter(|u| !u.is_empty()) {
            match DiscordWebhookNotifier::new(url, timeout) {
                Ok(notifier) => notifiers.push(Arc::new(notifier)),
                Err(e) => tracing::warn!(error = %e, "Discord notifier disabled"),
            }
        }
        if let Some(url) = config.relay_webhook_url.as_deref().filter(|u| !u.is_empty()) {
            for built in [RelayWebhookNotifier::email(url, timeout), RelayWebhookNotifier::sms(url, timeout)] {
                match built {
                    Ok(notifier) => notifiers.push(Arc::new(notifier)),
                    Err(e) => tracing::warn!(error = %e, "Relay notifier disabled"),
                }
            }
        }

        Self::new(notifiers)
    }

    pub fn channels_for(&self, recipient: &Recipient) -> Vec<Channel> {
        self.notifiers
            .iter()
            .filter(|n| n.reaches(recipient))
            .map(|n| n.channel())
            .collect()
    }

    /// Send on every reachable channel, returning the ones that succeeded
    pub async fn dispatch(&self, recipient: &Recipient, notice: &TurnNotice) -> Vec<Channel> {
        let mut delivered = Vec::new();
        for notifier in self.notifiers.iter().filter(|n| n.reaches(recipient)) {
            match notifier.send(recipient, notice).await {
                Ok(()) => delivered.push(notifier.channel()),
                Err(e) => tracing::warn!(
                    channel = notifier.channel().as_str(),
                    user_id = %recipient.user_id,
                    error = %e,
                    "Turn notification failed"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{HubConfig, ServerMessage};

    fn notice(kind: NoticeKind, remaining: i64) -> TurnNotice {
        TurnNotice {
            kind,
            story_title: "Heist Party".into(),
            prompt: "Animal".into(),
            remaining_secs: remaining,
            url: turn_url("https://app.test/", "t1"),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(250), "4m 10s");
        assert_eq!(format_duration(3900), "1h 5m");
        assert_eq!(format_duration(-5), "0s");
    }

    #[test]
    fn test_turn_url_trims_slash() {
        assert_eq!(turn_url("https://app.test/", "t1"), "https://app.test/angry-lips/turn/t1");
        assert_eq!(turn_url("https://app.test", "t1"), "https://app.test/angry-lips/turn/t1");
    }

    #[test]
    fn test_message_texts() {
        let prompt = notice(NoticeKind::TurnPrompt, 300);
        assert_eq!(prompt.discord_content("@nova"), "⏳ **5m 0s** left · @nova, it's your turn!");
        assert_eq!(
            prompt.sms_text(),
            "Angry Lips: Animal (5m 0s left) → https://app.test/angry-lips/turn/t1"
        );
        assert_eq!(prompt.email_subject(), "Angry Lips – 5m 0s left (Heist Party)");

        let warning = notice(NoticeKind::Warning, 45);
        assert_eq!(warning.discord_content("@nova"), "⚠️ **45s** left!");

        let filled = notice(NoticeKind::Timeout { fill: Some("llama".into()) }, 0);
        assert_eq!(filled.sms_text(), "Angry Lips: timer expired. AI filled with \"llama\".");
        let manual = notice(NoticeKind::Timeout { fill: None }, 0);
        assert!(manual.discord_content("@h").contains("Host override needed"));
    }

    #[tokio::test]
    async fn test_dispatcher_channels_follow_config_and_profile() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let config = NotificationsConfig {
            discord_webhook_url: Some("http://127.0.0.1:9/discord".into()),
            relay_webhook_url: None,
            request_timeout_ms: 200,
        };
        let dispatcher = NotificationDispatcher::from_config(&config, hub.clone());

        let plain = Recipient {
            user_id: "u1".into(),
            email: Some("u1@example.com".into()),
            ..Default::default()
        };
        assert_eq!(dispatcher.channels_for(&plain), vec![Channel::Web]);

        let gamer = Recipient {
            discord_handle: Some("nova#1".into()),
            ..plain.clone()
        };
        assert_eq!(dispatcher.channels_for(&gamer), vec![Channel::Web, Channel::Discord]);

        let mut rx = hub.subscribe_broadcast();
        let delivered = dispatcher.dispatch(&gamer, &notice(NoticeKind::TurnPrompt, 60)).await;
        assert_eq!(delivered, vec![Channel::Web]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.topic, "user.u1");
        assert!(matches!(event.message, ServerMessage::Notification { .. }));
    }
}
