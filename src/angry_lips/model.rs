//! Angry Lips records and request inputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::template::{GeneratedTemplate, TemplateLength, TemplateSource};
use crate::store::text_enum;

text_enum!(SessionStatus {
    Draft => "draft",
    Active => "active",
    Completed => "completed",
});

text_enum!(ParticipantRole {
    Host => "host",
    Player => "player",
});

text_enum!(ParticipantStatus {
    Invited => "invited",
    Accepted => "accepted",
    Declined => "declined",
    Left => "left",
});

text_enum!(
    /// `pending` is the only unfinished state
    TurnStatus {
        Pending => "pending",
        Submitted => "submitted",
        AutoFilled => "auto_filled",
        Skipped => "skipped",
    }
);

text_enum!(TimeoutStrategy {
    AiAutofill => "ai_autofill",
    HostOverride => "host_override",
});

text_enum!(
    /// Who may read a vault entry
    Visibility {
        InviteOnly => "invite_only",
        Public => "public",
        Private => "private",
    }
);

text_enum!(InvitationAction {
    Accept => "accept",
    Decline => "decline",
    Leave => "leave",
});

impl InvitationAction {
    pub fn resulting_status(&self) -> ParticipantStatus {
        match self {
            InvitationAction::Accept => ParticipantStatus::Accepted,
            InvitationAction::Decline => ParticipantStatus::Declined,
            InvitationAction::Leave => ParticipantStatus::Left,
        }
    }
}

impl TurnStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TurnStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub host_id: String,
    pub title: String,
    pub genre: Option<String>,
    pub status: SessionStatus,
    pub template_source: String,
    pub template_length: String,
    pub template_text: String,
    pub seed_text: Option<String>,
    pub response_window_minutes: i64,
    pub allow_ai_cohost: bool,
    pub vault_mode: Visibility,
    pub timeout_strategy: TimeoutStrategy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub session_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub status: ParticipantStatus,
    pub handle: Option<String>,
    pub invited_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Counts toward turn assignment
    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Accepted || self.role == ParticipantRole::Host
    }

    pub fn display_handle(&self) -> String {
        self.handle
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| default_handle(&self.user_id))
    }
}

/// `@` plus the first six characters of the user id
pub fn default_handle(user_id: &str) -> String {
    format!("@{}", user_id.chars().take(6).collect::<String>())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEvent {
    pub id: String,
    pub turn_id: String,
    pub session_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    pub order_index: i64,
    pub status: TurnStatus,
    pub prompt: String,
    pub part_of_speech: Option<String>,
    pub creative_nudge: Option<String>,
    pub placeholder: Option<String>,
    pub assigned_user_id: Option<String>,
    pub assigned_handle: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub submitted_text: Option<String>,
    pub submission_handle: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub auto_fill_text: Option<String>,
    pub auto_filled: bool,
    pub completed_by: Option<String>,
    pub notified_channels: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<TurnEvent>,
}

impl Turn {
    /// Text that fills this turn's blank, if any
    pub fn fill(&self) -> Option<&str> {
        self.submitted_text
            .as_deref()
            .or(self.auto_fill_text.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Session with its roster, and turns when loaded in full
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub turns: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub story_text: String,
    pub ai_story_text: Option<String>,
    pub summary_text: Option<String>,
    pub theme_prompt: Option<String>,
    pub visibility: Visibility,
    pub published_at: Option<DateTime<Utc>>,
    pub published_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public vault entry with its session and host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEntry {
    #[serde(flatten)]
    pub entry: VaultEntry,
    pub session_title: String,
    pub genre: Option<String>,
    pub host_id: String,
    pub host_username: Option<String>,
    pub host_display_name: Option<String>,
}

/// A freshly created session and the template it was built from
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session: SessionDetail,
    pub template: GeneratedTemplate,
}

/// Input for a new session
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub template_source: Option<String>,
    pub template_length: Option<String>,
    pub seed_text: Option<String>,
    pub response_window_minutes: Option<i64>,
    pub allow_ai_cohost: Option<bool>,
    pub vault_mode: Option<Visibility>,
    pub timeout_strategy: Option<TimeoutStrategy>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

impl NewSession {
    pub fn source(&self) -> TemplateSource {
        TemplateSource::normalize(self.template_source.as_deref())
    }

    pub fn length(&self) -> TemplateLength {
        TemplateLength::normalize(self.template_length.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    /// Sessions this user hosts or was invited to
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

/// Who is moving the session forward
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    User(&'a str),
    /// The Hourglass worker
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trip_names() {
        assert_eq!(TurnStatus::AutoFilled.as_str(), "auto_filled");
        assert_eq!(TurnStatus::parse("skipped"), Some(TurnStatus::Skipped));
        assert_eq!(Visibility::parse("invite_only"), Some(Visibility::InviteOnly));
        assert_eq!(InvitationAction::parse("maybe"), None);

        let json = serde_json::to_string(&TimeoutStrategy::HostOverride).unwrap();
        assert_eq!(json, "\"host_override\"");
    }

    #[test]
    fn test_default_handle() {
        assert_eq!(default_handle("abcdef123"), "@abcdef");
        assert_eq!(default_handle("ab"), "@ab");
    }
}
