//! Database models

use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ClientId, HistoryId, RecipientId, TemplateId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Client model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub company_name: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub phone_primary: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create client input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClient {
    pub company_name: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub phone_primary: Option<String>,
}

/// Email template model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: TemplateId,
    pub name: String,
    pub subject: String,
    pub html_content: String,
    pub plain_content: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create email template input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmailTemplate {
    pub name: String,
    pub subject: String,
    pub html_content: String,
    pub plain_content: Option<String>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Stopped,
    Completed,
}

impl CampaignStatus {
    /// Stopped and completed campaigns never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Stopped | CampaignStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Stopped => "stopped",
            CampaignStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "stopped" => Ok(CampaignStatus::Stopped),
            "completed" => Ok(CampaignStatus::Completed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub template_id: Option<TemplateId>,
    pub status: String,
    pub daily_limit: i32,
    pub send_start_hour: i32,
    pub send_end_hour: i32,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_recipients == 0 {
            0.0
        } else {
            (self.sent_count as f64 / self.total_recipients as f64) * 100.0
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub template_id: Option<TemplateId>,
    pub daily_limit: Option<i32>,
    pub send_start_hour: Option<i32>,
    pub send_end_hour: Option<i32>,
    #[serde(default)]
    pub client_ids: Vec<ClientId>,
}

pub const DEFAULT_DAILY_LIMIT: i32 = 10;
pub const DEFAULT_SEND_START_HOUR: i32 = 9;
pub const DEFAULT_SEND_END_HOUR: i32 = 18;

/// Recipient status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    /// Claimed by a running pass, send in flight
    Sending,
    Sent,
    Failed,
    Skipped,
}

impl RecipientStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecipientStatus::Sent | RecipientStatus::Failed | RecipientStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sending => "sending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Failed => "failed",
            RecipientStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecipientStatus::Pending),
            "sending" => Ok(RecipientStatus::Sending),
            "sent" => Ok(RecipientStatus::Sent),
            "failed" => Ok(RecipientStatus::Failed),
            "skipped" => Ok(RecipientStatus::Skipped),
            _ => Err(format!("Invalid recipient status: {}", s)),
        }
    }
}

/// Campaign recipient model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub client_id: ClientId,
    pub status: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl CampaignRecipient {
    /// Get status enum
    pub fn status_enum(&self) -> Option<RecipientStatus> {
        self.status.parse().ok()
    }
}

/// A recipient row claimed for sending, joined with its client
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedRecipient {
    pub recipient_id: RecipientId,
    #[sqlx(flatten)]
    pub client: Client,
}

/// Per-status recipient counts for one campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientStatusCounts {
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl RecipientStatusCounts {
    /// Recipients that may still be sent
    pub fn outstanding(&self) -> i64 {
        self.pending + self.sending
    }

    pub fn total(&self) -> i64 {
        self.pending + self.sending + self.sent + self.failed + self.skipped
    }

    pub(crate) fn add(&mut self, status: RecipientStatus, count: i64) {
        match status {
            RecipientStatus::Pending => self.pending += count,
            RecipientStatus::Sending => self.sending += count,
            RecipientStatus::Sent => self.sent += count,
            RecipientStatus::Failed => self.failed += count,
            RecipientStatus::Skipped => self.skipped += count,
        }
    }
}

/// Email history record, one per successful send
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct EmailHistoryRecord {
    pub id: HistoryId,
    pub client_id: ClientId,
    pub campaign_id: Option<CampaignId>,
    pub template_id: Option<TemplateId>,
    pub subject: Option<String>,
    pub content_preview: Option<String>,
    pub provider_message_id: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

/// New email history input
#[derive(Debug, Clone)]
pub struct NewEmailHistory {
    pub client_id: ClientId,
    pub campaign_id: Option<CampaignId>,
    pub template_id: Option<TemplateId>,
    pub subject: String,
    pub content_preview: String,
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}
