//! Campaign lifecycle - operator actions on campaigns
//!
//! Passes only ever move a campaign from active to completed. Everything else
//! (launch, pause, resume, stop, recipient changes, deletion) goes through
//! [`CampaignManager`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ClientId, HistoryId};
use outreach_storage::models::{
    Campaign, CampaignStatus, CreateCampaign, RecipientStatusCounts,
};
use outreach_storage::repository::Repositories;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::daily_cap::local_midnight;
use crate::clock::{Clock, SystemClock};

/// Default number of history rows returned by [`CampaignManager::activity`]
pub const DEFAULT_ACTIVITY_LIMIT: i64 = 20;
const MAX_ACTIVITY_LIMIT: i64 = 200;

/// Campaign lifecycle errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign is already active")]
    AlreadyActive,

    #[error("Campaign must have a template assigned")]
    NoTemplate,

    #[error("Campaign must have at least one recipient")]
    NoRecipients,

    #[error("Cannot {action} a campaign that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] outreach_common::Error),
}

pub type CampaignResult<T> = std::result::Result<T, CampaignError>;

/// A campaign with its recipient breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub template_name: Option<String>,
    pub recipients: RecipientStatusCounts,
    pub progress_percentage: f64,
}

/// One sent email with the client it went to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: HistoryId,
    pub client_id: ClientId,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

/// Recent sends for a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignActivity {
    pub campaign_id: CampaignId,
    pub sent_today: i64,
    pub recent: Vec<ActivityEntry>,
}

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl CampaignManager {
    pub fn new(repos: Repositories) -> Self {
        Self {
            repos,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    async fn load(&self, id: CampaignId) -> CampaignResult<Campaign> {
        self.repos
            .campaigns
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    /// Create a draft campaign with its initial recipients
    pub async fn create(&self, input: CreateCampaign) -> CampaignResult<Campaign> {
        validate_new_campaign(&input)?;

        let campaign = self.repos.campaigns.create(input).await?;
        info!(
            campaign_id = %campaign.id,
            campaign = %campaign.name,
            recipients = campaign.total_recipients,
            "Campaign created"
        );
        Ok(campaign)
    }

    pub async fn get(&self, id: CampaignId) -> CampaignResult<Campaign> {
        self.load(id).await
    }

    /// Campaign with template name and per-status recipient counts
    pub async fn detail(&self, id: CampaignId) -> CampaignResult<CampaignDetail> {
        let campaign = self.load(id).await?;
        let template_name = match campaign.template_id {
            Some(template_id) => self
                .repos
                .templates
                .get(template_id)
                .await?
                .map(|t| t.name),
            None => None,
        };
        let recipients = self.repos.recipients.status_counts(id).await?;

        Ok(CampaignDetail {
            progress_percentage: campaign.progress_percentage(),
            campaign,
            template_name,
            recipients,
        })
    }

    /// Replace the whole recipient set. Send history is kept.
    pub async fn replace_recipients(
        &self,
        id: CampaignId,
        client_ids: &[ClientId],
    ) -> CampaignResult<Campaign> {
        let campaign = self.load(id).await?;
        // Active passes may hold claims on the current rows
        if let Some(status) = campaign.status_enum() {
            if status == CampaignStatus::Active || status.is_terminal() {
                return Err(CampaignError::InvalidTransition {
                    action: "change recipients of",
                    status: campaign.status,
                });
            }
        }

        let updated = self.repos.campaigns.replace_recipients(id, client_ids).await?;
        info!(
            campaign_id = %id,
            recipients = updated.total_recipients,
            "Campaign recipients replaced"
        );
        Ok(updated)
    }

    /// draft/scheduled -> active
    pub async fn launch(&self, id: CampaignId) -> CampaignResult<Campaign> {
        let campaign = self.load(id).await?;
        match campaign.status_enum() {
            Some(CampaignStatus::Active) => return Err(CampaignError::AlreadyActive),
            Some(CampaignStatus::Draft) | Some(CampaignStatus::Scheduled) => {}
            _ => {
                return Err(CampaignError::InvalidTransition {
                    action: "launch",
                    status: campaign.status,
                })
            }
        }
        if campaign.template_id.is_none() {
            return Err(CampaignError::NoTemplate);
        }
        if campaign.total_recipients <= 0 {
            return Err(CampaignError::NoRecipients);
        }

        let launched = self
            .transition(
                &campaign,
                "launch",
                &[CampaignStatus::Draft, CampaignStatus::Scheduled],
                CampaignStatus::Active,
            )
            .await?;
        info!(
            campaign_id = %id,
            campaign = %launched.name,
            recipients = launched.total_recipients,
            "Campaign launched"
        );
        Ok(launched)
    }

    /// active -> paused
    pub async fn pause(&self, id: CampaignId) -> CampaignResult<Campaign> {
        let campaign = self.load(id).await?;
        let paused = self
            .transition(
                &campaign,
                "pause",
                &[CampaignStatus::Active],
                CampaignStatus::Paused,
            )
            .await?;
        info!(campaign_id = %id, "Campaign paused");
        Ok(paused)
    }

    /// paused -> active
    pub async fn resume(&self, id: CampaignId) -> CampaignResult<Campaign> {
        let campaign = self.load(id).await?;
        let resumed = self
            .transition(
                &campaign,
                "resume",
                &[CampaignStatus::Paused],
                CampaignStatus::Active,
            )
            .await?;
        info!(campaign_id = %id, "Campaign resumed");
        Ok(resumed)
    }

    /// active/paused -> stopped
    pub async fn stop(&self, id: CampaignId) -> CampaignResult<Campaign> {
        let campaign = self.load(id).await?;
        let stopped = self
            .transition(
                &campaign,
                "stop",
                &[CampaignStatus::Active, CampaignStatus::Paused],
                CampaignStatus::Stopped,
            )
            .await?;
        info!(campaign_id = %id, sent = stopped.sent_count, "Campaign stopped");
        Ok(stopped)
    }

    /// Delete a campaign and its recipients
    pub async fn delete(&self, id: CampaignId) -> CampaignResult<()> {
        if !self.repos.campaigns.delete(id).await? {
            return Err(CampaignError::NotFound);
        }
        info!(campaign_id = %id, "Campaign deleted");
        Ok(())
    }

    /// Recent sends joined with their clients, plus today's sent count
    pub async fn activity(
        &self,
        id: CampaignId,
        limit: Option<i64>,
    ) -> CampaignResult<CampaignActivity> {
        let campaign = self.load(id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT);

        let history = self.repos.history.recent_for_campaign(id, limit).await?;
        let mut recent = Vec::with_capacity(history.len());
        for record in history {
            let client = self.repos.clients.get(record.client_id).await?;
            let (company_name, email) = match client {
                Some(c) => (c.company_name, c.email),
                None => (None, None),
            };
            recent.push(ActivityEntry {
                id: record.id,
                client_id: record.client_id,
                company_name,
                email,
                subject: record.subject,
                status: record.status,
                sent_at: record.sent_at,
                opened_at: record.opened_at,
                clicked_at: record.clicked_at,
            });
        }

        let sent_today = self
            .repos
            .recipients
            .count_sent_since(campaign.id, local_midnight(self.clock.now()))
            .await?;

        Ok(CampaignActivity {
            campaign_id: campaign.id,
            sent_today,
            recent,
        })
    }

    /// Conditional transition; a concurrent change between load and update is
    /// reported against the status the campaign actually has now
    async fn transition(
        &self,
        campaign: &Campaign,
        action: &'static str,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> CampaignResult<Campaign> {
        if !from.iter().any(|s| campaign.status == s.as_str()) {
            return Err(CampaignError::InvalidTransition {
                action,
                status: campaign.status.clone(),
            });
        }

        match self
            .repos
            .campaigns
            .transition(campaign.id, from, to, self.now())
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                let current = self.load(campaign.id).await?;
                Err(CampaignError::InvalidTransition {
                    action,
                    status: current.status,
                })
            }
        }
    }
}

fn validate_new_campaign(input: &CreateCampaign) -> CampaignResult<()> {
    if input.name.trim().is_empty() {
        return Err(CampaignError::Validation(
            "Campaign name is required".to_string(),
        ));
    }
    if let Some(limit) = input.daily_limit {
        if limit <= 0 {
            return Err(CampaignError::Validation(
                "daily_limit must be greater than zero".to_string(),
            ));
        }
    }
    for (field, hour) in [
        ("send_start_hour", input.send_start_hour),
        ("send_end_hour", input.send_end_hour),
    ] {
        if let Some(hour) = hour {
            if !(0..=23).contains(&hour) {
                return Err(CampaignError::Validation(format!(
                    "{} must be between 0 and 23",
                    field
                )));
            }
        }
    }
    Ok(())
}
