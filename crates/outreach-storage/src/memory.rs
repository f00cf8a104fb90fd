//! In-memory store
//!
//! Implements every repository trait over shared state behind a tokio `RwLock`.
//! Used by tests and by deployments that run without a database. It mirrors the
//! PostgreSQL constraints the scheduler relies on: unique (campaign, client)
//! pairs, cascading recipient deletion, and claim-before-send on recipients.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ClientId, RecipientId, TemplateId};
use outreach_common::{Error, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Campaign, CampaignRecipient, CampaignStatus, ClaimedRecipient, Client, CreateCampaign,
    CreateClient, CreateEmailTemplate, EmailHistoryRecord, EmailTemplate, NewEmailHistory,
    RecipientStatus, RecipientStatusCounts, DEFAULT_DAILY_LIMIT, DEFAULT_SEND_END_HOUR,
    DEFAULT_SEND_START_HOUR,
};
use crate::repository::{
    CampaignRepository, ClientRepository, HistoryRepository, RecipientRepository,
    TemplateRepository,
};

#[derive(Debug, Default)]
struct MemoryState {
    clients: HashMap<ClientId, Client>,
    templates: HashMap<TemplateId, EmailTemplate>,
    campaigns: Vec<Campaign>,
    recipients: Vec<CampaignRecipient>,
    history: Vec<EmailHistoryRecord>,
}

impl MemoryState {
    fn campaign_mut(&mut self, id: CampaignId) -> Option<&mut Campaign> {
        self.campaigns.iter_mut().find(|c| c.id == id)
    }

    fn recipient_mut(&mut self, id: RecipientId) -> Option<&mut CampaignRecipient> {
        self.recipients.iter_mut().find(|r| r.id == id)
    }

    /// Insert pending rows for unseen clients, returning how many were added
    fn insert_recipients(&mut self, campaign_id: CampaignId, client_ids: &[ClientId]) -> Result<i32> {
        if let Some(missing) = client_ids.iter().find(|id| !self.clients.contains_key(*id)) {
            return Err(Error::Validation(format!(
                "Unknown reference: client {}",
                missing
            )));
        }

        let mut seen: HashSet<ClientId> = self
            .recipients
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .map(|r| r.client_id)
            .collect();

        let mut inserted = 0;
        for client_id in client_ids {
            if !seen.insert(*client_id) {
                continue;
            }
            self.recipients.push(CampaignRecipient {
                id: Uuid::now_v7(),
                campaign_id,
                client_id: *client_id,
                status: RecipientStatus::Pending.to_string(),
                claimed_at: None,
                sent_at: None,
                error_message: None,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    fn finish(
        &mut self,
        id: RecipientId,
        status: RecipientStatus,
        sent_at: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> bool {
        match self.recipient_mut(id) {
            Some(row) if row.status == RecipientStatus::Sending.as_str() => {
                row.status = status.to_string();
                row.sent_at = sent_at;
                row.error_message = error_message.map(str::to_string);
                row.claimed_at = None;
                true
            }
            _ => false,
        }
    }
}

/// Shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for MemoryStore {
    async fn create(&self, input: CreateClient) -> Result<Client> {
        let now = Utc::now();
        let client = Client {
            id: Uuid::now_v7(),
            company_name: input.company_name,
            category: input.category,
            city: input.city,
            address: input.address,
            email: input.email,
            website: input.website,
            phone_primary: input.phone_primary,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn get(&self, id: ClientId) -> Result<Option<Client>> {
        let state = self.state.read().await;
        Ok(state.clients.get(&id).cloned())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn create(&self, input: CreateEmailTemplate) -> Result<EmailTemplate> {
        let now = Utc::now();
        let template = EmailTemplate {
            id: Uuid::now_v7(),
            name: input.name,
            subject: input.subject,
            html_content: input.html_content,
            plain_content: input.plain_content,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn get(&self, id: TemplateId) -> Result<Option<EmailTemplate>> {
        let state = self.state.read().await;
        Ok(state.templates.get(&id).cloned())
    }

    async fn delete(&self, id: TemplateId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.templates.remove(&id).is_none() {
            return Ok(false);
        }
        for campaign in state.campaigns.iter_mut() {
            if campaign.template_id == Some(id) {
                campaign.template_id = None;
            }
        }
        for record in state.history.iter_mut() {
            if record.template_id == Some(id) {
                record.template_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let mut state = self.state.write().await;

        if let Some(template_id) = input.template_id {
            if !state.templates.contains_key(&template_id) {
                return Err(Error::Validation(format!(
                    "Unknown reference: template {}",
                    template_id
                )));
            }
        }

        let id = Uuid::now_v7();
        let total = state.insert_recipients(id, &input.client_ids)?;

        let campaign = Campaign {
            id,
            name: input.name,
            template_id: input.template_id,
            status: CampaignStatus::Draft.to_string(),
            daily_limit: input.daily_limit.unwrap_or(DEFAULT_DAILY_LIMIT),
            send_start_hour: input.send_start_hour.unwrap_or(DEFAULT_SEND_START_HOUR),
            send_end_hour: input.send_end_hour.unwrap_or(DEFAULT_SEND_END_HOUR),
            total_recipients: total,
            sent_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        state.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let state = self.state.read().await;
        Ok(state.campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.status == status.as_str())
            .cloned()
            .collect())
    }

    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.status == status.as_str())
            .count() as i64)
    }

    async fn transition(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.write().await;
        let campaign = match state.campaign_mut(id) {
            Some(c) => c,
            None => return Ok(None),
        };

        if !from.iter().any(|s| campaign.status == s.as_str()) {
            return Ok(None);
        }

        campaign.status = to.to_string();
        if to == CampaignStatus::Active && campaign.started_at.is_none() {
            campaign.started_at = Some(at);
        }
        if to.is_terminal() {
            campaign.completed_at = Some(at);
        }
        Ok(Some(campaign.clone()))
    }

    async fn update_sent_count(&self, id: CampaignId, sent_count: i64) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(campaign) = state.campaign_mut(id) {
            campaign.sent_count = sent_count as i32;
        }
        Ok(())
    }

    async fn replace_recipients(&self, id: CampaignId, client_ids: &[ClientId]) -> Result<Campaign> {
        let mut state = self.state.write().await;
        if state.campaign_mut(id).is_none() {
            return Err(Error::NotFound(format!("Campaign {}", id)));
        }

        let previous = std::mem::take(&mut state.recipients);
        let (removed, kept): (Vec<_>, Vec<_>) =
            previous.into_iter().partition(|r| r.campaign_id == id);
        state.recipients = kept;

        let total = match state.insert_recipients(id, client_ids) {
            Ok(total) => total,
            Err(e) => {
                state.recipients.extend(removed);
                return Err(e);
            }
        };

        let campaign = state
            .campaign_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Campaign {}", id)))?;
        campaign.total_recipients = total;
        campaign.sent_count = 0;
        Ok(campaign.clone())
    }

    async fn delete(&self, id: CampaignId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.campaigns.len();
        state.campaigns.retain(|c| c.id != id);
        if state.campaigns.len() == before {
            return Ok(false);
        }

        state.recipients.retain(|r| r.campaign_id != id);
        for record in state.history.iter_mut() {
            if record.campaign_id == Some(id) {
                record.campaign_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl RecipientRepository for MemoryStore {
    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedRecipient>> {
        let mut state = self.state.write().await;
        let limit = limit.max(0) as usize;

        let mut picked = Vec::new();
        for row in state.recipients.iter_mut() {
            if picked.len() >= limit {
                break;
            }
            if row.campaign_id == campaign_id && row.status == RecipientStatus::Pending.as_str() {
                row.status = RecipientStatus::Sending.to_string();
                row.claimed_at = Some(now);
                picked.push((row.id, row.client_id));
            }
        }

        Ok(picked
            .into_iter()
            .filter_map(|(recipient_id, client_id)| {
                state.clients.get(&client_id).map(|client| ClaimedRecipient {
                    recipient_id,
                    client: client.clone(),
                })
            })
            .collect())
    }

    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.finish(id, RecipientStatus::Sent, Some(sent_at), None))
    }

    async fn mark_failed(&self, id: RecipientId, error: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.finish(id, RecipientStatus::Failed, None, Some(error)))
    }

    async fn mark_skipped(&self, id: RecipientId, reason: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.finish(id, RecipientStatus::Skipped, None, Some(reason)))
    }

    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut released = 0;
        for row in state.recipients.iter_mut() {
            let stale = row.status == RecipientStatus::Sending.as_str()
                && row.claimed_at.map_or(false, |at| at < claimed_before);
            if stale {
                row.status = RecipientStatus::Pending.to_string();
                row.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn release_claims(&self, ids: &[RecipientId]) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut released = 0;
        for row in state.recipients.iter_mut() {
            if row.status == RecipientStatus::Sending.as_str() && ids.contains(&row.id) {
                row.status = RecipientStatus::Pending.to_string();
                row.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn count_sent_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .recipients
            .iter()
            .filter(|r| {
                r.campaign_id == campaign_id
                    && r.status == RecipientStatus::Sent.as_str()
                    && r.sent_at.map_or(false, |at| at >= since)
            })
            .count() as i64)
    }

    async fn status_counts(&self, campaign_id: CampaignId) -> Result<RecipientStatusCounts> {
        let state = self.state.read().await;
        let mut counts = RecipientStatusCounts::default();
        for row in state.recipients.iter().filter(|r| r.campaign_id == campaign_id) {
            let status = row.status_enum().ok_or_else(|| {
                Error::Internal(format!("Invalid recipient status: {}", row.status))
            })?;
            counts.add(status, 1);
        }
        Ok(counts)
    }

    async fn count_pending(&self) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .recipients
            .iter()
            .filter(|r| r.status == RecipientStatus::Pending.as_str())
            .count() as i64)
    }

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignRecipient>> {
        let state = self.state.read().await;
        Ok(state
            .recipients
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
    async fn append(&self, input: NewEmailHistory) -> Result<EmailHistoryRecord> {
        let record = EmailHistoryRecord {
            id: Uuid::now_v7(),
            client_id: input.client_id,
            campaign_id: input.campaign_id,
            template_id: input.template_id,
            subject: Some(input.subject),
            content_preview: Some(input.content_preview),
            provider_message_id: input.provider_message_id,
            status: "sent".to_string(),
            sent_at: input.sent_at,
            opened_at: None,
            clicked_at: None,
        };

        let mut state = self.state.write().await;
        state.history.push(record.clone());
        Ok(record)
    }

    async fn recent_for_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<EmailHistoryRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<EmailHistoryRecord> = state
            .history
            .iter()
            .filter(|h| h.campaign_id == Some(campaign_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.history.iter().filter(|h| h.sent_at >= since).count() as i64)
    }
}
