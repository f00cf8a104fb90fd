//! Test fixtures for the scheduler

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use outreach_common::config::SchedulerConfig;
use outreach_common::types::{CampaignId, ClientId};
use outreach_common::{Error, Result};
use outreach_storage::models::{
    Campaign, CampaignRecipient, CampaignStatus, CreateCampaign, CreateClient,
    CreateEmailTemplate, EmailHistoryRecord, EmailTemplate, NewEmailHistory,
};
use outreach_storage::repository::{
    CampaignRepository, ClientRepository, HistoryRepository, RecipientRepository, Repositories,
    TemplateRepository,
};
use outreach_storage::MemoryStore;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::metrics::SchedulerMetrics;
use super::pacing::{DelayPolicy, InstantPacer};
use super::personalize::Personalizer;
use super::processor::QueueProcessor;
use crate::clock::FixedClock;
use crate::mailer::{EmailSender, OutgoingEmail, SendOutcome};

/// Sender that replays scripted outcomes and records every message
#[derive(Default)]
pub struct ScriptedSender {
    script: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl ScriptedSender {
    pub fn ok(message_id: &str) -> SendOutcome {
        SendOutcome::Sent {
            message_id: Some(message_id.to_string()),
        }
    }

    pub fn fail(error: &str) -> SendOutcome {
        SendOutcome::Failed {
            error: error.to_string(),
        }
    }

    /// Queue outcomes; once exhausted every send succeeds
    pub fn script(&self, outcomes: Vec<SendOutcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for ScriptedSender {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, email: OutgoingEmail) -> SendOutcome {
        let mut sent = self.sent.lock().unwrap();
        sent.push(email);
        let n = sent.len();
        drop(sent);

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SendOutcome::Sent {
                message_id: Some(format!("msg-{}", n)),
            })
    }
}

/// History store whose writes always fail
pub struct FailingHistory;

#[async_trait]
impl HistoryRepository for FailingHistory {
    async fn append(&self, _input: NewEmailHistory) -> Result<EmailHistoryRecord> {
        Err(Error::Database("email_history is unavailable".to_string()))
    }

    async fn recent_for_campaign(
        &self,
        _campaign_id: CampaignId,
        _limit: i64,
    ) -> Result<Vec<EmailHistoryRecord>> {
        Ok(Vec::new())
    }

    async fn count_since(&self, _since: DateTime<Utc>) -> Result<i64> {
        Ok(0)
    }
}

/// An in-memory store plus every collaborator the scheduler needs
pub struct Fixture {
    pub store: MemoryStore,
    pub repos: Repositories,
    pub clock: Arc<FixedClock>,
    pub pacer: Arc<InstantPacer>,
    pub sender: Arc<ScriptedSender>,
    pub delays: DelayPolicy,
    pub personalizer: Personalizer,
    pub metrics: Arc<SchedulerMetrics>,
}

impl Fixture {
    pub fn at(now: DateTime<Local>) -> Self {
        let store = MemoryStore::new();
        Self {
            repos: Repositories::in_memory(store.clone()),
            store,
            clock: Arc::new(FixedClock::new(now)),
            pacer: Arc::new(InstantPacer::new()),
            sender: Arc::new(ScriptedSender::default()),
            delays: DelayPolicy::with_rng(
                Duration::from_secs(300),
                Duration::from_secs(900),
                StdRng::seed_from_u64(42),
            ),
            personalizer: Personalizer::new(),
            metrics: Arc::new(SchedulerMetrics::new().unwrap()),
        }
    }

    /// Route history writes to [`FailingHistory`]; everything else stays on the store
    pub fn with_failing_history(mut self) -> Self {
        self.repos.history = Arc::new(FailingHistory);
        self
    }

    pub fn processor(&self, config: SchedulerConfig) -> QueueProcessor {
        let sender: Arc<dyn EmailSender> = self.sender.clone();
        QueueProcessor::new(self.repos.clone(), Some(sender), config, self.metrics.clone())
            .with_clock(self.clock.clone())
            .with_pacer(self.pacer.clone())
            .with_delay_policy(DelayPolicy::with_rng(
                Duration::from_secs(300),
                Duration::from_secs(900),
                StdRng::seed_from_u64(7),
            ))
    }

    pub async fn template(&self, subject: &str, html: &str) -> EmailTemplate {
        TemplateRepository::create(
            &self.store,
            CreateEmailTemplate {
                name: format!("Template {}", subject),
                subject: subject.to_string(),
                html_content: html.to_string(),
                plain_content: None,
            },
        )
        .await
        .unwrap()
    }

    pub async fn client(
        &self,
        email: Option<&str>,
        company_name: Option<&str>,
        city: Option<&str>,
    ) -> ClientId {
        ClientRepository::create(
            &self.store,
            CreateClient {
                email: email.map(str::to_string),
                company_name: company_name.map(str::to_string),
                city: city.map(str::to_string),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    pub async fn clients(&self, emails: &[&str]) -> Vec<ClientId> {
        let mut ids = Vec::with_capacity(emails.len());
        for email in emails {
            ids.push(self.client(Some(email), Some("Acme"), None).await);
        }
        ids
    }

    pub async fn draft_campaign(
        &self,
        template: Option<&EmailTemplate>,
        clients: &[ClientId],
        daily_limit: i32,
    ) -> Campaign {
        CampaignRepository::create(
            &self.store,
            CreateCampaign {
                name: "Spring outreach".to_string(),
                template_id: template.map(|t| t.id),
                daily_limit: Some(daily_limit),
                send_start_hour: Some(9),
                send_end_hour: Some(18),
                client_ids: clients.to_vec(),
            },
        )
        .await
        .unwrap()
    }

    pub async fn active_campaign(
        &self,
        template: Option<&EmailTemplate>,
        clients: &[ClientId],
        daily_limit: i32,
    ) -> Campaign {
        let draft = self.draft_campaign(template, clients, daily_limit).await;
        self.store
            .transition(
                draft.id,
                &[CampaignStatus::Draft],
                CampaignStatus::Active,
                Utc::now(),
            )
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn reload(&self, campaign: &Campaign) -> Campaign {
        CampaignRepository::get(&self.store, campaign.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn recipients(&self, campaign: &Campaign) -> Vec<CampaignRecipient> {
        self.store.list_for_campaign(campaign.id).await.unwrap()
    }

    pub async fn history(&self, campaign: &Campaign) -> Vec<EmailHistoryRecord> {
        self.store
            .recent_for_campaign(campaign.id, 1000)
            .await
            .unwrap()
    }
}
