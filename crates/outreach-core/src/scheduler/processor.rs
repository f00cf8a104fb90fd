//! Queue pass orchestration

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use outreach_common::config::SchedulerConfig;
use outreach_common::{Error, Result};
use outreach_storage::models::{Campaign, CampaignStatus};
use outreach_storage::repository::Repositories;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::daily_cap::local_midnight;
use super::dispatch::{DispatchFailure, DispatchOutcome, Dispatcher};
use super::metrics::SchedulerMetrics;
use super::pacing::{DelayPolicy, Pacer, TokioPacer};
use super::personalize::Personalizer;
use super::{CampaignPassResult, QueueResult, QueueStatus, PASS_ALREADY_RUNNING};
use crate::clock::{Clock, SystemClock};
use crate::mailer::EmailSender;

/// Runs queue passes over every active campaign.
///
/// At most one pass runs at a time per processor; a second caller gets
/// [`Error::Conflict`] instead of waiting. Recipient claims in the store keep
/// passes from separate processes from sending the same email twice.
pub struct QueueProcessor {
    repos: Repositories,
    sender: Option<Arc<dyn EmailSender>>,
    clock: Arc<dyn Clock>,
    pacer: Arc<dyn Pacer>,
    delays: DelayPolicy,
    personalizer: Personalizer,
    metrics: Arc<SchedulerMetrics>,
    config: SchedulerConfig,
    pass_guard: Mutex<()>,
}

impl QueueProcessor {
    pub fn new(
        repos: Repositories,
        sender: Option<Arc<dyn EmailSender>>,
        config: SchedulerConfig,
        metrics: Arc<SchedulerMetrics>,
    ) -> Self {
        Self {
            repos,
            sender,
            clock: Arc::new(SystemClock),
            pacer: Arc::new(TokioPacer),
            delays: DelayPolicy::from_config(&config),
            personalizer: Personalizer::new(),
            metrics,
            config,
            pass_guard: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_delay_policy(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }

    /// Whether an email provider is available
    pub fn is_configured(&self) -> bool {
        self.sender.is_some()
    }

    /// Whether a pass is in progress right now
    pub fn is_running(&self) -> bool {
        self.pass_guard.try_lock().is_err()
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Run one queue pass.
    ///
    /// Store failures that stop the whole pass come back as a successful call
    /// carrying `success: false`; only a pass that is already running is an
    /// `Err`.
    pub async fn process_queue(&self) -> Result<QueueResult> {
        let sender = match &self.sender {
            Some(sender) => sender.clone(),
            None => {
                warn!("Queue pass requested but no email provider is configured");
                self.metrics.record_pass("unconfigured");
                return Ok(QueueResult::unconfigured());
            }
        };

        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.metrics.record_pass("conflict");
                return Err(Error::Conflict(PASS_ALREADY_RUNNING.to_string()));
            }
        };

        let started = Instant::now();
        let result = match self.run_pass(sender.as_ref()).await {
            Ok(result) => {
                self.metrics.record_pass("ok");
                result
            }
            Err(e) => {
                error!("Queue pass failed: {}", e);
                self.metrics.record_pass("error");
                QueueResult::failure(e.to_string())
            }
        };
        self.metrics
            .pass_duration
            .observe(started.elapsed().as_secs_f64());

        Ok(result)
    }

    async fn run_pass(&self, sender: &dyn EmailSender) -> Result<QueueResult> {
        self.release_stale_claims().await?;

        let campaigns = self
            .repos
            .campaigns
            .list_by_status(CampaignStatus::Active)
            .await?;
        self.metrics.active_campaigns.set(campaigns.len() as i64);

        if campaigns.is_empty() {
            info!("No active campaigns");
            return Ok(QueueResult::no_active_campaigns());
        }

        let dispatcher = Dispatcher {
            repos: &self.repos,
            sender,
            clock: self.clock.as_ref(),
            pacer: self.pacer.as_ref(),
            delays: &self.delays,
            personalizer: &self.personalizer,
            metrics: &self.metrics,
            max_per_pass: self.config.max_per_pass,
            missing_template: self.config.missing_template,
        };

        let mut result = QueueResult {
            success: true,
            processed: 0,
            errors: 0,
            campaigns: Vec::with_capacity(campaigns.len()),
            message: String::new(),
        };

        for campaign in &campaigns {
            let mut entry = CampaignPassResult {
                id: campaign.id,
                name: campaign.name.clone(),
                sent: 0,
                failed: 0,
                skipped: 0,
                error: None,
            };

            let outcome = match dispatcher.dispatch(campaign).await {
                Ok(outcome) => outcome,
                Err(DispatchFailure { partial, error: e }) => {
                    error!(campaign_id = %campaign.id, "Campaign dispatch failed: {}", e);
                    entry.error = Some(e.to_string());
                    partial
                }
            };
            let DispatchOutcome {
                sent,
                failed,
                skipped,
                ..
            } = outcome;
            entry.sent = sent;
            entry.failed = failed;
            entry.skipped = skipped;

            if let Err(e) = self.refresh_campaign(campaign).await {
                error!(campaign_id = %campaign.id, "Failed to refresh campaign counters: {}", e);
                entry.error.get_or_insert_with(|| e.to_string());
            }

            result.processed += entry.sent;
            result.errors += entry.failed;
            result.campaigns.push(entry);
        }

        result.summarize();
        info!(
            processed = result.processed,
            errors = result.errors,
            campaigns = result.campaigns.len(),
            "Queue pass finished"
        );
        Ok(result)
    }

    /// Put recipients claimed by an interrupted pass back to pending
    async fn release_stale_claims(&self) -> Result<()> {
        let cutoff = self.clock.now().with_timezone(&Utc)
            - ChronoDuration::minutes(self.config.claim_timeout_minutes);
        let released = self.repos.recipients.release_stale_claims(cutoff).await?;
        if released > 0 {
            warn!(released, "Released stale recipient claims");
            self.metrics.claims_released.inc_by(released);
        }
        Ok(())
    }

    /// Recompute `sent_count` from recipient rows and complete the campaign
    /// once nothing is pending or in flight
    async fn refresh_campaign(&self, campaign: &Campaign) -> Result<()> {
        let counts = self.repos.recipients.status_counts(campaign.id).await?;
        self.repos
            .campaigns
            .update_sent_count(campaign.id, counts.sent)
            .await?;

        if counts.outstanding() == 0 {
            let now = self.clock.now().with_timezone(&Utc);
            let completed = self
                .repos
                .campaigns
                .transition(
                    campaign.id,
                    &[CampaignStatus::Active],
                    CampaignStatus::Completed,
                    now,
                )
                .await?;
            if completed.is_some() {
                info!(
                    campaign_id = %campaign.id,
                    campaign = %campaign.name,
                    sent = counts.sent,
                    failed = counts.failed,
                    skipped = counts.skipped,
                    "Campaign completed"
                );
            }
        }
        Ok(())
    }

    /// Snapshot of the backlog across all campaigns
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let active_campaigns = self
            .repos
            .campaigns
            .count_by_status(CampaignStatus::Active)
            .await?;
        let pending_emails = self.repos.recipients.count_pending().await?;
        let sent_today = self
            .repos
            .history
            .count_since(local_midnight(self.clock.now()))
            .await?;

        Ok(QueueStatus {
            active_campaigns,
            pending_emails,
            sent_today,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::scheduler::testing::{Fixture, ScriptedSender};
    use crate::scheduler::PROVIDER_NOT_CONFIGURED;
    use chrono::{Local, TimeZone};
    use outreach_storage::models::RecipientStatus;
    use outreach_storage::repository::RecipientRepository;
    use pretty_assertions::assert_eq;

    fn monday_at(hour: u32) -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let fx = Fixture::at(monday_at(10));
        let processor = QueueProcessor::new(
            fx.repos.clone(),
            None,
            SchedulerConfig::default(),
            fx.metrics.clone(),
        );
        assert!(!processor.is_configured());

        let result = processor.process_queue().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, PROVIDER_NOT_CONFIGURED);
        assert_eq!(result.processed, 0);
    }

    #[tokio::test]
    async fn test_no_active_campaigns() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge"]).await;
        fx.draft_campaign(Some(&template), &clients, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "No active campaigns");
        assert!(result.campaigns.is_empty());
        assert!(fx.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pass_summary_and_isolation() {
        let fx = Fixture::at(monday_at(10));
        fx.sender.script(vec![
            ScriptedSender::ok("m1"),
            ScriptedSender::fail("Mailbox unavailable"),
            ScriptedSender::ok("m3"),
        ]);
        let template = fx.template("Hello {{company_name}}", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge", "d@acme.ge"])
            .await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert!(result.success);
        assert_eq!(result.processed, 2);
        assert_eq!(result.errors, 1);
        assert_eq!(result.message, "Processed 2 emails with 1 errors");
        assert_eq!(result.campaigns.len(), 1);
        assert_eq!(result.campaigns[0].id, campaign.id);
        assert_eq!(result.campaigns[0].error, None);

        let reloaded = fx.reload(&campaign).await;
        assert_eq!(reloaded.sent_count, 2);
        assert_eq!(reloaded.status_enum(), Some(CampaignStatus::Active));

        let counts = fx.store.status_counts(campaign.id).await.unwrap();
        assert_eq!((counts.sent, counts.failed, counts.pending), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_store_error_keeps_partial_counts() {
        let fx = Fixture::at(monday_at(10)).with_failing_history();
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge"])
            .await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert_eq!(result.processed, 1);
        assert_eq!(result.campaigns[0].sent, 1);
        assert!(result.campaigns[0]
            .error
            .as_deref()
            .map_or(false, |e| e.starts_with("Database error")));

        let counts = fx.store.status_counts(campaign.id).await.unwrap();
        assert_eq!((counts.sent, counts.pending, counts.sending), (1, 2, 0));
        assert_eq!(
            fx.reload(&campaign).await.status_enum(),
            Some(CampaignStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_daily_cap_holds_until_midnight() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&[
                "a@acme.ge", "b@acme.ge", "c@acme.ge", "d@acme.ge", "e@acme.ge", "f@acme.ge",
                "g@acme.ge",
            ])
            .await;
        let campaign = fx.active_campaign(Some(&template), &clients, 2).await;
        let processor = fx.processor(SchedulerConfig::default());

        assert_eq!(processor.process_queue().await.unwrap().processed, 2);

        // Cap reached: later passes the same day send nothing
        fx.clock.set(monday_at(15));
        let result = processor.process_queue().await.unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(fx.sender.sent().len(), 2);
        let counts = fx.store.status_counts(campaign.id).await.unwrap();
        assert_eq!(counts.pending, 5);

        // A new local day resets the cap
        fx.clock.set(Local.with_ymd_and_hms(2024, 5, 7, 9, 5, 0).unwrap());
        assert_eq!(processor.process_queue().await.unwrap().processed, 2);
        assert_eq!(fx.reload(&campaign).await.sent_count, 4);
    }

    #[tokio::test]
    async fn test_closed_window_changes_nothing() {
        let fx = Fixture::at(monday_at(7));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert!(result.success);
        assert_eq!(result.processed, 0);
        assert_eq!(result.message, "Processed 0 emails with 0 errors");

        let recipients = fx.recipients(&campaign).await;
        assert!(recipients
            .iter()
            .all(|r| r.status_enum() == Some(RecipientStatus::Pending)));
        assert_eq!(
            fx.reload(&campaign).await.status_enum(),
            Some(CampaignStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_completion_is_reached_once() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;
        let processor = fx.processor(SchedulerConfig::default());

        let result = processor.process_queue().await.unwrap();
        assert_eq!(result.processed, 2);

        let completed = fx.reload(&campaign).await;
        assert_eq!(completed.status_enum(), Some(CampaignStatus::Completed));
        assert_eq!(completed.sent_count, 2);
        let completed_at = completed.completed_at;
        assert!(completed_at.is_some());

        fx.clock.advance(chrono::Duration::minutes(5));
        let again = processor.process_queue().await.unwrap();
        assert_eq!(again.message, "No active campaigns");
        assert_eq!(fx.reload(&campaign).await.completed_at, completed_at);
    }

    #[tokio::test]
    async fn test_all_skipped_campaign_completes() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["broken", "also broken"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(result.errors, 0);
        assert_eq!(result.campaigns[0].skipped, 2);
        assert_eq!(
            fx.reload(&campaign).await.status_enum(),
            Some(CampaignStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_second_pass_is_rejected_while_running() {
        let fx = Fixture::at(monday_at(10));
        let processor = fx.processor(SchedulerConfig::default());

        let held = processor.pass_guard.lock().await;
        assert!(processor.is_running());
        let err = processor.process_queue().await.unwrap_err();
        assert!(matches!(err, Error::Conflict(ref msg) if msg == PASS_ALREADY_RUNNING));

        drop(held);
        assert!(!processor.is_running());
        assert!(processor.process_queue().await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_claims_are_released_and_sent() {
        let fx = Fixture::at(monday_at(12));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        // A pass that crashed three hours ago left both rows claimed
        let crashed_at = monday_at(9).with_timezone(&Utc);
        let claimed = fx.store.claim_pending(campaign.id, 10, crashed_at).await.unwrap();
        assert_eq!(claimed.len(), 2);

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert_eq!(result.processed, 2);
        assert!(fx.metrics.render().unwrap().contains("outreach_stale_claims_released_total 2"));
    }

    #[tokio::test]
    async fn test_fresh_claims_are_left_alone() {
        let fx = Fixture::at(monday_at(12));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let recent = (monday_at(12) - chrono::Duration::minutes(10)).with_timezone(&Utc);
        fx.store.claim_pending(campaign.id, 10, recent).await.unwrap();

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert_eq!(result.processed, 0);
        assert!(fx.sender.sent().is_empty());
        // Still in flight, so not complete either
        assert_eq!(
            fx.reload(&campaign).await.status_enum(),
            Some(CampaignStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_campaigns_processed_independently() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let first = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let second = fx.clients(&["c@acme.ge"]).await;
        let one = fx.active_campaign(Some(&template), &first, 1).await;
        let two = fx.active_campaign(Some(&template), &second, 10).await;

        let result = fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();
        assert_eq!(result.processed, 2);
        assert_eq!(result.campaigns.len(), 2);
        assert_eq!(fx.reload(&one).await.status_enum(), Some(CampaignStatus::Active));
        assert_eq!(fx.reload(&two).await.status_enum(), Some(CampaignStatus::Completed));
    }

    #[tokio::test]
    async fn test_pacing_between_sends() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge", "d@acme.ge"])
            .await;
        fx.active_campaign(Some(&template), &clients, 10).await;

        let config = SchedulerConfig {
            max_per_pass: 3,
            ..SchedulerConfig::default()
        };
        fx.processor(config).process_queue().await.unwrap();
        assert_eq!(fx.pacer.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_queue_status() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge", "d@acme.ge", "e@acme.ge"])
            .await;
        fx.active_campaign(Some(&template), &clients, 10).await;
        fx.draft_campaign(Some(&template), &clients[..2], 10).await;

        let processor = fx.processor(SchedulerConfig::default());
        processor.process_queue().await.unwrap();

        let status = processor.queue_status().await.unwrap();
        assert_eq!(
            status,
            QueueStatus {
                active_campaigns: 1,
                pending_emails: 4,
                sent_today: 3,
            }
        );

        // Tomorrow nothing has been sent yet
        let tomorrow = QueueProcessor::new(
            fx.repos.clone(),
            None,
            SchedulerConfig::default(),
            fx.metrics.clone(),
        )
        .with_clock(Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2024, 5, 7, 8, 0, 0).unwrap(),
        )));
        assert_eq!(tomorrow.queue_status().await.unwrap().sent_today, 0);
    }

    #[tokio::test]
    async fn test_pass_metrics() {
        let fx = Fixture::at(monday_at(10));
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge"]).await;
        fx.active_campaign(Some(&template), &clients, 10).await;

        fx.processor(SchedulerConfig::default()).process_queue().await.unwrap();

        let text = fx.metrics.render().unwrap();
        assert!(text.contains("outreach_emails_total{outcome=\"sent\"} 1"));
        assert!(text.contains("outreach_queue_passes_total{result=\"ok\"} 1"));
        assert!(text.contains("outreach_active_campaigns 1"));
    }
}
