//! Per-campaign dispatch loop

use chrono::{Timelike, Utc};
use outreach_common::config::MissingTemplatePolicy;
use outreach_common::types::{EmailAddress, RecipientId};
use outreach_common::{Error, Result};
use outreach_storage::models::{Campaign, ClaimedRecipient, EmailTemplate, NewEmailHistory};
use outreach_storage::repository::Repositories;
use tracing::{debug, error, info, warn};

use super::daily_cap;
use super::metrics::SchedulerMetrics;
use super::pacing::{DelayPolicy, Pacer};
use super::personalize::Personalizer;
use super::window::is_within_window;
use crate::clock::Clock;
use crate::mailer::{EmailSender, OutgoingEmail, SendOutcome};

pub const SKIP_NO_EMAIL: &str = "No email address";
pub const SKIP_INVALID_EMAIL: &str = "Invalid email address";
pub const TEMPLATE_NOT_FOUND: &str = "Template not found";
pub const GENERIC_SUBJECT: &str = "Message";
pub const GENERIC_BODY: &str = "<p>Message content</p>";

/// Characters of sent HTML kept in the history preview
pub const PREVIEW_CHARS: usize = 200;

/// Why a campaign sent nothing this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    OutsideWindow,
    DailyCapReached,
    NothingPending,
}

/// What one dispatch did for a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
    pub idle: Option<IdleReason>,
}

impl DispatchOutcome {
    fn idle(reason: IdleReason) -> Self {
        Self {
            idle: Some(reason),
            ..Default::default()
        }
    }
}

/// A dispatch stopped by a store error, with whatever it got done first
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DispatchFailure {
    pub partial: DispatchOutcome,
    #[source]
    pub error: Error,
}

impl From<Error> for DispatchFailure {
    fn from(error: Error) -> Self {
        Self {
            partial: DispatchOutcome::default(),
            error,
        }
    }
}

/// Everything one dispatch needs, borrowed from the processor
pub(crate) struct Dispatcher<'a> {
    pub repos: &'a Repositories,
    pub sender: &'a dyn EmailSender,
    pub clock: &'a dyn Clock,
    pub pacer: &'a dyn Pacer,
    pub delays: &'a DelayPolicy,
    pub personalizer: &'a Personalizer,
    pub metrics: &'a SchedulerMetrics,
    pub max_per_pass: u32,
    pub missing_template: MissingTemplatePolicy,
}

impl Dispatcher<'_> {
    /// Run one pass of the dispatch loop for a single active campaign.
    ///
    /// A store error stops the batch. Recipients not reached yet go back to
    /// pending and the counts so far travel with the error.
    pub async fn dispatch(
        &self,
        campaign: &Campaign,
    ) -> std::result::Result<DispatchOutcome, DispatchFailure> {
        let now = self.clock.now();

        if !is_within_window(now.hour(), campaign.send_start_hour, campaign.send_end_hour) {
            debug!(
                campaign_id = %campaign.id,
                hour = now.hour(),
                start = campaign.send_start_hour,
                end = campaign.send_end_hour,
                "Outside sending window"
            );
            return Ok(DispatchOutcome::idle(IdleReason::OutsideWindow));
        }

        let remaining = daily_cap::remaining_today(self.repos.recipients.as_ref(), campaign, now)
            .await?
            .min(self.max_per_pass);
        if remaining == 0 {
            debug!(campaign_id = %campaign.id, daily_limit = campaign.daily_limit, "Daily cap reached");
            return Ok(DispatchOutcome::idle(IdleReason::DailyCapReached));
        }

        let template = match campaign.template_id {
            Some(id) => self.repos.templates.get(id).await?,
            None => None,
        };
        if template.is_none() {
            warn!(
                campaign_id = %campaign.id,
                policy = ?self.missing_template,
                "Campaign template could not be resolved"
            );
        }

        let batch = self
            .repos
            .recipients
            .claim_pending(campaign.id, remaining as i64, now.with_timezone(&Utc))
            .await?;
        if batch.is_empty() {
            return Ok(DispatchOutcome::idle(IdleReason::NothingPending));
        }

        info!(
            campaign_id = %campaign.id,
            campaign = %campaign.name,
            batch = batch.len(),
            "Dispatching campaign batch"
        );

        let mut outcome = DispatchOutcome::default();
        let last = batch.len() - 1;
        let mut batch = batch.into_iter().enumerate();
        while let Some((index, claimed)) = batch.next() {
            let attempted = match self
                .process_recipient(campaign, template.as_ref(), claimed, &mut outcome)
                .await
            {
                Ok(attempted) => attempted,
                Err(error) => {
                    let unprocessed: Vec<RecipientId> =
                        batch.map(|(_, claimed)| claimed.recipient_id).collect();
                    self.release_unprocessed(campaign, &unprocessed).await;
                    return Err(DispatchFailure {
                        partial: outcome,
                        error,
                    });
                }
            };

            if attempted && index < last {
                let delay = self.delays.next_delay();
                debug!(campaign_id = %campaign.id, delay_secs = delay.as_secs(), "Pausing before next send");
                self.pacer.pause(delay).await;
            }
        }

        Ok(outcome)
    }

    async fn release_unprocessed(&self, campaign: &Campaign, ids: &[RecipientId]) {
        if ids.is_empty() {
            return;
        }
        match self.repos.recipients.release_claims(ids).await {
            Ok(released) => {
                warn!(campaign_id = %campaign.id, released, "Returned unprocessed recipients to pending")
            }
            // The stale-claim sweep picks these up later
            Err(e) => error!(
                campaign_id = %campaign.id,
                claimed = ids.len(),
                "Failed to release unprocessed recipients: {}", e
            ),
        }
    }

    /// Handle one claimed recipient. Returns true if a send was attempted.
    async fn process_recipient(
        &self,
        campaign: &Campaign,
        template: Option<&EmailTemplate>,
        claimed: ClaimedRecipient,
        outcome: &mut DispatchOutcome,
    ) -> Result<bool> {
        let recipient_id = claimed.recipient_id;
        let client = &claimed.client;

        let address = match client.email.as_deref().map(str::trim) {
            None | Some("") => {
                self.skip(claimed.recipient_id, SKIP_NO_EMAIL, outcome).await?;
                return Ok(false);
            }
            Some(raw) => match EmailAddress::parse(raw) {
                Some(address) => address,
                None => {
                    self.skip(claimed.recipient_id, SKIP_INVALID_EMAIL, outcome).await?;
                    return Ok(false);
                }
            },
        };

        let (subject, html) = match template {
            Some(t) => (
                self.personalizer.personalize(&t.subject, client),
                self.personalizer.personalize(&t.html_content, client),
            ),
            None => match self.missing_template {
                MissingTemplatePolicy::Generic => {
                    (GENERIC_SUBJECT.to_string(), GENERIC_BODY.to_string())
                }
                MissingTemplatePolicy::Fail => {
                    self.repos
                        .recipients
                        .mark_failed(recipient_id, TEMPLATE_NOT_FOUND)
                        .await?;
                    self.metrics.record_failed();
                    outcome.failed += 1;
                    return Ok(false);
                }
            },
        };

        let email = OutgoingEmail {
            to: address.to_string(),
            subject: subject.clone(),
            html,
        };
        let preview: String = email.html.chars().take(PREVIEW_CHARS).collect();

        match self.sender.send(email).await {
            SendOutcome::Sent { message_id } => {
                let sent_at = self.clock.now().with_timezone(&Utc);
                outcome.sent += 1;
                self.metrics.record_sent();

                if !self.repos.recipients.mark_sent(recipient_id, sent_at).await? {
                    error!(
                        %recipient_id,
                        to = %address,
                        "Recipient was no longer claimed after a successful send"
                    );
                }

                self.repos
                    .history
                    .append(NewEmailHistory {
                        client_id: client.id,
                        campaign_id: Some(campaign.id),
                        template_id: template.map(|t| t.id),
                        subject,
                        content_preview: preview,
                        provider_message_id: message_id.clone(),
                        sent_at,
                    })
                    .await?;

                debug!(
                    %recipient_id,
                    to = %address,
                    message_id = message_id.as_deref().unwrap_or("-"),
                    "Email sent"
                );
            }
            SendOutcome::Failed { error } => {
                warn!(%recipient_id, to = %address, "Email send failed: {}", error);
                self.repos.recipients.mark_failed(recipient_id, &error).await?;
                self.metrics.record_failed();
                outcome.failed += 1;
            }
        }

        Ok(true)
    }

    async fn skip(
        &self,
        recipient_id: uuid::Uuid,
        reason: &str,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        debug!(%recipient_id, reason, "Skipping recipient");
        self.repos.recipients.mark_skipped(recipient_id, reason).await?;
        self.metrics.record_skipped();
        outcome.skipped += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::{Fixture, ScriptedSender};
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use outreach_common::config::MissingTemplatePolicy;
    use outreach_storage::models::RecipientStatus;
    use outreach_storage::repository::RecipientRepository;
    use outreach_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn dispatcher<'a>(fx: &'a Fixture, policy: MissingTemplatePolicy) -> Dispatcher<'a> {
        Dispatcher {
            repos: &fx.repos,
            sender: fx.sender.as_ref(),
            clock: fx.clock.as_ref(),
            pacer: fx.pacer.as_ref(),
            delays: &fx.delays,
            personalizer: &fx.personalizer,
            metrics: &fx.metrics,
            max_per_pass: 3,
            missing_template: policy,
        }
    }

    #[tokio::test]
    async fn test_batch_isolation_on_provider_failure() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        fx.sender.script(vec![
            ScriptedSender::ok("m1"),
            ScriptedSender::fail("Rate limit exceeded"),
            ScriptedSender::ok("m3"),
        ]);
        let template = fx.template("Hi {{company_name}}", "<p>{{city}}</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge"])
            .await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!((outcome.sent, outcome.failed, outcome.skipped), (2, 1, 0));

        let rows = fx.recipients(&campaign).await;
        assert_eq!(rows[0].status_enum(), Some(RecipientStatus::Sent));
        assert_eq!(rows[1].status_enum(), Some(RecipientStatus::Failed));
        assert_eq!(rows[1].error_message.as_deref(), Some("Rate limit exceeded"));
        assert_eq!(rows[2].status_enum(), Some(RecipientStatus::Sent));

        let history = fx.history(&campaign).await;
        assert_eq!(history.len(), 2);
        let mut ids: Vec<_> = history
            .iter()
            .filter_map(|h| h.provider_message_id.clone())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["m1".to_string(), "m3".to_string()]);

        // Two pauses for three sends
        assert_eq!(fx.pacer.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_emails_are_skipped_without_sending() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let template = fx.template("Hello", "<p>Body</p>").await;
        let mut clients = fx.clients(&["not-an-address", "   "]).await;
        clients.push(fx.client(None, None, None).await);
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!(outcome.skipped, 3);
        assert!(fx.sender.sent().is_empty());
        assert!(fx.pacer.delays().is_empty());

        let rows = fx.recipients(&campaign).await;
        assert_eq!(rows[0].error_message.as_deref(), Some(SKIP_INVALID_EMAIL));
        assert_eq!(rows[1].error_message.as_deref(), Some(SKIP_NO_EMAIL));
        assert_eq!(rows[2].error_message.as_deref(), Some(SKIP_NO_EMAIL));
        assert!(rows.iter().all(|r| r.status_enum() == Some(RecipientStatus::Skipped)));
    }

    #[tokio::test]
    async fn test_outside_window_touches_nothing() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 19, 30, 0).unwrap());
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!(outcome.idle, Some(IdleReason::OutsideWindow));
        assert!(fx.sender.sent().is_empty());
        assert_eq!(
            fx.recipients(&campaign).await[0].status_enum(),
            Some(RecipientStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_batch_bounded_by_cap_and_pass_limit() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge", "d@acme.ge", "e@acme.ge"])
            .await;

        let capped = fx.active_campaign(Some(&template), &clients, 2).await;
        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&capped)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 2);

        let uncapped = fx.active_campaign(Some(&template), &clients, 50).await;
        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&uncapped)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 3);
    }

    #[tokio::test]
    async fn test_missing_template_generic_fallback() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let clients = fx.clients(&["a@acme.ge"]).await;
        let campaign = fx.active_campaign(None, &clients, 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 1);

        let sent = fx.sender.sent();
        assert_eq!(sent[0].subject, GENERIC_SUBJECT);
        assert_eq!(sent[0].html, GENERIC_BODY);

        let history = fx.history(&campaign).await;
        assert_eq!(history[0].template_id, None);
    }

    #[tokio::test]
    async fn test_missing_template_fail_policy() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let clients = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let campaign = fx.active_campaign(None, &clients, 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Fail)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!((outcome.sent, outcome.failed), (0, 2));
        assert!(fx.sender.sent().is_empty());
        assert!(fx.pacer.delays().is_empty());

        let rows = fx.recipients(&campaign).await;
        assert!(rows
            .iter()
            .all(|r| r.error_message.as_deref() == Some(TEMPLATE_NOT_FOUND)));
        assert!(fx.history(&campaign).await.is_empty());
    }

    #[tokio::test]
    async fn test_personalized_content_and_preview() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let long_body = format!("<p>{{{{company_name}}}} {}</p>", "x".repeat(400));
        let template = fx.template("Offer for {{company_name}} in {{city}}", &long_body).await;
        let client = fx
            .client(Some("info@acme.ge"), Some("Acme"), Some("Batumi"))
            .await;
        let campaign = fx.active_campaign(Some(&template), &[client], 10).await;

        dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();

        let sent = fx.sender.sent();
        assert_eq!(sent[0].to, "info@acme.ge");
        assert_eq!(sent[0].subject, "Offer for Acme in Batumi");
        assert!(sent[0].html.starts_with("<p>Acme xxx"));

        let history = fx.history(&campaign).await;
        assert_eq!(history[0].subject.as_deref(), Some("Offer for Acme in Batumi"));
        assert_eq!(
            history[0].content_preview.as_ref().map(|p| p.chars().count()),
            Some(PREVIEW_CHARS)
        );
        assert_eq!(history[0].template_id, Some(template.id));
    }

    #[tokio::test]
    async fn test_long_personalized_subject_is_kept_whole() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let subject = format!("{} {{{{company_name}}}}", "S".repeat(490));
        let template = fx.template(&subject, "<p>Body</p>").await;
        let company = "C".repeat(500);
        let client = fx.client(Some("info@acme.ge"), Some(&company), None).await;
        let campaign = fx.active_campaign(Some(&template), &[client], 10).await;

        let outcome = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 1);

        let history = fx.history(&campaign).await;
        let recorded = history[0].subject.as_deref().unwrap_or_default();
        assert_eq!(recorded.chars().count(), 991);
        assert!(recorded.ends_with(&company));
    }

    #[tokio::test]
    async fn test_pauses_use_delay_policy() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge", "b@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap();

        let delays = fx.pacer.delays();
        assert_eq!(delays.len(), 1);
        assert!(delays[0] >= Duration::from_secs(300) && delays[0] <= Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_store_error_releases_unprocessed_recipients() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap())
            .with_failing_history();
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx
            .clients(&["a@acme.ge", "b@acme.ge", "c@acme.ge"])
            .await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let failure = dispatcher(&fx, MissingTemplatePolicy::Generic)
            .dispatch(&campaign)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, Error::Database(_)));
        assert_eq!(failure.partial.sent, 1);
        assert_eq!(fx.sender.sent().len(), 1);

        let statuses: Vec<_> = fx
            .recipients(&campaign)
            .await
            .iter()
            .map(|r| r.status_enum())
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some(RecipientStatus::Sent),
                Some(RecipientStatus::Pending),
                Some(RecipientStatus::Pending),
            ]
        );
    }

    /// Loses its claim mid-send, as if another pass swept it as stale
    struct ClaimLosingSender {
        store: MemoryStore,
    }

    #[async_trait]
    impl EmailSender for ClaimLosingSender {
        fn name(&self) -> &'static str {
            "claim-losing"
        }

        async fn send(&self, _email: OutgoingEmail) -> SendOutcome {
            self.store
                .release_stale_claims(Utc::now() + chrono::Duration::days(1))
                .await
                .unwrap();
            ScriptedSender::ok("m-late")
        }
    }

    #[tokio::test]
    async fn test_accepted_send_is_recorded_after_lost_claim() {
        let fx = Fixture::at(Local.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        let template = fx.template("Hello", "<p>Body</p>").await;
        let clients = fx.clients(&["a@acme.ge"]).await;
        let campaign = fx.active_campaign(Some(&template), &clients, 10).await;

        let sender = ClaimLosingSender {
            store: fx.store.clone(),
        };
        let outcome = Dispatcher {
            sender: &sender,
            ..dispatcher(&fx, MissingTemplatePolicy::Generic)
        }
        .dispatch(&campaign)
        .await
        .unwrap();
        assert_eq!(outcome.sent, 1);

        let history = fx.history(&campaign).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].provider_message_id.as_deref(), Some("m-late"));
    }
}
