//! Outbound email providers
//!
//! The scheduler only depends on [`EmailSender`]. Ordinary delivery failures
//! (rate limits, rejected recipients, network errors) come back as
//! [`SendOutcome::Failed`] and never as an `Err`.

mod resend;
mod smtp;

pub use resend::ResendSender;
pub use smtp::SmtpSender;

use async_trait::async_trait;
use outreach_common::config::{MailerConfig, MailerProvider};
use outreach_common::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// A fully rendered message ready to hand to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Result of a send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the provider
    Sent { message_id: Option<String> },
    /// Rejected or not delivered
    Failed { error: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Email sending capability
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Provider name for logs and metrics
    fn name(&self) -> &'static str;

    async fn send(&self, email: OutgoingEmail) -> SendOutcome;
}

/// Build the configured sender.
///
/// Returns `Ok(None)` when the selected provider is missing its credentials
/// (no Resend API key, no SMTP host); the scheduler then reports itself as
/// unconfigured instead of attempting sends.
pub fn build_sender(config: &MailerConfig) -> Result<Option<Arc<dyn EmailSender>>> {
    match config.provider {
        MailerProvider::Resend => match config.resend.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                let sender = ResendSender::new(&config.resend, key, config.from_header())?;
                info!(provider = "resend", from = %config.from_header(), "Email provider configured");
                Ok(Some(Arc::new(sender)))
            }
            _ => {
                warn!("Resend API key not configured; campaign sends are disabled");
                Ok(None)
            }
        },
        MailerProvider::Smtp => match config.smtp.host.as_deref() {
            Some(host) if !host.trim().is_empty() => {
                let sender = SmtpSender::new(&config.smtp, host, config.from_header())?;
                info!(provider = "smtp", host = %host, "Email provider configured");
                Ok(Some(Arc::new(sender)))
            }
            _ => {
                warn!("SMTP host not configured; campaign sends are disabled");
                Ok(None)
            }
        },
    }
}
