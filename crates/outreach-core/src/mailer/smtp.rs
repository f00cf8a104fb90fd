//! SMTP relay sender

use super::{EmailSender, OutgoingEmail, SendOutcome};
use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use outreach_common::config::SmtpConfig;
use outreach_common::{Error, Result};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Sends through an SMTP relay
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig, host: &str, from: String) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| Error::Config(format!("Invalid sender address {:?}: {}", from, e)))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message_id(&self) -> String {
        format!(
            "<{}.{}@{}>",
            Uuid::new_v4(),
            Utc::now().timestamp(),
            self.from.email.domain()
        )
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: OutgoingEmail) -> SendOutcome {
        let to: Mailbox = match email.to.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Invalid recipient address: {}", e),
                };
            }
        };

        let msg_id = self.message_id();
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .message_id(Some(msg_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(email.html);

        let message = match message {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Failed to build email: {}", e),
                };
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                debug!(to = %email.to, code = %response.code(), "SMTP relay accepted email");
                SendOutcome::Sent {
                    message_id: Some(msg_id),
                }
            }
            Err(e) => SendOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: Some("127.0.0.1".to_string()),
            port: 1,
            username: None,
            password: None,
            use_tls: false,
            use_starttls: false,
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_invalid_sender_is_a_config_error() {
        let result = SmtpSender::new(&config(), "127.0.0.1", "not an address".to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails_without_connecting() {
        let sender = SmtpSender::new(
            &config(),
            "127.0.0.1",
            "Email Campaign <noreply@example.com>".to_string(),
        )
        .unwrap();

        let outcome = sender
            .send(OutgoingEmail {
                to: "nobody".to_string(),
                subject: "Hi".to_string(),
                html: "<p>Hi</p>".to_string(),
            })
            .await;

        match outcome {
            SendOutcome::Failed { error } => assert!(error.starts_with("Invalid recipient address")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_a_failure() {
        let sender = SmtpSender::new(
            &config(),
            "127.0.0.1",
            "Email Campaign <noreply@example.com>".to_string(),
        )
        .unwrap();

        let outcome = sender
            .send(OutgoingEmail {
                to: "info@acme.ge".to_string(),
                subject: "Hi".to_string(),
                html: "<p>Hi</p>".to_string(),
            })
            .await;
        assert!(!outcome.is_sent());
    }

    #[test]
    fn test_message_id_uses_sender_domain() {
        let sender = SmtpSender::new(
            &config(),
            "127.0.0.1",
            "Email Campaign <noreply@example.com>".to_string(),
        )
        .unwrap();
        assert!(sender.message_id().ends_with("@example.com>"));
    }
}
