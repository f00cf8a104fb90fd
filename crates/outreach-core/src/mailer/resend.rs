//! Resend HTTP API sender

use super::{EmailSender, OutgoingEmail, SendOutcome};
use async_trait::async_trait;
use outreach_common::config::ResendConfig;
use outreach_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    name: Option<String>,
}

/// Sends through `POST {base_url}/emails`
pub struct ResendSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl ResendSender {
    pub fn new(config: &ResendConfig, api_key: &str, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/emails", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for ResendSender {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: OutgoingEmail) -> SendOutcome {
        let body = SendRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Request to Resend failed: {}", e),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<SendResponse>().await {
                Ok(body) => {
                    debug!(to = %email.to, message_id = %body.id, "Resend accepted email");
                    SendOutcome::Sent {
                        message_id: Some(body.id),
                    }
                }
                Err(e) => {
                    warn!(to = %email.to, "Resend accepted email but returned an unreadable body: {}", e);
                    SendOutcome::Sent { message_id: None }
                }
            };
        }

        let error = match response.json::<ErrorResponse>().await {
            Ok(ErrorResponse {
                message: Some(message),
                ..
            }) => message,
            Ok(ErrorResponse {
                name: Some(name), ..
            }) => format!("{} (HTTP {})", name, status.as_u16()),
            _ => format!("Failed to send email (HTTP {})", status.as_u16()),
        };

        SendOutcome::Failed { error }
    }
}
