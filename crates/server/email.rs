//! The `send_email` job handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskq_core::{parse_payload, Dispatcher, HandlerError, HandlerResult, JobHandler};
use thiserror::Error;

/// Job type served by [`EmailHandler`].
pub const SEND_EMAIL: &str = "send_email";

/// Payload of a `send_email` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    /// HTML body. Providers fall back to a plain notice when absent.
    #[serde(default)]
    pub html: Option<String>,
}

impl EmailPayload {
    fn validate(&self) -> Result<(), HandlerError> {
        let missing: Vec<&str> = [
            ("to", &self.to),
            ("from", &self.from),
            ("subject", &self.subject),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::invalid_payload(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Error reported by a mail provider.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Delivers one email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &EmailPayload) -> Result<(), DeliveryError>;
}

/// Mailer that only logs. Used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &EmailPayload) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            "Email delivered (log mailer)"
        );
        Ok(())
    }
}

/// Classify a provider error: upstream 5xx and timeouts are worth retrying,
/// anything else is terminal.
pub fn classify_delivery_error(message: &str) -> HandlerError {
    let transient = ["500", "502", "503", "timeout"]
        .iter()
        .any(|marker| message.contains(marker));

    if transient {
        HandlerError::retryable(format!("server error: {}", message))
    } else {
        HandlerError::terminal(format!("delivery failed: {}", message))
    }
}

/// Handler for `send_email` jobs.
#[derive(Clone)]
pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Register a handler for [`SEND_EMAIL`] on `dispatcher`.
    pub fn register(dispatcher: &mut Dispatcher, mailer: Arc<dyn Mailer>) {
        dispatcher.register(SEND_EMAIL, Arc::new(Self::new(mailer)));
    }
}

#[async_trait]
impl JobHandler for EmailHandler {
    async fn handle(&self, payload: &serde_json::Value) -> HandlerResult {
        let email: EmailPayload = parse_payload(payload)?;
        email.validate()?;

        self.mailer
            .send(&email)
            .await
            .map_err(|e| classify_delivery_error(&e.to_string()))?;

        tracing::debug!(to = %email.to, "Email sent");
        Ok(())
    }
}
