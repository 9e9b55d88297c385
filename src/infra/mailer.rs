//! Outbound mail delivery for the mail job worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::application::jobs::{MailError, MailJobPayload, Mailer};
use crate::config::MailerSettings;

use super::error::InfraError;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Posts each message as JSON to an HTTP mail provider.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: Url, api_key: Option<String>, from: String) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|err| InfraError::configuration(format!("mail client: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailJobPayload) -> Result<(), MailError> {
        let body = OutgoingMail {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailJobPayload) -> Result<(), MailError> {
        info!(
            target = "coursehub::mailer",
            to = %message.to,
            subject = %message.subject,
            "mail provider not configured; message logged only"
        );
        Ok(())
    }
}

/// Pick the mailer for the configured settings.
pub fn build_mailer(settings: &MailerSettings) -> Result<Arc<dyn Mailer>, InfraError> {
    let mailer: Arc<dyn Mailer> = match settings.endpoint.clone() {
        Some(endpoint) => Arc::new(HttpMailer::new(
            endpoint,
            settings.api_key.clone(),
            settings.from.clone(),
        )?),
        None => Arc::new(LogMailer),
    };
    Ok(mailer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> MailJobPayload {
        MailJobPayload {
            to: "ada@example.com".into(),
            subject: "hi".into(),
            html: "<p>hi</p>".into(),
        }
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer.send(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let mailer = HttpMailer::new(
            Url::parse("http://127.0.0.1:9/send").unwrap(),
            None,
            "noreply@example.com".into(),
        )
        .unwrap();
        let err = mailer.send(&payload()).await.unwrap_err();
        assert!(matches!(err, MailError::Transport(_)));
    }

    #[test]
    fn missing_endpoint_selects_log_mailer() {
        let settings = MailerSettings {
            endpoint: None,
            api_key: None,
            from: "noreply@example.com".into(),
        };
        assert!(build_mailer(&settings).is_ok());
    }
}
