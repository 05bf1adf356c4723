use async_trait::async_trait;
use serde::Serialize;

/// Outbound mail. Only one-time codes are ever sent.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

/// Development mailer: writes the code to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(to, code, "otp mail (not delivered, no webhook configured)");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMail<'a> {
    to: &'a str,
    subject: &'a str,
    body: String,
}

/// Hands mail to an HTTP relay as JSON `{to, subject, body}`.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { http_client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        self.http_client
            .post(&self.url)
            .json(&WebhookMail {
                to,
                subject: "Your verification code",
                body: format!("Your verification code is {code}. It expires in a few minutes."),
            })
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!(to, "otp mail handed to webhook");
        Ok(())
    }
}
