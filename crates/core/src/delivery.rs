use crate::config::Settings;
use crate::domain::row::Batch;
use crate::error::ScrapeError;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Receives the whole batch in one request. No partial delivery.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    fn sink_name(&self) -> &'static str;

    async fn deliver(&self, batch: &Batch) -> Result<(), ScrapeError>;
}

/// POSTs the batch as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookSink {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings.require_webhook_url()?.to_string();

        let timeout_secs = std::env::var("WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(url, settings.webhook_token.clone(), Duration::from_secs(timeout_secs))
    }

    pub fn new(url: String, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook http client")?;

        Ok(Self { http, url, token })
    }

    fn headers(&self) -> Result<HeaderMap, ScrapeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ScrapeError::Delivery(format!("invalid WEBHOOK_TOKEN: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl DeliverySink for WebhookSink {
    fn sink_name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, batch: &Batch) -> Result<(), ScrapeError> {
        let res = self
            .http
            .post(&self.url)
            .headers(self.headers()?)
            .json(batch)
            .send()
            .await
            .map_err(|e| ScrapeError::Delivery(format!("webhook request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ScrapeError::Delivery(format!("webhook HTTP {status}: {text}")));
        }
        Ok(())
    }
}
