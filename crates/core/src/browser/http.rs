//! Fetch-only sessions: a plain GET of the page document, no script execution.

use super::{PageSession, SessionFactory};
use crate::domain::target::Target;
use crate::error::ScrapeError;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("chartcast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build fetch-only http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SessionFactory for HttpFetcher {
    fn engine_name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn PageSession>, ScrapeError> {
        Ok(Box::new(HttpSession {
            http: self.http.clone(),
            target: target.clone(),
            document: None,
        }))
    }
}

pub struct HttpSession {
    http: reqwest::Client,
    target: Target,
    document: Option<String>,
}

impl HttpSession {
    fn navigation_error(&self, detail: impl Into<String>) -> ScrapeError {
        ScrapeError::Navigation {
            url: self.target.url.clone(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl PageSession for HttpSession {
    fn target(&self) -> &Target {
        &self.target
    }

    fn scripted(&self) -> bool {
        false
    }

    async fn navigate(&mut self) -> Result<(), ScrapeError> {
        let res = self
            .http
            .get(&self.target.url)
            .send()
            .await
            .map_err(|e| self.navigation_error(e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| self.navigation_error(format!("failed to read document: {e}")))?;
        if !status.is_success() {
            return Err(self.navigation_error(format!("HTTP {status}")));
        }

        self.document = Some(text);
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, ScrapeError> {
        Err(ScrapeError::Browser(
            "script evaluation is unavailable in fetch-only mode".to_string(),
        ))
    }

    async fn document(&self) -> Result<String, ScrapeError> {
        self.document
            .clone()
            .ok_or_else(|| ScrapeError::Browser("document not loaded".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        Ok(())
    }
}
