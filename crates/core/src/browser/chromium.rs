//! Headless Chromium sessions via chromiumoxide.

use super::{PageSession, SessionFactory};
use crate::domain::target::Target;
use crate::error::ScrapeError;
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One headless browser per run. Every `open` gets its own browser context,
/// so targets never share cookies, storage or page state.
pub struct ChromiumBrowser {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    nav_timeout: Duration,
}

impl ChromiumBrowser {
    pub async fn launch(chrome_path: Option<&str>, nav_timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .request_timeout(nav_timeout);
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(error = %err, "chromium handler event error");
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            nav_timeout,
        })
    }

    /// Closes the browser process. Sessions must be closed first.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                browser.close().await.context("failed to close Chromium")?;
                let _ = browser.wait().await;
            }
            Err(_) => tracing::warn!("chromium still referenced by open sessions; dropping"),
        }
        self.handler.abort();
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for ChromiumBrowser {
    fn engine_name(&self) -> &'static str {
        "chromium"
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn PageSession>, ScrapeError> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| ScrapeError::Browser(format!("failed to create browser context: {e}")))?
            .result
            .browser_context_id;

        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(context_id.clone());

        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(e) => {
                dispose_context(&self.browser, context_id).await;
                return Err(ScrapeError::Browser(format!("failed to create page: {e}")));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser: Arc::clone(&self.browser),
            page,
            context_id,
            target: target.clone(),
            nav_timeout: self.nav_timeout,
        }))
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(err) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        tracing::warn!(error = %err, "failed to dispose browser context");
    }
}

pub struct ChromiumSession {
    browser: Arc<Browser>,
    page: Page,
    context_id: BrowserContextId,
    target: Target,
    nav_timeout: Duration,
}

impl ChromiumSession {
    fn navigation_error(&self, detail: impl Into<String>) -> ScrapeError {
        ScrapeError::Navigation {
            url: self.target.url.clone(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    fn target(&self) -> &Target {
        &self.target
    }

    fn scripted(&self) -> bool {
        true
    }

    async fn navigate(&mut self) -> Result<(), ScrapeError> {
        let load = async {
            self.page.goto(self.target.url.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(self.nav_timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.navigation_error(e.to_string())),
            Err(_) => Err(self.navigation_error(format!(
                "timed out after {:?}",
                self.nav_timeout
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Browser(format!("JS execution failed: {e}")))?;

        result
            .into_value::<Value>()
            .map_err(|e| ScrapeError::Browser(format!("failed to convert JS result: {e:?}")))
    }

    async fn document(&self) -> Result<String, ScrapeError> {
        let v = self.evaluate("document.documentElement.outerHTML").await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| ScrapeError::Browser("document markup is not a string".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        let Self {
            browser,
            page,
            context_id,
            ..
        } = *self;

        let closed = page
            .close()
            .await
            .map_err(|e| ScrapeError::Browser(format!("failed to close page: {e}")));
        dispose_context(&browser, context_id).await;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::probe::{PageSnapshot, PROBE_SCRIPT};

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn probe_reads_inline_series_binding() {
        let browser = ChromiumBrowser::launch(None, Duration::from_secs(30))
            .await
            .expect("failed to launch browser");
        let target = Target::new(
            "data:text/html,<script>var bullCase=[{x:1700000000000,y:1.5}];</script>",
            "1m",
        );

        let mut session = browser.open(&target).await.expect("failed to open session");
        session.navigate().await.expect("navigation failed");

        let snap = PageSnapshot::from_probe_value(session.evaluate(PROBE_SCRIPT).await.unwrap())
            .expect("probe returned null");
        assert!(snap.charts.is_none());
        assert_eq!(snap.bindings[0].name, "bullCase");

        session.close().await.expect("close failed");
        browser.shutdown().await.expect("shutdown failed");
    }
}
