//! Page sessions the pipeline drives: navigate, evaluate a probe, reload, close.
//!
//! `chromium` runs a real headless browser with one isolated browser context
//! per target. `http` fetches the raw document only and cannot run scripts.

pub mod chromium;
pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use crate::domain::target::Target;
use crate::error::ScrapeError;
use async_trait::async_trait;
use serde_json::Value;

/// Opens one session per target. Implementations own the engine; sessions
/// own everything created for their target.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    fn engine_name(&self) -> &'static str;

    /// Creates an isolated session for `target` without navigating yet.
    async fn open(&self, target: &Target) -> Result<Box<dyn PageSession>, ScrapeError>;
}

#[async_trait]
pub trait PageSession: Send + Sync {
    fn target(&self) -> &Target;

    /// Whether `evaluate` can run scripts in the page.
    fn scripted(&self) -> bool;

    /// Loads the target URL, bounded by the session's navigation timeout.
    async fn navigate(&mut self) -> Result<(), ScrapeError>;

    /// Re-issues the navigation inside the same context.
    async fn reload(&mut self) -> Result<(), ScrapeError> {
        self.navigate().await
    }

    /// Runs a read-only expression in the page and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError>;

    /// Current document markup.
    async fn document(&self) -> Result<String, ScrapeError>;

    /// Releases the page and its context. Called exactly once, on every path.
    async fn close(self: Box<Self>) -> Result<(), ScrapeError>;
}
