use std::time::Duration;

/// Failures a run can hit, from page navigation through delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },

    #[error("chart data not ready after {waited:?} ({probes} probes)")]
    Timeout { waited: Duration, probes: u32 },

    #[error("no extraction strategy found chart series")]
    NotFound,

    #[error("found {series} series but none produced a valid row")]
    EmptyResult { series: usize },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("no rows produced by any target ({failed} failed)")]
    NoRows { failed: usize },

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl ScrapeError {
    /// Whether a reload of the same target may recover from this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Navigation { .. } | Self::Timeout { .. } | Self::NotFound | Self::EmptyResult { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigation { .. } => "navigation",
            Self::Timeout { .. } => "timeout",
            Self::NotFound => "not_found",
            Self::EmptyResult { .. } => "empty_result",
            Self::Browser(_) => "browser",
            Self::NoRows { .. } => "no_rows",
            Self::Delivery(_) => "delivery",
        }
    }
}
