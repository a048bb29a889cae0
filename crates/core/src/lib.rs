pub mod browser;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_TIMEFRAMES: &str = "1m,3m";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub ticker: Option<String>,
        pub exchange: Option<String>,
        pub target_url_template: Option<String>,
        pub timeframes: Vec<String>,
        pub webhook_url: Option<String>,
        pub webhook_token: Option<String>,
        pub sentry_dsn: Option<String>,
        pub chromium_path: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                ticker: non_blank_var("TICKER"),
                exchange: non_blank_var("EXCHANGE"),
                target_url_template: non_blank_var("TARGET_URL_TEMPLATE"),
                timeframes: parse_timeframes(
                    std::env::var("TIMEFRAMES").ok().as_deref().unwrap_or(DEFAULT_TIMEFRAMES),
                ),
                webhook_url: non_blank_var("WEBHOOK_URL"),
                webhook_token: non_blank_var("WEBHOOK_TOKEN"),
                sentry_dsn: non_blank_var("SENTRY_DSN"),
                chromium_path: non_blank_var("CHROMIUM_PATH"),
            })
        }

        pub fn require_ticker(&self) -> anyhow::Result<&str> {
            self.ticker.as_deref().context("TICKER is required")
        }

        pub fn require_target_url_template(&self) -> anyhow::Result<&str> {
            self.target_url_template
                .as_deref()
                .context("TARGET_URL_TEMPLATE is required")
        }

        pub fn require_webhook_url(&self) -> anyhow::Result<&str> {
            self.webhook_url
                .as_deref()
                .context("WEBHOOK_URL is required")
        }
    }

    /// Knobs for one extraction run. Every field has a default and can be
    /// overridden through the environment.
    #[derive(Debug, Clone)]
    pub struct ScrapeOptions {
        /// Upper bound for the initial navigation of each target.
        pub nav_timeout: Duration,

        /// Delay between two probe evaluations.
        pub poll_interval: Duration,

        /// Total time the poller waits for hydration before giving up.
        pub poll_deadline: Duration,

        /// Pause after a reload before the retry attempt starts polling.
        pub retry_settle: Duration,

        /// Container id of the chart the registry lookup should prefer.
        pub chart_id: Option<String>,

        /// Keep the historical price series in the output.
        pub include_historical: bool,

        /// Series label treated as the historical price line.
        pub historical_label: String,

        /// Skip the headless browser and extract from the raw document only.
        pub fetch_only: bool,
    }

    impl Default for ScrapeOptions {
        fn default() -> Self {
            Self {
                nav_timeout: Duration::from_secs(90),
                poll_interval: Duration::from_millis(500),
                poll_deadline: Duration::from_secs(45),
                retry_settle: Duration::from_millis(3000),
                chart_id: None,
                include_historical: false,
                historical_label: "price".to_string(),
                fetch_only: false,
            }
        }
    }

    impl ScrapeOptions {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut out = Self::default();

            if let Some(n) = parse_var::<u64>("NAV_TIMEOUT_SECS") {
                out.nav_timeout = Duration::from_secs(n);
            }
            if let Some(n) = parse_var::<u64>("POLL_INTERVAL_MS") {
                out.poll_interval = Duration::from_millis(n);
            }
            if let Some(n) = parse_var::<u64>("POLL_DEADLINE_SECS") {
                out.poll_deadline = Duration::from_secs(n);
            }
            if let Some(n) = parse_var::<u64>("RETRY_SETTLE_MS") {
                out.retry_settle = Duration::from_millis(n);
            }
            if let Some(s) = non_blank_var("CHART_ID") {
                out.chart_id = Some(s);
            }
            if let Some(b) = non_blank_var("INCLUDE_HISTORICAL") {
                out.include_historical = parse_bool(&b);
            }
            if let Some(s) = non_blank_var("HISTORICAL_LABEL") {
                out.historical_label = s;
            }
            if let Some(b) = non_blank_var("FETCH_ONLY") {
                out.fetch_only = parse_bool(&b);
            }

            out.validate()?;
            Ok(out)
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            let nav_secs = self.nav_timeout.as_secs();
            anyhow::ensure!(
                (1..=600).contains(&nav_secs),
                "NAV_TIMEOUT_SECS must be 1..=600 (got {nav_secs})"
            );
            anyhow::ensure!(
                !self.poll_interval.is_zero(),
                "POLL_INTERVAL_MS must be > 0"
            );
            anyhow::ensure!(
                self.poll_deadline >= self.poll_interval,
                "POLL_DEADLINE_SECS must not be shorter than the poll interval"
            );
            Ok(())
        }
    }

    pub fn parse_timeframes(s: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() || out.iter().any(|t| t == part) {
                continue;
            }
            out.push(part.to_string());
        }
        out
    }

    fn non_blank_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    fn parse_bool(s: &str) -> bool {
        matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

}
