use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// One page to scrape, tagged with the forecast horizon it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    pub label: String,
}

impl Target {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }
}

/// Expands `{ticker}`, `{exchange}` and `{timeframe}` in `template` once per
/// timeframe, keeping the timeframe order.
pub fn build_targets(
    template: &str,
    ticker: &str,
    exchange: Option<&str>,
    timeframes: &[String],
) -> anyhow::Result<Vec<Target>> {
    ensure!(!timeframes.is_empty(), "at least one timeframe is required");
    ensure!(
        template.contains("{timeframe}") || timeframes.len() == 1,
        "TARGET_URL_TEMPLATE must contain {{timeframe}} when scraping {} timeframes",
        timeframes.len()
    );
    ensure!(
        exchange.is_some() || !template.contains("{exchange}"),
        "EXCHANGE is required by TARGET_URL_TEMPLATE"
    );

    let ticker = ticker.trim().to_ascii_lowercase();
    ensure!(!ticker.is_empty(), "ticker must be non-empty");
    let exchange = exchange.map(|e| e.trim().to_ascii_lowercase()).unwrap_or_default();

    Ok(timeframes
        .iter()
        .map(|tf| {
            let url = template
                .replace("{ticker}", &ticker)
                .replace("{exchange}", &exchange)
                .replace("{timeframe}", tf);
            Target::new(url, tf.clone())
        })
        .collect())
}
