use chartcast_core::delivery::DeliverySink;
use chartcast_core::domain::row::Batch;
use chartcast_core::error::ScrapeError;
use std::io::Write;

/// Writes the batch to stdout instead of delivering it.
pub struct StdoutSink;

#[async_trait::async_trait]
impl DeliverySink for StdoutSink {
    fn sink_name(&self) -> &'static str {
        "stdout"
    }

    async fn deliver(&self, batch: &Batch) -> Result<(), ScrapeError> {
        let json = serde_json::to_string_pretty(batch)
            .map_err(|e| ScrapeError::Delivery(format!("failed to encode batch: {e}")))?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{json}").map_err(|e| ScrapeError::Delivery(format!("failed to write batch: {e}")))
    }
}
