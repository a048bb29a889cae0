//! Per-target state machine and the run that strings targets together.
//!
//! Each target goes `Pending -> Polling -> {Success | Retrying | Failed}`, and
//! `Retrying -> Polling` at most once. A failed target never affects the rows
//! of the others.

use crate::browser::{PageSession, SessionFactory};
use crate::config::ScrapeOptions;
use crate::delivery::DeliverySink;
use crate::domain::row::{Batch, Row};
use crate::domain::target::Target;
use crate::error::ScrapeError;
use crate::extract::locator::Locator;
use crate::extract::poller::{await_ready, PollSettings};
use crate::normalize::{Normalizer, SeriesFilter};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// One initial attempt plus one reload.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug)]
pub enum TargetState {
    Pending,
    Polling { attempt: u32 },
    Retrying { cause: ScrapeError },
    Success { rows: Vec<Row> },
    Failed { error: ScrapeError },
}

impl TargetState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Polling { .. } => "polling",
            Self::Retrying { .. } => "retrying",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }
}

/// Where a failure on `attempt` leads.
pub fn on_failure(error: ScrapeError, attempt: u32) -> TargetState {
    if error.is_retryable() && attempt < MAX_ATTEMPTS {
        TargetState::Retrying { cause: error }
    } else {
        TargetState::Failed { error }
    }
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: Target,
    pub attempts: u32,
    pub result: Result<Vec<Row>, ScrapeError>,
}

impl TargetOutcome {
    pub fn row_count(&self) -> usize {
        self.result.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl RunReport {
    /// Rows of all successful targets, in target order.
    pub fn rows(&self) -> Vec<Row> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flatten()
            .cloned()
            .collect()
    }

    pub fn failed_labels(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.target.label.as_str())
            .collect()
    }

    /// Fails with `NoRows` when no target produced anything.
    pub fn into_batch(
        self,
        ticker: &str,
        exchange: Option<String>,
        scraped_at: DateTime<Utc>,
    ) -> Result<Batch, ScrapeError> {
        let rows = self.rows();
        if rows.is_empty() {
            return Err(ScrapeError::NoRows {
                failed: self.failed_labels().len(),
            });
        }
        Ok(Batch::new(ticker.trim().to_ascii_uppercase(), exchange, scraped_at, rows))
    }
}

pub struct Pipeline {
    locator: Locator,
    normalizer: Normalizer,
    poll: PollSettings,
    retry_settle: Duration,
}

impl Pipeline {
    pub fn new(locator: Locator, normalizer: Normalizer, poll: PollSettings, retry_settle: Duration) -> Self {
        Self {
            locator,
            normalizer,
            poll,
            retry_settle,
        }
    }

    pub fn from_options(ticker: &str, forecast_date: chrono::NaiveDate, opts: &ScrapeOptions) -> Self {
        Self::new(
            Locator::default_chain(opts.chart_id.clone()),
            Normalizer::new(
                ticker,
                forecast_date,
                SeriesFilter {
                    include_historical: opts.include_historical,
                    historical_label: opts.historical_label.clone(),
                },
            ),
            PollSettings {
                interval: opts.poll_interval,
                deadline: opts.poll_deadline,
            },
            opts.retry_settle,
        )
    }

    /// Scrapes every target in order. Never fails as a whole; per-target
    /// errors are kept in the report.
    pub async fn run(&self, factory: &dyn SessionFactory, targets: &[Target]) -> RunReport {
        let mut report = RunReport::default();
        for target in targets {
            let outcome = self.run_target(factory, target).await;
            match &outcome.result {
                Ok(rows) => tracing::info!(
                    timeframe = %target.label,
                    rows = rows.len(),
                    attempts = outcome.attempts,
                    "target scraped"
                ),
                Err(err) => tracing::warn!(
                    timeframe = %target.label,
                    attempts = outcome.attempts,
                    kind = err.kind(),
                    error = %err,
                    "target failed"
                ),
            }
            report.outcomes.push(outcome);
        }
        report
    }

    /// Runs a whole cycle: scrape, build the batch, hand it to the sink.
    /// The sink is never called when there are no rows.
    pub async fn run_and_deliver(
        &self,
        factory: &dyn SessionFactory,
        sink: &dyn DeliverySink,
        targets: &[Target],
        exchange: Option<String>,
        scraped_at: DateTime<Utc>,
    ) -> Result<RunSummary, ScrapeError> {
        let report = self.run(factory, targets).await;
        let failed: Vec<String> = report.failed_labels().into_iter().map(str::to_string).collect();

        let batch = report.into_batch(&self.normalizer.ticker, exchange, scraped_at)?;
        sink.deliver(&batch).await?;

        tracing::info!(
            run_id = %batch.run_id,
            rows = batch.row_count,
            sink = sink.sink_name(),
            failed_targets = ?failed,
            "batch delivered"
        );

        Ok(RunSummary {
            run_id: batch.run_id,
            rows: batch.row_count,
            failed_targets: failed,
        })
    }

    /// Opens a session for `target`, drives it to a terminal state and always
    /// closes it, including when the state machine panics.
    pub async fn run_target(&self, factory: &dyn SessionFactory, target: &Target) -> TargetOutcome {
        tracing::info!(timeframe = %target.label, url = %target.url, engine = factory.engine_name(), "scraping target");

        let mut session = match factory.open(target).await {
            Ok(session) => session,
            Err(error) => {
                return TargetOutcome {
                    target: target.clone(),
                    attempts: 0,
                    result: Err(error),
                }
            }
        };

        let driven = AssertUnwindSafe(self.drive(session.as_mut())).catch_unwind().await;

        if let Err(err) = session.close().await {
            tracing::warn!(timeframe = %target.label, error = %err, "failed to close session");
        }

        let (state, attempts) = match driven {
            Ok(done) => done,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let result = match state {
            TargetState::Success { rows } => Ok(rows),
            TargetState::Failed { error } => Err(error),
            other => Err(ScrapeError::Browser(format!(
                "target stopped in non-terminal state {}",
                other.name()
            ))),
        };

        TargetOutcome {
            target: target.clone(),
            attempts,
            result,
        }
    }

    async fn drive(&self, session: &mut dyn PageSession) -> (TargetState, u32) {
        let mut state = TargetState::Pending;
        let mut attempts: u32 = 0;

        while !state.is_terminal() {
            state = match state {
                TargetState::Pending => {
                    attempts = 1;
                    match session.navigate().await {
                        Ok(()) => TargetState::Polling { attempt: attempts },
                        Err(err) => on_failure(err, attempts),
                    }
                }
                TargetState::Polling { attempt } => match self.extract(session).await {
                    Ok(rows) => TargetState::Success { rows },
                    Err(err) => on_failure(err, attempt),
                },
                TargetState::Retrying { cause } => {
                    attempts += 1;
                    tracing::warn!(
                        timeframe = %session.target().label,
                        kind = cause.kind(),
                        error = %cause,
                        "attempt failed; reloading once"
                    );
                    match session.reload().await {
                        Ok(()) => {
                            tokio::time::sleep(self.retry_settle).await;
                            TargetState::Polling { attempt: attempts }
                        }
                        Err(err) => TargetState::Failed { error: err },
                    }
                }
                done => done,
            };
        }

        (state, attempts)
    }

    async fn extract(&self, session: &dyn PageSession) -> Result<Vec<Row>, ScrapeError> {
        let located = await_ready(session, &self.locator, self.poll).await?;
        self.normalizer.normalize(&located.series, session.target())
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: uuid::Uuid,
    pub rows: usize,
    pub failed_targets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{chart_probe, Behavior, FakeFactory};
    use crate::domain::series::RawSeries;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;
    use std::sync::Mutex;

    const DAY_MS: i64 = 86_400_000;
    const START_MS: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Batch>>,
        reject: bool,
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        fn sink_name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, batch: &Batch) -> Result<(), ScrapeError> {
            if self.reject {
                return Err(ScrapeError::Delivery("HTTP 500".to_string()));
            }
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    impl RecordingSink {
        fn calls(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Locator::default_chain(Some("forecast-chart".into())),
            Normalizer::new("aapl", NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(), SeriesFilter::default()),
            PollSettings {
                interval: Duration::from_millis(2),
                deadline: Duration::from_millis(20),
            },
            Duration::ZERO,
        )
    }

    fn targets() -> Vec<Target> {
        vec![
            Target::new("https://example.com/aapl?range=1m", "1m"),
            Target::new("https://example.com/aapl?range=3m", "3m"),
        ]
    }

    fn bull_probe() -> serde_json::Value {
        chart_probe(
            "Bull Scenario",
            &[(START_MS, 101.234), (START_MS + DAY_MS, 102.5), (START_MS + 2 * DAY_MS, 103.999)],
        )
    }

    fn scraped_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap()
    }

    #[test]
    fn failure_transitions_respect_the_retry_budget() {
        assert!(matches!(on_failure(ScrapeError::NotFound, 1), TargetState::Retrying { .. }));
        assert!(matches!(on_failure(ScrapeError::NotFound, 2), TargetState::Failed { .. }));
        assert!(matches!(
            on_failure(ScrapeError::Browser("gone".into()), 1),
            TargetState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn two_targets_yield_rows_tagged_with_their_timeframe() {
        let factory = FakeFactory::default()
            .with("1m", Behavior::Ready(bull_probe()))
            .with("3m", Behavior::Ready(bull_probe()));
        let sink = RecordingSink::default();

        let summary = pipeline()
            .run_and_deliver(&factory, &sink, &targets(), None, scraped_at())
            .await
            .unwrap();

        assert_eq!(summary.rows, 6);
        assert!(summary.failed_targets.is_empty());

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let rows = &batches[0].rows;
        assert_eq!(rows.len(), 6);
        assert!(rows[..3].iter().all(|r| r.timeframe == "1m"));
        assert!(rows[3..].iter().all(|r| r.timeframe == "3m"));
        assert!(rows.iter().all(|r| r.ticker == "AAPL" && r.scenario == "Bull Scenario"));
        assert_eq!(rows[0].target_date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(rows[0].predicted_price, 101.23);
        assert_eq!(rows[2].predicted_price, 104.0);
        assert_eq!(batches[0].ticker, "AAPL");

        assert_eq!(factory.count(|c| &c.opened), 2);
        assert_eq!(factory.count(|c| &c.closed), 2);
    }

    #[tokio::test]
    async fn target_that_never_hydrates_does_not_drop_other_rows() {
        let factory = FakeFactory::default()
            .with("1m", Behavior::Ready(bull_probe()))
            .with("3m", Behavior::Never);
        let sink = RecordingSink::default();

        let summary = pipeline()
            .run_and_deliver(&factory, &sink, &targets(), None, scraped_at())
            .await
            .unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.failed_targets, vec!["3m".to_string()]);
        assert_eq!(sink.calls(), 1);
        // 1m loads once; 3m loads, times out, reloads once, times out again.
        assert_eq!(factory.count(|c| &c.loads), 3);
        assert_eq!(factory.count(|c| &c.closed), 2);
    }

    #[tokio::test]
    async fn all_targets_failing_never_reaches_the_sink() {
        let factory = FakeFactory::default()
            .with("1m", Behavior::NavFails)
            .with("3m", Behavior::Never);
        let sink = RecordingSink::default();

        let err = pipeline()
            .run_and_deliver(&factory, &sink, &targets(), None, scraped_at())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::NoRows { failed: 2 }));
        assert_eq!(sink.calls(), 0);
        assert_eq!(factory.count(|c| &c.closed), 2);
    }

    #[tokio::test]
    async fn failing_twice_contributes_zero_rows_after_exactly_one_retry() {
        let factory = FakeFactory::default().with("1m", Behavior::NavFails);
        let target = Target::new("https://example.com/aapl?range=1m", "1m");

        let outcome = pipeline().run_target(&factory, &target).await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.row_count(), 0);
        assert!(matches!(outcome.result, Err(ScrapeError::Navigation { .. })));
        assert_eq!(factory.count(|c| &c.loads), 2);
    }

    #[tokio::test]
    async fn reload_recovers_a_slow_page() {
        let factory = FakeFactory::default().with("1m", Behavior::ReadyAfterReload(bull_probe()));
        let target = Target::new("https://example.com/aapl?range=1m", "1m");

        let outcome = pipeline().run_target(&factory, &target).await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.row_count(), 3);
    }

    #[tokio::test]
    async fn unusable_series_fail_as_empty_result() {
        let probe = json!({
            "charts": [{"id": "forecast-chart", "series": [{"name": "Price", "data": [[START_MS, 1.0]]}]}]
        });
        let factory = FakeFactory::default().with("1m", Behavior::Ready(probe));
        let target = Target::new("https://example.com/aapl?range=1m", "1m");

        let outcome = pipeline().run_target(&factory, &target).await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(outcome.result, Err(ScrapeError::EmptyResult { series: 1 })));
    }

    #[tokio::test]
    async fn delivery_failure_fails_the_run() {
        let factory = FakeFactory::default().with("1m", Behavior::Ready(bull_probe()));
        let sink = RecordingSink {
            reject: true,
            ..Default::default()
        };

        let err = pipeline()
            .run_and_deliver(&factory, &sink, &targets()[..1], None, scraped_at())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Delivery(_)));
    }

    #[tokio::test]
    async fn static_page_without_series_reloads_once_then_fails_not_found() {
        let factory = FakeFactory::default().with("1m", Behavior::Static("<html></html>".to_string()));
        let target = Target::new("https://example.com/aapl?range=1m", "1m");
        let slow = Pipeline::new(
            Locator::default_chain(None),
            Normalizer::new("aapl", NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(), SeriesFilter::default()),
            PollSettings {
                interval: Duration::from_millis(50),
                deadline: Duration::from_secs(5),
            },
            Duration::ZERO,
        );

        let started = std::time::Instant::now();
        let outcome = slow.run_target(&factory, &target).await;

        assert!(matches!(outcome.result, Err(ScrapeError::NotFound)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.attempts, 2);
        assert_eq!(factory.count(|c| &c.loads), 2);
        assert_eq!(factory.count(|c| &c.probes), 2);
        assert_eq!(factory.count(|c| &c.closed), 1);
    }

    #[tokio::test]
    async fn fetch_only_run_extracts_rows_from_served_markup() {
        use crate::browser::http::HttpFetcher;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/aapl/1m"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><script>
                    Highcharts.chart('forecast-chart', { series: [
                      { name: 'Price', data: [[1699920000000, 180.1]] },
                      { name: "Analyst's Bull", data: [[1700000000000, 190.456], [1700086400000, '191.2'],] },
                    ]});
                </script></html>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aapl/3m"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no chart</html>"))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let targets = vec![
            Target::new(format!("{}/aapl/1m", server.uri()), "1m"),
            Target::new(format!("{}/aapl/3m", server.uri()), "3m"),
        ];
        let sink = RecordingSink::default();

        let summary = pipeline()
            .run_and_deliver(&fetcher, &sink, &targets, Some("NASDAQ".into()), scraped_at())
            .await
            .unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.failed_targets, vec!["3m".to_string()]);

        let batches = sink.batches.lock().unwrap();
        let rows = &batches[0].rows;
        assert!(rows.iter().all(|r| r.scenario == "Analyst's Bull" && r.timeframe == "1m"));
        assert_eq!(rows[0].target_date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(rows[0].predicted_price, 190.46);
        assert_eq!(rows[1].predicted_price, 191.2);
    }

    #[test]
    fn report_concatenates_rows_in_target_order() {
        let normalizer = Normalizer::new("aapl", NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(), SeriesFilter::default());
        let raw = vec![RawSeries::from_chart_series(&json!({"name": "Bear", "data": [[START_MS, 1.0]]})).unwrap()];
        let t1 = Target::new("u1", "1m");
        let t3 = Target::new("u3", "3m");

        let report = RunReport {
            outcomes: vec![
                TargetOutcome { target: t3.clone(), attempts: 1, result: normalizer.normalize(&raw, &t3) },
                TargetOutcome { target: t1.clone(), attempts: 2, result: Err(ScrapeError::NotFound) },
                TargetOutcome { target: t1.clone(), attempts: 1, result: normalizer.normalize(&raw, &t1) },
            ],
        };

        let labels: Vec<String> = report.rows().into_iter().map(|r| r.timeframe).collect();
        assert_eq!(labels, vec!["3m", "1m"]);
        assert_eq!(report.failed_labels(), vec!["1m"]);
    }
}
