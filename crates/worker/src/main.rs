use anyhow::Context;
use chartcast_core::browser::chromium::ChromiumBrowser;
use chartcast_core::browser::http::HttpFetcher;
use chartcast_core::config::{ScrapeOptions, Settings};
use chartcast_core::delivery::{DeliverySink, WebhookSink};
use chartcast_core::domain::target::{build_targets, Target};
use chartcast_core::pipeline::Pipeline;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod dry_run;

#[derive(Debug, Parser)]
#[command(name = "chartcast_worker")]
struct Args {
    /// Symbol to scrape. Overrides TICKER.
    #[arg(long)]
    ticker: Option<String>,

    /// Exchange code used in the target URL. Overrides EXCHANGE.
    #[arg(long)]
    exchange: Option<String>,

    /// Comma-separated timeframe labels. Overrides TIMEFRAMES.
    #[arg(long)]
    timeframes: Option<String>,

    /// Scrape date (YYYY-MM-DD) stamped on every row. Defaults to today's UTC date.
    #[arg(long)]
    forecast_date: Option<String>,

    /// Extract from the raw document without a headless browser.
    #[arg(long)]
    fetch_only: bool,

    /// Do everything except delivering; print the batch to stdout.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args, settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "run failed");
    }
    res
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let mut opts = ScrapeOptions::from_env()?;
    opts.fetch_only |= args.fetch_only;

    let ticker = match args.ticker.as_deref() {
        Some(t) => t.trim().to_string(),
        None => settings.require_ticker()?.to_string(),
    };
    let exchange = args.exchange.clone().or_else(|| settings.exchange.clone());
    let timeframes = match args.timeframes.as_deref() {
        Some(s) => chartcast_core::config::parse_timeframes(s),
        None => settings.timeframes.clone(),
    };

    let targets = build_targets(
        settings.require_target_url_template()?,
        &ticker,
        exchange.as_deref(),
        &timeframes,
    )?;

    let scraped_at = chrono::Utc::now();
    let forecast_date = resolve_forecast_date(args.forecast_date.as_deref(), scraped_at)?;
    let pipeline = Pipeline::from_options(&ticker, forecast_date, &opts);

    let sink: Box<dyn DeliverySink> = if args.dry_run {
        Box::new(dry_run::StdoutSink)
    } else {
        Box::new(WebhookSink::from_settings(&settings)?)
    };

    tracing::info!(
        %ticker,
        %forecast_date,
        targets = targets.len(),
        fetch_only = opts.fetch_only,
        dry_run = args.dry_run,
        "starting extraction run"
    );

    if opts.fetch_only {
        let fetcher = HttpFetcher::new(opts.nav_timeout)?;
        return deliver(&pipeline, &fetcher, sink.as_ref(), &targets, exchange, scraped_at).await;
    }

    let browser = ChromiumBrowser::launch(settings.chromium_path.as_deref(), opts.nav_timeout).await?;
    let res = deliver(&pipeline, &browser, sink.as_ref(), &targets, exchange, scraped_at).await;
    if let Err(err) = browser.shutdown().await {
        tracing::warn!(error = %err, "browser shutdown failed");
    }
    res
}

async fn deliver(
    pipeline: &Pipeline,
    factory: &dyn chartcast_core::browser::SessionFactory,
    sink: &dyn DeliverySink,
    targets: &[Target],
    exchange: Option<String>,
    scraped_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<()> {
    let summary = pipeline
        .run_and_deliver(factory, sink, targets, exchange, scraped_at)
        .await
        .context("extraction run failed")?;

    if summary.failed_targets.is_empty() {
        tracing::info!(run_id = %summary.run_id, rows = summary.rows, "run complete");
    } else {
        tracing::warn!(
            run_id = %summary.run_id,
            rows = summary.rows,
            failed_targets = ?summary.failed_targets,
            "run complete with partial batch"
        );
    }
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_forecast_date(
    arg: Option<&str>,
    now_utc: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --forecast-date {s:?}"));
    }
    Ok(now_utc.date_naive())
}
