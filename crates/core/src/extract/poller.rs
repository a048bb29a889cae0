use crate::browser::PageSession;
use crate::error::ScrapeError;
use crate::extract::locator::{Located, Locator};
use crate::extract::probe::{PageSnapshot, PROBE_SCRIPT};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
}

/// Takes one snapshot of the session's page. `Ok(None)` means the probe ran
/// but saw nothing usable yet.
pub async fn take_snapshot(session: &dyn PageSession) -> Result<Option<PageSnapshot>, ScrapeError> {
    if session.scripted() {
        let v = session.evaluate(PROBE_SCRIPT).await?;
        Ok(PageSnapshot::from_probe_value(v))
    } else {
        Ok(Some(PageSnapshot::from_document(session.document().await?)))
    }
}

/// Probes the page every `interval` until the locator finds series or the
/// deadline passes.
///
/// A probe still in flight when the deadline passes is dropped. A session
/// that cannot run scripts serves a static document, so a miss there is
/// `NotFound` right away instead of a `Timeout`.
pub async fn await_ready(
    session: &dyn PageSession,
    locator: &Locator,
    settings: PollSettings,
) -> Result<Located, ScrapeError> {
    let started = Instant::now();
    let mut probes: u32 = 0;

    loop {
        let remaining = settings.deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }

        probes += 1;
        match tokio::time::timeout(remaining, take_snapshot(session)).await {
            Err(_) => {
                tracing::debug!(probes, "probe abandoned at deadline");
                break;
            }
            Ok(Err(err)) => {
                if !session.scripted() {
                    return Err(err);
                }
                tracing::debug!(probes, error = %err, "probe failed; page not ready");
            }
            Ok(Ok(None)) => tracing::debug!(probes, "probe returned no data"),
            Ok(Ok(Some(snapshot))) => {
                if let Some(located) = locator.locate(&snapshot) {
                    tracing::debug!(
                        probes,
                        strategy = located.strategy,
                        series = located.series.len(),
                        "chart data located"
                    );
                    return Ok(located);
                }
                tracing::debug!(probes, ready_state = ?snapshot.ready_state, "no strategy matched yet");
            }
        }

        if !session.scripted() {
            return Err(ScrapeError::NotFound);
        }

        let remaining = settings.deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(settings.interval.min(remaining)).await;
    }

    Err(ScrapeError::Timeout {
        waited: started.elapsed(),
        probes,
    })
}
