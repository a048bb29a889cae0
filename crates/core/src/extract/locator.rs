use crate::domain::series::RawSeries;
use crate::extract::markup;
use crate::extract::probe::{ChartInstance, PageSnapshot, MAX_CANDIDATE_BINDINGS};
use anyhow::Result;

/// One way of finding chart series in a probed page.
///
/// `Ok(None)` means "nothing here". Errors are reported but never stop the
/// chain: the locator treats them like `Ok(None)`.
pub trait LocateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, snapshot: &PageSnapshot) -> Result<Option<Vec<RawSeries>>>;
}

/// Reads the chart library's instance registry. Prefers the chart rendered
/// into `chart_id`, otherwise the first registered chart.
#[derive(Debug, Clone, Default)]
pub struct ChartRegistry {
    pub chart_id: Option<String>,
}

impl ChartRegistry {
    fn pick<'a>(&self, charts: &'a [ChartInstance]) -> Option<&'a ChartInstance> {
        let wanted = self.chart_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
        wanted
            .and_then(|id| charts.iter().find(|c| c.id.as_deref() == Some(id)))
            .or_else(|| charts.first())
    }
}

impl LocateStrategy for ChartRegistry {
    fn name(&self) -> &'static str {
        "chart_registry"
    }

    fn locate(&self, snapshot: &PageSnapshot) -> Result<Option<Vec<RawSeries>>> {
        let Some(charts) = snapshot.charts.as_deref() else {
            return Ok(None);
        };
        let Some(chart) = self.pick(charts) else {
            return Ok(None);
        };

        Ok(Some(
            chart
                .series
                .iter()
                .filter_map(RawSeries::from_chart_series)
                .collect(),
        ))
    }
}

/// Treats every global array of `{x, y}` objects as a series named after its binding.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScan;

impl LocateStrategy for NamespaceScan {
    fn name(&self) -> &'static str {
        "namespace_scan"
    }

    fn locate(&self, snapshot: &PageSnapshot) -> Result<Option<Vec<RawSeries>>> {
        let found: Vec<RawSeries> = snapshot
            .bindings
            .iter()
            .filter_map(|b| RawSeries::from_binding(&b.name, &b.value))
            .take(MAX_CANDIDATE_BINDINGS)
            .collect();
        Ok(Some(found))
    }
}

/// Regex extraction of an embedded series literal from the raw document.
#[derive(Debug, Clone, Default)]
pub struct MarkupPattern;

impl LocateStrategy for MarkupPattern {
    fn name(&self) -> &'static str {
        "markup_pattern"
    }

    fn locate(&self, snapshot: &PageSnapshot) -> Result<Option<Vec<RawSeries>>> {
        match snapshot.document.as_deref() {
            Some(doc) => markup::extract_series(doc),
            None => Ok(None),
        }
    }
}

/// Series found by the chain, tagged with the strategy that found them.
#[derive(Debug, Clone)]
pub struct Located {
    pub strategy: &'static str,
    pub series: Vec<RawSeries>,
}

pub struct Locator {
    strategies: Vec<Box<dyn LocateStrategy>>,
}

impl Locator {
    pub fn new(strategies: Vec<Box<dyn LocateStrategy>>) -> Self {
        Self { strategies }
    }

    /// Registry lookup, then namespace scan, then markup extraction.
    pub fn default_chain(chart_id: Option<String>) -> Self {
        Self::new(vec![
            Box::new(ChartRegistry { chart_id }),
            Box::new(NamespaceScan),
            Box::new(MarkupPattern),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First strategy result holding at least one series with points.
    /// Series without points are dropped before the check.
    pub fn locate(&self, snapshot: &PageSnapshot) -> Option<Located> {
        for strategy in &self.strategies {
            let found = match strategy.locate(snapshot) {
                Ok(found) => found,
                Err(err) => {
                    tracing::debug!(strategy = strategy.name(), error = %err, "locate strategy failed");
                    None
                }
            };

            let series: Vec<RawSeries> = found
                .unwrap_or_default()
                .into_iter()
                .filter(|s| !s.points.is_empty())
                .collect();

            if !series.is_empty() {
                return Some(Located {
                    strategy: strategy.name(),
                    series,
                });
            }
        }
        None
    }
}
