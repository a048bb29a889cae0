use crate::domain::row::Row;
use crate::domain::series::RawSeries;
use crate::domain::target::Target;
use crate::error::ScrapeError;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::Value;

// ECMAScript time values are bounded to +-8.64e15 ms.
const MAX_EPOCH_MS: f64 = 8.64e15;

/// Which series survive into the output.
#[derive(Debug, Clone)]
pub struct SeriesFilter {
    pub include_historical: bool,
    pub historical_label: String,
}

impl Default for SeriesFilter {
    fn default() -> Self {
        Self {
            include_historical: false,
            historical_label: "price".to_string(),
        }
    }
}

impl SeriesFilter {
    pub fn keeps(&self, scenario: &str) -> bool {
        self.include_historical || !scenario.eq_ignore_ascii_case(self.historical_label.trim())
    }
}

/// Turns located series into rows for one run (fixed ticker and scrape date).
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub ticker: String,
    pub forecast_date: NaiveDate,
    pub filter: SeriesFilter,
}

impl Normalizer {
    pub fn new(ticker: &str, forecast_date: NaiveDate, filter: SeriesFilter) -> Self {
        Self {
            ticker: ticker.trim().to_ascii_uppercase(),
            forecast_date,
            filter,
        }
    }

    /// Fails with `EmptyResult` when series were found but none of their
    /// points made it into a row.
    pub fn normalize(&self, raw: &[RawSeries], target: &Target) -> Result<Vec<Row>, ScrapeError> {
        if raw.is_empty() {
            return Err(ScrapeError::NotFound);
        }

        let mut rows = Vec::new();
        for series in raw {
            let scenario = series.name.trim();
            if scenario.is_empty() || !self.filter.keeps(scenario) {
                continue;
            }

            for point in &series.points {
                let (Some(x), Some(y)) = (as_number(&point.x), as_number(&point.y)) else {
                    continue;
                };
                let Some(target_date) = to_date(x) else {
                    continue;
                };
                let price = round_price(y);
                if !price.is_finite() {
                    continue;
                }

                rows.push(Row {
                    ticker: self.ticker.clone(),
                    forecast_date: self.forecast_date,
                    target_date,
                    scenario: scenario.to_string(),
                    predicted_price: price,
                    timeframe: target.label.clone(),
                });
            }
        }

        if rows.is_empty() {
            return Err(ScrapeError::EmptyResult { series: raw.len() });
        }
        Ok(rows)
    }
}

/// Numbers pass through; numeric strings are parsed. Null, booleans and
/// non-finite values are rejected.
pub fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// UTC calendar date of an epoch-milliseconds value (day boundary at UTC midnight).
pub fn to_date(epoch_ms: f64) -> Option<NaiveDate> {
    if !epoch_ms.is_finite() || epoch_ms.abs() > MAX_EPOCH_MS {
        return None;
    }
    DateTime::from_timestamp_millis(epoch_ms.trunc() as i64).map(|d| d.date_naive())
}

/// Epoch milliseconds of UTC midnight on `date`.
pub fn midnight_epoch_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Half-up rounding to 2 decimal places. Overflows to infinity for
/// magnitudes near `f64::MAX`; callers drop those points.
pub fn round_price(y: f64) -> f64 {
    (y * 100.0 + 0.5).floor() / 100.0
}
