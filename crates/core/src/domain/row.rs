use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One forecast point ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub ticker: String,
    pub forecast_date: NaiveDate,
    pub target_date: NaiveDate,
    pub scenario: String,
    pub predicted_price: f64,
    pub timeframe: String,
}

/// Everything one run delivers in a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub row_count: usize,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(
        ticker: impl Into<String>,
        exchange: Option<String>,
        scraped_at: DateTime<Utc>,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            exchange,
            scraped_at,
            run_id: Uuid::new_v4(),
            row_count: rows.len(),
            rows,
        }
    }
}
