use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point as found in the page. Coordinates are left untyped until the
/// normalizer validates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub y: Value,
}

impl RawPoint {
    pub fn new(x: impl Into<Value>, y: impl Into<Value>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSeries {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points: Vec<RawPoint>,
}

impl RawSeries {
    pub fn new(name: impl Into<String>, points: Vec<RawPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Decodes a chart-library series object (`{name, data, pointStart, pointInterval}`).
    /// Returns `None` when the value has no point array.
    pub fn from_chart_series(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let data = obj
            .get("data")
            .or_else(|| obj.get("points"))
            .and_then(Value::as_array)?;

        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default();
        let point_start = obj.get("pointStart").and_then(Value::as_f64);
        let point_interval = obj.get("pointInterval").and_then(Value::as_f64);

        Some(Self::new(
            name,
            decode_points(data, point_start, point_interval),
        ))
    }

    /// Treats a bare `[{x, y}, ...]` array as a series named after the binding
    /// that holds it. Anything else is rejected.
    pub fn from_binding(name: &str, v: &Value) -> Option<Self> {
        let arr = v.as_array()?;
        if !looks_like_xy_array(arr) {
            return None;
        }
        Some(Self::new(name, decode_points(arr, None, None)))
    }
}

/// True when the first element is an object exposing both `x` and `y`.
pub fn looks_like_xy_array(arr: &[Value]) -> bool {
    arr.first()
        .and_then(Value::as_object)
        .is_some_and(|o| o.contains_key("x") && o.contains_key("y"))
}

/// Accepts `{x, y}` objects, `[x, y]` pairs and bare y values. Bare values
/// (and objects without `x`) are positioned from `point_start` when the series
/// declares one; otherwise their `x` stays null.
pub fn decode_points(
    data: &[Value],
    point_start: Option<f64>,
    point_interval: Option<f64>,
) -> Vec<RawPoint> {
    let interval = point_interval.unwrap_or(1.0);
    let implied_x = |idx: usize| -> Value {
        match point_start {
            Some(start) => serde_json::json!(start + interval * idx as f64),
            None => Value::Null,
        }
    };

    data.iter()
        .enumerate()
        .map(|(idx, p)| match p {
            Value::Object(o) => RawPoint {
                x: o.get("x").cloned().unwrap_or_else(|| implied_x(idx)),
                y: o.get("y").cloned().unwrap_or(Value::Null),
            },
            Value::Array(pair) if pair.len() >= 2 => RawPoint {
                x: pair[0].clone(),
                y: pair[1].clone(),
            },
            Value::Array(single) if single.len() == 1 => RawPoint {
                x: implied_x(idx),
                y: single[0].clone(),
            },
            Value::Number(_) | Value::String(_) => RawPoint {
                x: implied_x(idx),
                y: p.clone(),
            },
            _ => RawPoint {
                x: Value::Null,
                y: Value::Null,
            },
        })
        .collect()
}
