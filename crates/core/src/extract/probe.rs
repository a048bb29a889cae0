use serde::Deserialize;
use serde_json::Value;

/// Upper bound on global keys the namespace scan walks.
pub const MAX_SCANNED_BINDINGS: usize = 2000;
/// Upper bound on candidate arrays the namespace scan returns.
pub const MAX_CANDIDATE_BINDINGS: usize = 50;

/// Read-only probe evaluated in the page. It never throws: a missing chart
/// library yields `charts: null`, and anything that cannot be serialized makes
/// the whole probe return `null`.
pub const PROBE_SCRIPT: &str = r#"(() => {
  const MAX_KEYS = 2000;
  const MAX_CANDIDATES = 50;
  const plain = (v) => (v instanceof Date ? v.getTime() : v);
  const point = (p) => (p && typeof p === 'object' && !Array.isArray(p)) ? { x: plain(p.x), y: plain(p.y) } : p;
  const out = { readyState: document.readyState, charts: null, bindings: [] };

  try {
    const hc = window.Highcharts;
    if (hc && Array.isArray(hc.charts)) {
      out.charts = hc.charts.filter(Boolean).map((c) => {
        let id = null;
        try {
          id = (c.renderTo && c.renderTo.id) || (c.options && c.options.chart && c.options.chart.renderTo) || null;
        } catch (_) {}
        let series = [];
        try {
          series = (c.series || []).map((s) => {
            const o = s.options || {};
            const data = Array.isArray(o.data) && o.data.length ? o.data : (s.points || []);
            return { name: s.name, data: data.map(point), pointStart: o.pointStart, pointInterval: o.pointInterval };
          });
          if (!series.length && c.userOptions && Array.isArray(c.userOptions.series)) {
            series = c.userOptions.series.map((s) => ({
              name: s.name, data: (s.data || []).map(point), pointStart: s.pointStart, pointInterval: s.pointInterval,
            }));
          }
        } catch (_) {}
        return { id: typeof id === 'string' ? id : null, series };
      });
    }
  } catch (_) {}

  try {
    const keys = Object.keys(window).slice(0, MAX_KEYS);
    for (const k of keys) {
      if (out.bindings.length >= MAX_CANDIDATES) break;
      let v;
      try { v = window[k]; } catch (_) { continue; }
      if (Array.isArray(v) && v.length && v[0] && typeof v[0] === 'object' && 'x' in v[0] && 'y' in v[0]) {
        out.bindings.push({ name: k, value: v.map(point) });
      }
    }
  } catch (_) {}

  try { return JSON.parse(JSON.stringify(out)); } catch (_) { return null; }
})()"#;

/// What one probe saw. Scripted sessions fill the chart and binding fields;
/// fetch-only sessions only carry the raw document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    #[serde(default)]
    pub ready_state: Option<String>,

    /// `None` when the chart library is not loaded (yet).
    #[serde(default)]
    pub charts: Option<Vec<ChartInstance>>,

    #[serde(default)]
    pub bindings: Vec<Binding>,

    #[serde(skip)]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartInstance {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub series: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl PageSnapshot {
    /// Interprets the probe's return value; `null` (or any non-object) is "not ready".
    pub fn from_probe_value(v: Value) -> Option<Self> {
        if !v.is_object() {
            return None;
        }
        serde_json::from_value(v).ok()
    }

    pub fn from_document(document: String) -> Self {
        Self {
            document: Some(document),
            ..Default::default()
        }
    }
}
