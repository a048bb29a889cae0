//! Scripted in-memory sessions for pipeline tests.

use super::{PageSession, SessionFactory};
use crate::domain::target::Target;
use crate::error::ScrapeError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a fake page behaves for one target label.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Probe returns this value from the first load on.
    Ready(Value),
    /// Probe returns null until the page has been reloaded once.
    ReadyAfterReload(Value),
    /// Probe never returns data.
    Never,
    /// Navigation fails on every load.
    NavFails,
    /// A session without script support that serves this document.
    Static(String),
    /// A session without script support whose document cannot be read.
    StaticBroken,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub loads: AtomicUsize,
    pub probes: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
    pub counters: Arc<Counters>,
}

impl FakeFactory {
    pub fn with(self, label: &str, behavior: Behavior) -> Self {
        self.behaviors
            .lock()
            .expect("behaviors lock")
            .insert(label.to_string(), behavior);
        self
    }

    pub fn count(&self, f: impl Fn(&Counters) -> &AtomicUsize) -> usize {
        f(&self.counters).load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    fn engine_name(&self) -> &'static str {
        "fake"
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn PageSession>, ScrapeError> {
        let behavior = self
            .behaviors
            .lock()
            .expect("behaviors lock")
            .get(&target.label)
            .cloned()
            .unwrap_or(Behavior::Never);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeSession {
            target: target.clone(),
            behavior,
            loads: 0,
            counters: Arc::clone(&self.counters),
        }))
    }
}

pub struct FakeSession {
    target: Target,
    behavior: Behavior,
    loads: usize,
    counters: Arc<Counters>,
}

#[async_trait]
impl PageSession for FakeSession {
    fn target(&self) -> &Target {
        &self.target
    }

    fn scripted(&self) -> bool {
        !matches!(self.behavior, Behavior::Static(_) | Behavior::StaticBroken)
    }

    async fn navigate(&mut self) -> Result<(), ScrapeError> {
        self.loads += 1;
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if matches!(self.behavior, Behavior::NavFails) {
            return Err(ScrapeError::Navigation {
                url: self.target.url.clone(),
                detail: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, ScrapeError> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.behavior {
            Behavior::Ready(v) => v.clone(),
            Behavior::ReadyAfterReload(v) if self.loads >= 2 => v.clone(),
            _ => Value::Null,
        })
    }

    async fn document(&self) -> Result<String, ScrapeError> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Static(doc) => Ok(doc.clone()),
            Behavior::StaticBroken => Err(ScrapeError::Browser("document unavailable".to_string())),
            _ => Ok(String::new()),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Probe value holding one registry chart with a single series.
pub fn chart_probe(name: &str, points: &[(i64, f64)]) -> Value {
    let data: Vec<Value> = points
        .iter()
        .map(|(x, y)| serde_json::json!([x, y]))
        .collect();
    serde_json::json!({
        "readyState": "complete",
        "charts": [{"id": "forecast-chart", "series": [{"name": name, "data": data}]}],
        "bindings": []
    })
}
