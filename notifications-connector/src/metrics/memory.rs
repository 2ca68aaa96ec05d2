//! Queryable in-process counters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::MetricsSink;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    name: String,
    tags: Vec<(String, String)>,
}

impl CounterKey {
    fn new(name: &str, tags: &[(&str, &str)]) -> Self {
        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        tags.sort();
        Self {
            name: name.to_string(),
            tags,
        }
    }
}

/// Counters kept in memory, one per name and tag set.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<CounterKey, AtomicU64>,
}

impl InMemoryMetrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the counter with exactly these tags.
    #[must_use]
    pub fn count(&self, name: &str, tags: &[(&str, &str)]) -> u64 {
        self.counters
            .get(&CounterKey::new(name, tags))
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Returns the sum of every counter named `name`, whatever its tags.
    #[must_use]
    pub fn total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Resets every counter.
    pub fn reset(&self) {
        self.counters.clear();
    }

    /// Converts the counters to a dictionary keyed by counter name.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for entry in &self.counters {
            let name = entry.key().name.clone();
            let value = entry.value().load(Ordering::Relaxed);
            let total = map.get(&name).and_then(serde_json::Value::as_u64).unwrap_or(0);
            map.insert(name, serde_json::Value::from(total + value));
        }
        serde_json::Value::Object(map)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.counters
            .entry(CounterKey::new(name, tags))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}
