//! The metrics sink interface
//!
//! Collectors never touch a global registry. They are handed an
//! `Arc<dyn MetricsSink>` at construction and push values through it.

use parking_lot::Mutex;

/// Write-only destination for metric values.
///
/// Labels are `(name, value)` pairs. Callers pass them in a fixed order per
/// metric; implementations treat two label sets as the same series only when
/// they are equal pairwise.
pub trait MetricsSink: Send + Sync {
    /// Overwrite the gauge series identified by `name` and `labels`
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);

    /// Add one to the counter series identified by `name` and `labels`
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);
}

/// One recorded sink call
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    SetGauge {
        name: String,
        labels: Vec<(String, String)>,
        value: f64,
    },
    IncrementCounter {
        name: String,
        labels: Vec<(String, String)>,
    },
}

impl SinkCall {
    /// Metric name of the call
    pub fn name(&self) -> &str {
        match self {
            Self::SetGauge { name, .. } | Self::IncrementCounter { name, .. } => name,
        }
    }

    /// Label value for `key`, if the call carried it
    pub fn label(&self, key: &str) -> Option<&str> {
        let labels = match self {
            Self::SetGauge { labels, .. } | Self::IncrementCounter { labels, .. } => labels,
        };
        labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that records calls instead of storing values
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of gauge writes
    pub fn gauge_set_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SinkCall::SetGauge { .. }))
            .count()
    }

    /// Number of increments of `name` whose labels include every pair in `labels`
    pub fn counter_increments(&self, name: &str, labels: &[(&str, &str)]) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SinkCall::IncrementCounter { .. }))
            .filter(|c| c.name() == name)
            .filter(|c| labels.iter().all(|(k, v)| c.label(k) == Some(*v)))
            .count()
    }

    /// Most recent value written to the gauge series `name{labels}`
    pub fn last_gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            SinkCall::SetGauge {
                name: n,
                labels: l,
                value,
            } if n == name && same_labels(l, labels) => Some(*value),
            _ => None,
        })
    }
}

impl MetricsSink for RecordingSink {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.calls.lock().push(SinkCall::SetGauge {
            name: name.to_string(),
            labels: owned_labels(labels),
            value,
        });
    }

    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.calls.lock().push(SinkCall::IncrementCounter {
            name: name.to_string(),
            labels: owned_labels(labels),
        });
    }
}

pub(crate) fn owned_labels(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn same_labels(owned: &[(String, String)], labels: &[(&str, &str)]) -> bool {
    owned.len() == labels.len()
        && owned
            .iter()
            .zip(labels)
            .all(|((ok, ov), (k, v))| ok == k && ov == v)
}
