//! In-process metric registry
//!
//! Families are keyed by metric name, series within a family by label set.
//! Writers from different tasks touch disjoint series; a single `RwLock`
//! around the family map is enough to keep concurrent writes consistent.
//!
//! Series are never removed. A label set written once stays exported with
//! its last value until the process exits.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::warn;

use crate::sink::{owned_labels, MetricsSink};

/// Kind of a metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// Static description of a metric family
#[derive(Debug, Clone, Copy)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

pub(crate) type LabelSet = Vec<(String, String)>;

/// All series of one metric name
#[derive(Debug, Clone)]
pub(crate) struct Family {
    pub(crate) help: String,
    pub(crate) kind: MetricKind,
    pub(crate) series: BTreeMap<LabelSet, f64>,
}

impl Family {
    fn new(help: &str, kind: MetricKind) -> Self {
        Self {
            help: help.to_string(),
            kind,
            series: BTreeMap::new(),
        }
    }
}

/// Label-scoped gauge and counter store
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    families: RwLock<BTreeMap<String, Family>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given families already described
    pub fn with_descriptors(descriptors: &[MetricDescriptor]) -> Self {
        let registry = Self::new();
        for descriptor in descriptors {
            registry.describe(descriptor);
        }
        registry
    }

    /// Register help text and kind for a family.
    ///
    /// Described families are exported (HELP/TYPE only) before any series
    /// has been written. Re-describing keeps existing series.
    pub fn describe(&self, descriptor: &MetricDescriptor) {
        let mut families = self.families.write();
        let family = families
            .entry(descriptor.name.to_string())
            .or_insert_with(|| Family::new(descriptor.help, descriptor.kind));
        family.help = descriptor.help.to_string();
        family.kind = descriptor.kind;
    }

    /// Current value of a series, if it has been written
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let families = self.families.read();
        families.get(name)?.series.get(&owned_labels(labels)).copied()
    }

    /// Number of series in a family
    pub fn series_count(&self, name: &str) -> usize {
        self.families
            .read()
            .get(name)
            .map_or(0, |family| family.series.len())
    }

    /// Kind of a family, if known
    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.families.read().get(name).map(|family| family.kind)
    }

    /// Consistent copy of every family, for rendering
    pub(crate) fn families(&self) -> BTreeMap<String, Family> {
        self.families.read().clone()
    }

    fn write_series(&self, name: &str, kind: MetricKind, labels: &[(&str, &str)], update: impl FnOnce(&mut f64)) {
        let mut families = self.families.write();
        let family = families
            .entry(name.to_string())
            .or_insert_with(|| Family::new("", kind));
        if family.kind != kind {
            warn!(
                metric = name,
                expected = family.kind.as_str(),
                got = kind.as_str(),
                "Ignoring write with mismatched metric kind"
            );
            return;
        }
        update(family.series.entry(owned_labels(labels)).or_insert(0.0));
    }
}

impl MetricsSink for MetricsRegistry {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.write_series(name, MetricKind::Gauge, labels, |v| *v = value);
    }

    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.write_series(name, MetricKind::Counter, labels, |v| *v += 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const FILES: MetricDescriptor = MetricDescriptor {
        name: "test_files_total",
        help: "File count",
        kind: MetricKind::Gauge,
        labels: &["bucket"],
    };

    const ERRORS: MetricDescriptor = MetricDescriptor {
        name: "test_errors_total",
        help: "Error count",
        kind: MetricKind::Counter,
        labels: &["bucket", "type"],
    };

    #[test]
    fn test_gauge_overwrites() {
        let registry = MetricsRegistry::with_descriptors(&[FILES]);
        assert_eq!(registry.value(FILES.name, &[("bucket", "b1")]), None);

        registry.set_gauge(FILES.name, &[("bucket", "b1")], 10.0);
        registry.set_gauge(FILES.name, &[("bucket", "b1")], 3.0);
        registry.set_gauge(FILES.name, &[("bucket", "b2")], 7.0);

        assert_eq!(registry.value(FILES.name, &[("bucket", "b1")]), Some(3.0));
        assert_eq!(registry.value(FILES.name, &[("bucket", "b2")]), Some(7.0));
        assert_eq!(registry.series_count(FILES.name), 2);
    }

    #[test]
    fn test_counter_increments() {
        let registry = MetricsRegistry::with_descriptors(&[ERRORS]);
        let labels = [("bucket", "b1"), ("type", "listing")];
        registry.increment_counter(ERRORS.name, &labels);
        registry.increment_counter(ERRORS.name, &labels);
        registry.increment_counter(ERRORS.name, &[("bucket", "b1"), ("type", "metadata-fetch")]);

        assert_eq!(registry.value(ERRORS.name, &labels), Some(2.0));
        assert_eq!(registry.series_count(ERRORS.name), 2);
    }

    #[test]
    fn test_kind_mismatch_ignored() {
        let registry = MetricsRegistry::with_descriptors(&[FILES, ERRORS]);
        registry.increment_counter(FILES.name, &[("bucket", "b1")]);
        registry.set_gauge(ERRORS.name, &[("bucket", "b1"), ("type", "listing")], 5.0);

        assert_eq!(registry.series_count(FILES.name), 0);
        assert_eq!(registry.series_count(ERRORS.name), 0);
    }

    #[test]
    fn test_undescribed_family_created_on_write() {
        let registry = MetricsRegistry::new();
        registry.set_gauge("adhoc", &[], 1.5);
        assert_eq!(registry.kind("adhoc"), Some(MetricKind::Gauge));
        assert_eq!(registry.value("adhoc", &[]), Some(1.5));
    }

    #[test]
    fn test_concurrent_writers() {
        let registry = Arc::new(MetricsRegistry::with_descriptors(&[FILES, ERRORS]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let bucket = format!("bucket-{i}");
                    for n in 0..100 {
                        registry.set_gauge(FILES.name, &[("bucket", bucket.as_str())], f64::from(n));
                        registry.increment_counter(ERRORS.name, &[("bucket", bucket.as_str()), ("type", "listing")]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.series_count(FILES.name), 8);
        for i in 0..8 {
            let bucket = format!("bucket-{i}");
            assert_eq!(registry.value(FILES.name, &[("bucket", bucket.as_str())]), Some(99.0));
            assert_eq!(
                registry.value(ERRORS.name, &[("bucket", bucket.as_str()), ("type", "listing")]),
                Some(100.0)
            );
        }
    }
}
