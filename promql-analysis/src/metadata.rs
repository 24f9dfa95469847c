//! Metric and label knowledge fetched from Prometheus
//!
//! A [`MetadataSnapshot`] is immutable once built; refreshes build a new one with
//! [`SnapshotBuilder`] and swap it in whole, so readers never observe a partial update.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::SystemTime;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricMetadata {
    /// `counter`, `gauge`, `histogram`, `summary`, ...
    pub metric_type: String,
    pub help: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSnapshot {
    metric_names: BTreeSet<String>,
    metadata: BTreeMap<String, MetricMetadata>,
    /// metric -> label -> values
    metric_labels: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    /// label -> values across all metrics
    label_values: BTreeMap<String, BTreeSet<String>>,
    refreshed_at: Option<SystemTime>,
}

impl MetadataSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// False until the first successful refresh.
    pub fn is_loaded(&self) -> bool {
        self.refreshed_at.is_some()
    }

    pub fn refreshed_at(&self) -> Option<SystemTime> {
        self.refreshed_at
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metric_names.iter().map(String::as_str)
    }

    pub fn metadata(&self, metric: &str) -> Option<&MetricMetadata> {
        self.metadata.get(metric)
    }

    pub fn has_metric(&self, metric: &str) -> bool {
        self.metric_names.contains(metric)
    }

    /// Label names seen on `metric`, or on any metric when `metric` is unknown or `None`.
    pub fn label_names(&self, metric: Option<&str>) -> Vec<&str> {
        match metric.and_then(|metric| self.metric_labels.get(metric)) {
            Some(labels) => labels.keys().map(String::as_str).collect(),
            None => self.label_values.keys().map(String::as_str).collect(),
        }
    }

    /// Values of `label` seen on `metric`, or on any metric when `metric` is unknown or `None`.
    pub fn label_values(&self, metric: Option<&str>, label: &str) -> Vec<&str> {
        if label == "__name__" {
            return self.metric_names().collect();
        }
        let values = match metric.and_then(|metric| self.metric_labels.get(metric)) {
            Some(labels) => labels.get(label),
            None => self.label_values.get(label),
        };
        values
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: MetadataSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.snapshot.metric_names.insert(name.into());
        self
    }

    pub fn metadata(&mut self, metric: impl Into<String>, metadata: MetricMetadata) -> &mut Self {
        self.snapshot.metadata.insert(metric.into(), metadata);
        self
    }

    /// A label known to exist, even if no series in the lookback window carries it.
    pub fn label_name(&mut self, label: impl Into<String>) -> &mut Self {
        let label = label.into();
        if label != "__name__" {
            self.snapshot.label_values.entry(label).or_default();
        }
        self
    }

    /// Record one series' label set. The metric is taken from `__name__`.
    pub fn series(&mut self, labels: &HashMap<String, String>) -> &mut Self {
        let metric = labels.get("__name__");
        if let Some(metric) = metric {
            self.snapshot.metric_names.insert(metric.clone());
        }
        for (label, value) in labels {
            if label == "__name__" {
                continue;
            }
            self.snapshot
                .label_values
                .entry(label.clone())
                .or_default()
                .insert(value.clone());
            if let Some(metric) = metric {
                self.snapshot
                    .metric_labels
                    .entry(metric.clone())
                    .or_default()
                    .entry(label.clone())
                    .or_default()
                    .insert(value.clone());
            }
        }
        self
    }

    pub fn build(self, refreshed_at: SystemTime) -> MetadataSnapshot {
        let mut snapshot = self.snapshot;
        snapshot.refreshed_at = Some(refreshed_at);
        snapshot
    }
}
