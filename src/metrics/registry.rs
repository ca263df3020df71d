//! Registry of dynamically created device gauges.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Name of the freshness gauge, before the namespace prefix.
pub const FRESHNESS_METRIC: &str = "lastUpdate";

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("metric {name} already registered with labels {registered:?}, requested {requested:?}")]
    SchemaConflict {
        name: String,
        registered: Vec<String>,
        requested: Vec<String>,
    },

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A registered gauge family with a fixed label schema.
///
/// Cloning is cheap; clones refer to the same underlying family.
#[derive(Clone)]
pub struct MetricSeries {
    name: Arc<str>,
    label_names: Arc<[String]>,
    gauge: GaugeVec,
}

impl MetricSeries {
    /// Metric name without the namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label names in schema order.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Returns the current value for a label tuple, if it was ever set.
    pub fn get<S: AsRef<str>>(&self, label_values: &[S]) -> Option<f64> {
        if label_values.len() != self.label_names.len() {
            return None;
        }
        let values: Vec<&str> = label_values.iter().map(AsRef::as_ref).collect();
        let families = self.gauge.collect();
        let value = families
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                // Label pairs come back sorted by name, so match by name.
                self.label_names.iter().zip(&values).all(|(name, value)| {
                    metric.get_label().iter().any(|pair| {
                        pair.get_name() == name.as_str() && pair.get_value() == *value
                    })
                })
            })
            .map(|metric| metric.get_gauge().get_value());
        value
    }

    fn schema_matches(&self, label_names: &[&str]) -> bool {
        self.label_names.len() == label_names.len()
            && self.label_names.iter().zip(label_names).all(|(a, b)| a == b)
    }
}

impl std::fmt::Debug for MetricSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSeries")
            .field("name", &self.name)
            .field("label_names", &self.label_names)
            .finish()
    }
}

/// Process-wide table of device gauges, keyed by metric name.
///
/// Shared between the poll driver, which writes, and the scrape handler,
/// which reads. Lookup-or-create is serialized by a single mutex; value
/// updates go straight to the underlying atomic gauges.
pub struct MetricRegistry {
    registry: Registry,
    namespace: String,
    series: Mutex<HashMap<String, MetricSeries>>,
    freshness: Gauge,
}

impl MetricRegistry {
    /// Creates a registry with the freshness gauge registered.
    pub fn new(namespace: impl Into<String>) -> Result<Self, RegistryError> {
        let namespace = namespace.into();
        let registry = Registry::new();

        let last_update = GaugeVec::new(
            Opts::new(FRESHNESS_METRIC, "Last update timestamp in epoch seconds")
                .namespace(namespace.clone()),
            &["scope"],
        )?;
        registry.register(Box::new(last_update.clone()))?;

        // Materialize the child now so scrapes see it before the first publish.
        let freshness = last_update.get_metric_with_label_values(&["global"])?;
        freshness.set(0.0);

        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self {
            registry,
            namespace,
            series: Mutex::new(HashMap::new()),
            freshness,
        })
    }

    /// Returns the series for `name`, registering it on first use.
    ///
    /// Fails with [`RegistryError::SchemaConflict`] when `name` is already
    /// registered with a different label list. The existing series is
    /// never replaced.
    pub fn get_or_create(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<MetricSeries, RegistryError> {
        let mut series = self.series.lock();

        if let Some(existing) = series.get(name) {
            if existing.schema_matches(label_names) {
                return Ok(existing.clone());
            }
            return Err(RegistryError::SchemaConflict {
                name: name.to_string(),
                registered: existing.label_names.to_vec(),
                requested: label_names.iter().map(|l| l.to_string()).collect(),
            });
        }

        let gauge = GaugeVec::new(
            Opts::new(name, "N/A").namespace(self.namespace.clone()),
            label_names,
        )?;
        self.registry.register(Box::new(gauge.clone()))?;

        let created = MetricSeries {
            name: Arc::from(name),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            gauge,
        };
        series.insert(name.to_string(), created.clone());

        tracing::info!(
            metric = name,
            labels = ?label_names,
            "Registered metric"
        );

        Ok(created)
    }

    /// Records `value` for a label tuple, replacing any previous value.
    pub fn set<S: AsRef<str>>(
        &self,
        series: &MetricSeries,
        label_values: &[S],
        value: i64,
    ) -> Result<(), RegistryError> {
        let values: Vec<&str> = label_values.iter().map(AsRef::as_ref).collect();
        series
            .gauge
            .get_metric_with_label_values(&values)?
            .set(value as f64);

        tracing::trace!(metric = %series.name, labels = ?values, value, "Set metric");
        Ok(())
    }

    /// Sets the freshness marker to the current wall-clock time.
    pub fn touch_freshness(&self) {
        self.freshness.set(chrono::Utc::now().timestamp() as f64);
    }

    /// Returns the freshness marker in epoch seconds (0 before any publish).
    pub fn freshness(&self) -> f64 {
        self.freshness.get()
    }

    /// Looks up an already registered series.
    pub fn series(&self, name: &str) -> Option<MetricSeries> {
        self.series.lock().get(name).cloned()
    }

    /// Number of registered device metric names.
    pub fn len(&self) -> usize {
        self.series.lock().len()
    }

    /// Returns true if no device metric has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
