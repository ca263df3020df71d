//! Static label/metric schema for device records.
//!
//! Whether a field is a series label or a metric value is a property of
//! the record type, fixed when the type is written. Classification only
//! reads values out in that declared order, so the same metric name
//! always receives the same label schema across polls and restarts.

use super::DeviceRecord;

/// A record type with statically declared label and metric fields.
///
/// `label_values` and `metric_values` must yield exactly one entry per
/// declared name, in declaration order.
pub trait RecordSchema {
    /// Label names, in series order.
    const LABELS: &'static [&'static str];
    /// Metric names, in publish order.
    const METRICS: &'static [&'static str];

    /// Label values matching [`Self::LABELS`].
    fn label_values(&self) -> Vec<String>;

    /// Metric values matching [`Self::METRICS`].
    fn metric_values(&self) -> Vec<i64>;
}

impl RecordSchema for DeviceRecord {
    const LABELS: &'static [&'static str] = &["devicetype", "nukiid", "name", "firmwareversion"];

    const METRICS: &'static [&'static str] = &[
        "mode",
        "state",
        "doorsensorstate",
        "batterychargestate",
        "numbatterycharging",
        "numbatterycritical",
    ];

    fn label_values(&self) -> Vec<String> {
        vec![
            self.device_type.to_string(),
            self.nuki_id.to_string(),
            self.name.clone(),
            self.firmware_version.clone(),
        ]
    }

    fn metric_values(&self) -> Vec<i64> {
        vec![
            self.mode,
            self.state,
            self.doorsensor_state,
            self.battery_charge_state,
            self.battery_charging,
            self.battery_critical,
        ]
    }
}

/// A record split into series labels and metric observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Label names in schema order.
    pub label_names: &'static [&'static str],
    /// Label values, aligned with `label_names`.
    pub label_values: Vec<String>,
    /// `(metric name, value)` pairs in schema order.
    pub metrics: Vec<(&'static str, i64)>,
}

/// Splits a record into labels and metrics according to its schema.
pub fn classify<R: RecordSchema>(record: &R) -> Classification {
    let label_values = record.label_values();
    let values = record.metric_values();
    debug_assert_eq!(label_values.len(), R::LABELS.len());
    debug_assert_eq!(values.len(), R::METRICS.len());

    Classification {
        label_names: R::LABELS,
        label_values,
        metrics: R::METRICS.iter().copied().zip(values).collect(),
    }
}
