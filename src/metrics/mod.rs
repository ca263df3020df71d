//! Prometheus registry and scrape endpoint for bridge device metrics.
//!
//! Series are created lazily: the first time a metric name is published,
//! a gauge family is registered under the exporter namespace with the
//! label schema of the record that carried it. That schema is then fixed
//! for the life of the process.
//!
//! # Metrics Exposed
//!
//! ## Device Metrics
//! Labelled `devicetype`, `nukiid`, `name` and `firmwareversion`:
//! - `nuki_mode` - Operating mode code
//! - `nuki_state` - Lock state code
//! - `nuki_doorsensorstate` - Door sensor state code
//! - `nuki_batterychargestate` - Battery charge in percent
//! - `nuki_numbatterycharging` - 1 while charging
//! - `nuki_numbatterycritical` - 1 while critical
//!
//! ## Exporter Metrics
//! - `nuki_lastUpdate{scope="global"}` - Epoch seconds of the last publish
//! - `process_*` - Process metrics (Linux only)
//!
//! # Example
//!
//! ```
//! use nuki_exporter::metrics::MetricRegistry;
//!
//! let registry = MetricRegistry::new("nuki").expect("Failed to create registry");
//!
//! let series = registry.get_or_create("mode", &["nukiid"]).unwrap();
//! registry.set(&series, &["1"], 2).unwrap();
//! registry.touch_freshness();
//!
//! assert!(registry.encode().unwrap().contains(r#"nuki_mode{nukiid="1"} 2"#));
//! ```

mod registry;
mod server;

pub use registry::{MetricRegistry, MetricSeries, RegistryError, FRESHNESS_METRIC};
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
