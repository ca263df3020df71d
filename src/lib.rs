//! Nuki Bridge Prometheus Exporter
//!
//! Polls the local HTTP API of a Nuki bridge on a fixed interval and
//! exposes the reported device state as Prometheus gauges, while
//! reporting its own liveness to systemd.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! poll (bridge /list) → device (decode, classify) → metrics (registry) → HTTP scrape
//!                                                          ↓
//!                                              liveness (self-scrape, watchdog)
//! ```
//!
//! # Design Principles
//!
//! - **Declared schema**: which record fields are labels and which are
//!   metrics is fixed on the record type, never inferred at runtime
//! - **All-or-nothing cycles**: a failed fetch or a malformed payload
//!   leaves the registry untouched; the next tick retries
//! - **Stale over absent**: a device missing from a payload keeps its
//!   last values until restart
//! - **Single registration**: each metric name has one label schema for
//!   the life of the process
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nuki_exporter::{device, metrics::MetricRegistry};
//!
//! let payload = br#"[{"deviceType":0,"nukiId":1,"name":"Frontdoor","firmwareVersion":"1.0",
//!     "lastKnownState":{"mode":2,"state":3,"doorsensorState":1,"batteryChargeState":80,
//!     "batteryCritical":false,"batteryCharging":true}}]"#;
//!
//! let registry = Arc::new(MetricRegistry::new("nuki").unwrap());
//!
//! for record in device::decode(payload).unwrap() {
//!     let classified = device::classify(&record);
//!     for (name, value) in classified.metrics {
//!         let series = registry.get_or_create(name, classified.label_names).unwrap();
//!         registry.set(&series, classified.label_values.as_slice(), value).unwrap();
//!     }
//! }
//! registry.touch_freshness();
//!
//! assert!(registry.encode().unwrap().contains("nuki_batterychargestate"));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod liveness;
pub mod metrics;
pub mod poll;

// Re-export commonly used types at crate root
pub use config::{Cli, ConfigError, Credentials, Settings};
pub use device::{classify, decode, DeviceRecord};
pub use liveness::{HealthProbe, LivenessProber, Supervisor, SupervisorSignal, SystemdNotifier};
pub use metrics::{MetricRegistry, MetricsServer, MetricsServerConfig};
pub use poll::{HttpBridge, PollDriver};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Namespace prefixed to every exported metric name.
pub const METRIC_NAMESPACE: &str = "nuki";
