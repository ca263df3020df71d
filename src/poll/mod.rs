//! Bridge polling.
//!
//! One poll cycle fetches the device list from the bridge, decodes it,
//! and publishes every device's metrics into the shared registry. Cycles
//! run strictly one after another on a fixed interval; a failed cycle is
//! simply retried on the next tick.

mod bridge;
mod driver;

pub use bridge::{BridgeConfig, BridgeError, BridgeSource, HttpBridge, DEFAULT_BRIDGE_PORT};
pub use driver::{CycleError, CycleReport, PollDriver, MIN_POLL_INTERVAL};
