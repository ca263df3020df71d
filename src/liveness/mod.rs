//! Self-check and supervisor notification.
//!
//! After every poll cycle the exporter scrapes its own metrics endpoint
//! over loopback. A successful scrape is reported to the supervisor as a
//! watchdog heartbeat; a failed one is only logged, leaving the restart
//! decision to the supervisor's own watchdog timeout.

mod probe;
mod supervisor;

pub use probe::{probe_url, HealthProbe, LivenessProber, ProbeError};
pub use supervisor::{NoopSupervisor, Supervisor, SupervisorSignal, SystemdNotifier};
