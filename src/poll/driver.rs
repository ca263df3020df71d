//! Fixed-interval poll cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::bridge::{BridgeError, BridgeSource};
use crate::device::{self, classify, DecodeError, DeviceRecord};
use crate::liveness::{HealthProbe, Supervisor};
use crate::metrics::{MetricRegistry, RegistryError};

/// Shortest allowed pause between two cycles.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Reasons a whole cycle is abandoned.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Outcome of one published cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices in the payload.
    pub devices: usize,
    /// Values written to the registry.
    pub values_written: usize,
    /// Metric names skipped because of a label schema conflict.
    pub conflicts: Vec<String>,
}

/// Drives fetch → decode → classify → publish on a fixed interval.
pub struct PollDriver<B> {
    bridge: B,
    registry: Arc<MetricRegistry>,
    interval: Duration,
}

impl<B: BridgeSource> PollDriver<B> {
    /// Creates a driver. Intervals shorter than [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(bridge: B, registry: Arc<MetricRegistry>, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                requested_secs = interval.as_secs(),
                min_secs = MIN_POLL_INTERVAL.as_secs(),
                "Poll interval raised to minimum"
            );
        }

        Self {
            bridge,
            registry,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Pause between cycles.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one complete cycle.
    ///
    /// Nothing is written to the registry unless the fetch and the full
    /// decode both succeed.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let payload = self.bridge.fetch().await?;
        let records = device::decode(&payload)?;
        Ok(self.publish(&records))
    }

    /// Publishes decoded records into the registry.
    ///
    /// A metric name whose label schema conflicts with its registered one
    /// is skipped for the rest of this call; its other fields and the
    /// other metrics are still written.
    pub fn publish(&self, records: &[DeviceRecord]) -> CycleReport {
        let mut report = CycleReport {
            devices: records.len(),
            ..Default::default()
        };
        let mut skipped: HashSet<&'static str> = HashSet::new();

        for record in records {
            let classification = classify(record);

            tracing::debug!(
                labels = ?classification.label_names,
                values = ?classification.label_values,
                "Publishing device"
            );

            for &(name, value) in &classification.metrics {
                if skipped.contains(name) {
                    continue;
                }

                let result = self
                    .registry
                    .get_or_create(name, classification.label_names)
                    .and_then(|series| {
                        self.registry
                            .set(&series, classification.label_values.as_slice(), value)
                    });

                match result {
                    Ok(()) => report.values_written += 1,
                    Err(e @ RegistryError::SchemaConflict { .. }) => {
                        tracing::error!(metric = name, error = %e, "Skipping metric for this cycle");
                        skipped.insert(name);
                        report.conflicts.push(name.to_string());
                    }
                    Err(e) => {
                        tracing::warn!(metric = name, error = %e, "Failed to set metric");
                    }
                }
            }
        }

        if report.values_written > 0 {
            self.registry.touch_freshness();
        }

        report
    }

    /// Polls forever: one cycle, one liveness probe, then sleep.
    ///
    /// Cycles never overlap; a slow cycle delays the next one.
    pub async fn run<P: HealthProbe, S: Supervisor + Sync>(&self, prober: &P, supervisor: &S) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting poll loop");

        loop {
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    devices = report.devices,
                    values = report.values_written,
                    conflicts = report.conflicts.len(),
                    "Poll cycle complete"
                ),
                Err(e) => tracing::warn!(error = %e, "Poll cycle failed"),
            }

            prober.probe(supervisor).await;

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::SupervisorSignal;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FRONTDOOR: &str = r#"[{"deviceType":0,"nukiId":1,"name":"Frontdoor","firmwareVersion":"1.0","lastKnownState":{"mode":2,"state":3,"doorsensorState":1,"batteryChargeState":80,"batteryCritical":false,"batteryCharging":true}}]"#;

    const FRONTDOOR_LABELS: [&str; 4] = ["0", "1", "Frontdoor", "1.0"];

    /// Serves canned responses in order, repeating the last one.
    struct StubBridge {
        responses: parking_lot::Mutex<Vec<Result<String, StatusCode>>>,
        fetches: Arc<AtomicUsize>,
    }

    impl StubBridge {
        fn new(mut responses: Vec<Result<String, StatusCode>>) -> Self {
            responses.reverse();
            Self {
                responses: parking_lot::Mutex::new(responses),
                fetches: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl BridgeSource for StubBridge {
        async fn fetch(&self) -> Result<Vec<u8>, BridgeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            let next = if responses.len() > 1 {
                responses.pop()
            } else {
                responses.last().cloned()
            };
            match next.expect("stub has no responses") {
                Ok(body) => Ok(body.into_bytes()),
                Err(status) => Err(BridgeError::Status {
                    status,
                    body: String::new(),
                }),
            }
        }
    }

    /// Notes how many fetches had happened each time it runs.
    struct RecordingProbe {
        fetches: Arc<AtomicUsize>,
        seen: parking_lot::Mutex<Vec<usize>>,
    }

    impl HealthProbe for RecordingProbe {
        async fn probe<S: Supervisor + Sync>(&self, supervisor: &S) -> bool {
            self.seen.lock().push(self.fetches.load(Ordering::SeqCst));
            supervisor.notify(SupervisorSignal::Watchdog);
            true
        }
    }

    #[derive(Default)]
    struct RecordingSupervisor {
        signals: parking_lot::Mutex<Vec<SupervisorSignal>>,
    }

    impl Supervisor for RecordingSupervisor {
        fn notify(&self, signal: SupervisorSignal) {
            self.signals.lock().push(signal);
        }
    }

    fn driver(responses: Vec<Result<String, StatusCode>>) -> PollDriver<StubBridge> {
        let registry = Arc::new(MetricRegistry::new("nuki").unwrap());
        PollDriver::new(StubBridge::new(responses), registry, MIN_POLL_INTERVAL)
    }

    fn value(driver: &PollDriver<StubBridge>, metric: &str, labels: &[&str]) -> Option<f64> {
        driver.registry.series(metric)?.get(labels)
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let d = PollDriver::new(
            StubBridge::new(vec![Ok("[]".to_string())]),
            Arc::new(MetricRegistry::new("nuki").unwrap()),
            Duration::from_secs(5),
        );
        assert_eq!(d.interval(), MIN_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_cycle_publishes_frontdoor() {
        let d = driver(vec![Ok(FRONTDOOR.to_string())]);

        let report = d.run_cycle().await.unwrap();

        assert_eq!(report.devices, 1);
        assert_eq!(report.values_written, 6);
        assert!(report.conflicts.is_empty());
        assert_eq!(value(&d, "mode", &FRONTDOOR_LABELS), Some(2.0));
        assert_eq!(value(&d, "state", &FRONTDOOR_LABELS), Some(3.0));
        assert_eq!(value(&d, "doorsensorstate", &FRONTDOOR_LABELS), Some(1.0));
        assert_eq!(value(&d, "batterychargestate", &FRONTDOOR_LABELS), Some(80.0));
        assert_eq!(value(&d, "numbatterycharging", &FRONTDOOR_LABELS), Some(1.0));
        assert_eq!(value(&d, "numbatterycritical", &FRONTDOOR_LABELS), Some(0.0));
        assert!(d.registry.freshness() > 0.0);

        let output = d.registry.encode().unwrap();
        let mode_line = output
            .lines()
            .find(|l| l.starts_with("nuki_mode{"))
            .unwrap();
        for label in [
            r#"devicetype="0""#,
            r#"nukiid="1""#,
            r#"name="Frontdoor""#,
            r#"firmwareversion="1.0""#,
        ] {
            assert!(mode_line.contains(label), "{} missing {}", mode_line, label);
        }
        assert!(mode_line.ends_with(" 2"));
    }

    #[tokio::test]
    async fn test_bridge_failure_leaves_registry_untouched() {
        let d = driver(vec![Err(StatusCode::SERVICE_UNAVAILABLE)]);

        let result = d.run_cycle().await;

        assert!(matches!(
            result,
            Err(CycleError::Bridge(BridgeError::Status { status, .. }))
                if status == StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(d.registry.is_empty());
        assert_eq!(d.registry.freshness(), 0.0);
    }

    #[tokio::test]
    async fn test_bridge_failure_keeps_previous_values() {
        let d = driver(vec![
            Ok(FRONTDOOR.to_string()),
            Err(StatusCode::SERVICE_UNAVAILABLE),
        ]);

        d.run_cycle().await.unwrap();
        let fresh = d.registry.freshness();
        assert!(d.run_cycle().await.is_err());

        assert_eq!(value(&d, "mode", &FRONTDOOR_LABELS), Some(2.0));
        assert_eq!(d.registry.freshness(), fresh);
    }

    #[tokio::test]
    async fn test_malformed_payload_publishes_nothing() {
        let payload = r#"[{"deviceType":0,"nukiId":1,"name":"Frontdoor","firmwareVersion":"1.0"}]"#;
        let d = driver(vec![Ok(payload.to_string())]);

        let result = d.run_cycle().await;

        assert!(matches!(
            result,
            Err(CycleError::Decode(DecodeError::MalformedPayload(_)))
        ));
        assert!(d.registry.is_empty());
        assert_eq!(d.registry.freshness(), 0.0);
    }

    #[tokio::test]
    async fn test_absent_device_retains_last_value() {
        let garage = r#"[{"deviceType":2,"nukiId":7,"name":"Garage","firmwareVersion":"2.4","lastKnownState":{"mode":3,"state":5,"doorsensorState":0,"batteryChargeState":40,"batteryCritical":false,"batteryCharging":false}}]"#;
        let d = driver(vec![Ok(FRONTDOOR.to_string()), Ok(garage.to_string())]);

        d.run_cycle().await.unwrap();
        d.run_cycle().await.unwrap();

        assert_eq!(value(&d, "state", &FRONTDOOR_LABELS), Some(3.0));
        assert_eq!(value(&d, "state", &["2", "7", "Garage", "2.4"]), Some(5.0));
    }

    #[tokio::test]
    async fn test_empty_payload_does_not_touch_freshness() {
        let d = driver(vec![Ok("[]".to_string())]);

        let report = d.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert_eq!(d.registry.freshness(), 0.0);
    }

    #[test]
    fn test_schema_conflict_skips_only_that_metric() {
        let d = driver(vec![Ok("[]".to_string())]);
        d.registry.get_or_create("mode", &["nukiid"]).unwrap();

        let records = device::decode(FRONTDOOR.as_bytes()).unwrap();
        let report = d.publish(&records);

        assert_eq!(report.conflicts, vec!["mode".to_string()]);
        assert_eq!(report.values_written, 5);
        assert_eq!(value(&d, "mode", &["1"]), None);
        assert_eq!(value(&d, "state", &FRONTDOOR_LABELS), Some(3.0));

        let kept = d.registry.series("mode").unwrap();
        assert_eq!(kept.label_names(), ["nukiid"]);
    }

    #[test]
    fn test_conflict_logged_once_per_cycle() {
        let d = driver(vec![Ok("[]".to_string())]);
        d.registry.get_or_create("mode", &["nukiid"]).unwrap();

        let mut records = device::decode(FRONTDOOR.as_bytes()).unwrap();
        let mut second = records[0].clone();
        second.nuki_id = 2;
        records.push(second);

        let report = d.publish(&records);

        assert_eq!(report.devices, 2);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.values_written, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_after_interval_and_probes_every_cycle() {
        let d = driver(vec![
            Err(StatusCode::SERVICE_UNAVAILABLE),
            Ok(FRONTDOOR.to_string()),
        ]);
        let prober = RecordingProbe {
            fetches: Arc::clone(&d.bridge.fetches),
            seen: parking_lot::Mutex::new(Vec::new()),
        };
        let supervisor = RecordingSupervisor::default();

        let checks = async {
            // The first cycle got a 503, the probe still ran after it.
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(d.bridge.fetches(), 1);
            assert_eq!(*prober.seen.lock(), vec![1]);
            assert!(d.registry.is_empty());

            tokio::time::sleep(Duration::from_secs(28)).await;
            assert_eq!(d.bridge.fetches(), 1, "fetched before the interval elapsed");

            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(d.bridge.fetches(), 2);
            assert_eq!(*prober.seen.lock(), vec![1, 2]);
            assert_eq!(value(&d, "mode", &FRONTDOOR_LABELS), Some(2.0));
            assert_eq!(
                *supervisor.signals.lock(),
                vec![SupervisorSignal::Watchdog, SupervisorSignal::Watchdog]
            );
        };

        tokio::select! {
            _ = d.run(&prober, &supervisor) => panic!("poll loop returned"),
            _ = checks => {}
        }
    }
}
