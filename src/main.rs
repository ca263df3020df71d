//! Nuki Exporter CLI
//!
//! Serves bridge device metrics for Prometheus and polls the bridge
//! until interrupted.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nuki_exporter::{
    config::{Cli, LogLevel, Settings},
    liveness::{probe_url, LivenessProber, Supervisor, SupervisorSignal},
    metrics::{MetricRegistry, MetricsServer, MetricsServerConfig},
    poll::{HttpBridge, PollDriver},
    METRIC_NAMESPACE,
};
use tracing::{error, info};

/// Exit status for configuration and startup failures.
const EXIT_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file_config = match cli.load_file_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config file: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    // Initialize logging; RUST_LOG wins over --log_level
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(LogLevel::resolve(&cli, &file_config).env_filter(rust_log.as_deref()))
        .init();

    info!("Nuki Exporter v{}", nuki_exporter::VERSION);

    let settings = match Settings::resolve(cli, file_config) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    tracing::debug!(
        listen_addr = %settings.listen_addr,
        metrics_path = %settings.metrics_path,
        bridge = %settings.bridge.host,
        "Configuration loaded"
    );

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(settings: Settings) -> Result<(), String> {
    let registry = Arc::new(
        MetricRegistry::new(METRIC_NAMESPACE)
            .map_err(|e| format!("Failed to create registry: {}", e))?,
    );

    let bridge = HttpBridge::new(&settings.bridge, &settings.credentials)
        .map_err(|e| format!("Failed to set up bridge client: {}", e))?;

    let server = MetricsServer::new(
        MetricsServerConfig {
            bind_addr: settings.listen_addr,
            metrics_path: settings.metrics_path.clone(),
        },
        Arc::clone(&registry),
    );
    let listener = server
        .bind()
        .await
        .map_err(|e| format!("Failed to start metrics server: {}", e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to read listen address: {}", e))?;
    let server_task = tokio::spawn(server.serve(listener));

    #[cfg(unix)]
    let supervisor = nuki_exporter::liveness::SystemdNotifier::from_env();
    #[cfg(not(unix))]
    let supervisor = nuki_exporter::liveness::NoopSupervisor;
    supervisor.notify(SupervisorSignal::Ready);

    let prober = LivenessProber::new(probe_url(local_addr, &settings.metrics_path))
        .map_err(|e| format!("Failed to set up liveness probe: {}", e))?;
    let driver = PollDriver::new(bridge, registry, settings.interval);

    tokio::select! {
        _ = driver.run(&prober, &supervisor) => Ok(()),
        result = server_task => match result {
            Ok(Ok(())) => Err("Metrics server stopped".to_string()),
            Ok(Err(e)) => Err(format!("Metrics server failed: {}", e)),
            Err(e) => Err(format!("Metrics server task failed: {}", e)),
        },
        _ = shutdown_signal() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
