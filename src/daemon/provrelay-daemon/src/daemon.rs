//! Core daemon implementation
//! Registers the relay with the JSON lines handler and runs until shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use provrelay_system::{NameCache, ProvenanceHandler, Relay, RelayStats, StatsSnapshot};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::{ConfigManager, DaemonConfig};
use crate::handler::JsonLinesHandler;
use crate::metrics::{MetricsCollector, MetricsStats};

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

/// Main daemon orchestrator
pub struct Daemon {
    config: DaemonConfig,
    relay: Relay,
    handler: Arc<JsonLinesHandler>,
    names: Arc<NameCache>,
    relay_stats: Arc<RelayStats>,
    metrics_collector: Arc<MetricsCollector>,
    shutdown_sender: broadcast::Sender<()>,
}

impl Daemon {
    /// Open the output and register the relay.
    ///
    /// Registration blocks on reader startup, so it runs off the async
    /// workers.
    pub async fn new(config_manager: &ConfigManager) -> Result<Self> {
        let config = config_manager.get_config().await;

        let names = Arc::new(NameCache::new());
        let metrics_collector = Arc::new(MetricsCollector::new());
        let handler = Arc::new(
            JsonLinesHandler::open(
                &config.output,
                Arc::clone(&names),
                Arc::clone(&metrics_collector),
            )
            .with_context(|| "Failed to open record output")?,
        );

        let relay_config = config.relay.to_relay_config();
        let relay_handler: Arc<dyn ProvenanceHandler> = handler.clone();
        let relay_names = Arc::clone(&names);
        let relay = tokio::task::spawn_blocking(move || {
            Relay::register_with_names(relay_config, relay_handler, relay_names)
        })
        .await
        .with_context(|| "Relay registration task failed")?
        .with_context(|| "Failed to register provenance relay")?;

        let relay_stats = relay.stats_handle();
        let (shutdown_sender, _) = broadcast::channel(1);

        info!(
            "Relay registered on {} cpus, output: {}",
            relay.cpus(),
            config
                .output
                .file
                .as_ref()
                .map_or_else(|| "stdout".to_string(), |p| p.display().to_string())
        );

        Ok(Self {
            config,
            relay,
            handler,
            names,
            relay_stats,
            metrics_collector,
            shutdown_sender,
        })
    }

    /// Run the daemon until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the daemon until `shutdown` resolves
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        info!("Provrelay daemon running");
        self.start_metrics_reporter();

        shutdown.await;
        self.shutdown().await
    }

    /// Periodically publish relay counters
    fn start_metrics_reporter(&self) {
        let metrics = Arc::clone(&self.metrics_collector);
        let relay_stats = Arc::clone(&self.relay_stats);
        let names = Arc::clone(&self.names);
        let period = Duration::from_secs(self.config.metrics.report_interval_secs);
        let mut shutdown = self.shutdown_sender.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = relay_stats.snapshot();
                        metrics.update_relay_stats(&snapshot, names.len());
                        debug!(
                            "Relay stats: {} short, {} long, {} filtered, {} decode errors, {} io errors",
                            snapshot.short_records,
                            snapshot.long_records,
                            snapshot.filtered,
                            snapshot.decode_errors,
                            snapshot.io_errors
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });

        info!("Started metrics reporter");
    }

    /// Graceful shutdown: stop every reader, then flush the output
    pub async fn shutdown(self) -> Result<()> {
        info!("Starting graceful shutdown...");

        let _ = self.shutdown_sender.send(());

        let mut relay = self.relay;
        tokio::task::spawn_blocking(move || relay.stop())
            .await
            .with_context(|| "Relay stop task failed")?
            .with_context(|| "Relay did not stop cleanly")?;

        self.metrics_collector
            .update_relay_stats(&self.relay_stats.snapshot(), self.names.len());
        self.handler
            .flush()
            .with_context(|| "Failed to flush record output")?;

        info!("Graceful shutdown completed");
        Ok(())
    }

    /// Get daemon statistics
    pub fn get_stats(&self) -> DaemonStats {
        let metrics_stats = self.metrics_collector.get_stats();

        DaemonStats {
            cpus: self.relay.cpus(),
            relay: self.relay_stats.snapshot(),
            cached_names: self.names.len(),
            metrics: metrics_stats,
        }
    }
}

/// Daemon statistics
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStats {
    pub cpus: usize,
    pub relay: StatsSnapshot,
    pub cached_names: usize,
    pub metrics: MetricsStats,
}
