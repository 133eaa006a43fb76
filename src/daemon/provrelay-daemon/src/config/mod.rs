//! Configuration management
//! Follows SRP: Only handles configuration loading and validation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use provrelay_system::exclusion::DEFAULT_SELF_FILE;
use provrelay_system::pidfile::DEFAULT_PID_FILE;
use provrelay_system::relay::{DEFAULT_LONG_PREFIX, DEFAULT_SHORT_PREFIX};
use provrelay_system::{ReaderSettings, RelayConfig, SelfExclusion, MAX_CPUS};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::handler::KNOWN_KINDS;

/// Main daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub relay: RelaySection,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Channel and reader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Short channels are `<prefix><cpu>`
    pub short_channel_prefix: PathBuf,
    /// Long channels are `<prefix><cpu>`
    pub long_channel_prefix: PathBuf,
    /// Override the online cpu count
    pub cpus: Option<usize>,
    pub pid_file: PathBuf,
    /// Hide the daemon's own activity from the trace
    pub self_exclusion: bool,
    /// securityfs file receiving the opaque flag
    pub self_file: PathBuf,
    /// Pin each reader thread to its channel's cpu
    pub pin_readers: bool,
    pub idle_sleep_ms: u64,
    pub poll_timeout_ms: u64,
    pub records_per_drain: usize,
    pub startup_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

/// Record output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON lines destination; stdout when unset
    pub file: Option<PathBuf>,
    /// Observe and count records without writing them
    pub query_mode: bool,
    /// Record kinds to drop before dispatch (e.g. "task", "path")
    pub suppress: Vec<String>,
    /// Attach cached path names to relation endpoints
    pub resolve_names: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    /// Interval between relay statistics refreshes
    pub report_interval_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        let reader = ReaderSettings::default();
        Self {
            short_channel_prefix: PathBuf::from(DEFAULT_SHORT_PREFIX),
            long_channel_prefix: PathBuf::from(DEFAULT_LONG_PREFIX),
            cpus: None,
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            self_exclusion: true,
            self_file: PathBuf::from(DEFAULT_SELF_FILE),
            pin_readers: true,
            idle_sleep_ms: reader.idle_sleep.as_millis() as u64,
            poll_timeout_ms: reader.poll_timeout.as_millis() as u64,
            records_per_drain: reader.records_per_drain,
            startup_timeout_ms: 5000,
            stop_timeout_ms: 5000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: None,
            query_mode: false,
            suppress: vec![],
            resolve_names: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1".to_string(),
            port: 9091,
            report_interval_secs: 10,
        }
    }
}

impl RelaySection {
    /// Engine configuration for this section
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            short_prefix: self.short_channel_prefix.clone(),
            long_prefix: self.long_channel_prefix.clone(),
            cpus: self.cpus,
            pid_file: Some(self.pid_file.clone()),
            exclusion: if self.self_exclusion {
                SelfExclusion::SecurityFs(self.self_file.clone())
            } else {
                SelfExclusion::Disabled
            },
            pin_readers: self.pin_readers,
            reader: ReaderSettings {
                idle_sleep: Duration::from_millis(self.idle_sleep_ms),
                poll_timeout: Duration::from_millis(self.poll_timeout_ms),
                records_per_drain: self.records_per_drain,
            },
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: Arc<RwLock<DaemonConfig>>,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a manager holding the default configuration
    pub fn new() -> Self {
        Self::with_config(DaemonConfig::default())
    }

    pub fn with_config(config: DaemonConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
        }
    }

    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_str = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let new_config: DaemonConfig =
            toml::from_str(&config_str).with_context(|| "Failed to parse config file")?;

        {
            let mut config_guard = self.config.write().await;
            *config_guard = new_config;
        }
        self.config_path = Some(path.to_path_buf());

        info!("Loaded configuration from: {}", path.display());
        Ok(())
    }

    /// Save current configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config)?;

        tokio::fs::write(path.as_ref(), config_str)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        info!("Saved configuration to: {}", path.as_ref().display());
        Ok(())
    }

    /// Get current configuration
    pub async fn get_config(&self) -> DaemonConfig {
        self.config.read().await.clone()
    }

    /// Replace the current configuration, e.g. after CLI overrides
    pub async fn set_config(&self, config: DaemonConfig) {
        *self.config.write().await = config;
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Validate configuration
    pub fn validate(config: &DaemonConfig) -> Result<()> {
        let relay = &config.relay;
        if let Some(cpus) = relay.cpus {
            if cpus == 0 || cpus > MAX_CPUS {
                anyhow::bail!("cpus must be between 1 and {}, got {}", MAX_CPUS, cpus);
            }
        }
        if relay.records_per_drain == 0 {
            anyhow::bail!("records_per_drain must be > 0");
        }
        if relay.poll_timeout_ms == 0 {
            anyhow::bail!("poll_timeout_ms must be > 0");
        }
        let reader_latency = relay.poll_timeout_ms.saturating_add(relay.idle_sleep_ms);
        if relay.stop_timeout_ms <= reader_latency {
            anyhow::bail!(
                "stop_timeout_ms ({}) must exceed poll_timeout_ms + idle_sleep_ms ({})",
                relay.stop_timeout_ms,
                reader_latency
            );
        }

        for kind in &config.output.suppress {
            if !KNOWN_KINDS.contains(&kind.as_str()) {
                anyhow::bail!("Unknown record kind in suppress list: {}", kind);
            }
        }

        if !matches!(
            config.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            anyhow::bail!("Invalid log level: {}", config.logging.level);
        }
        if !matches!(config.logging.format.as_str(), "json" | "pretty" | "compact") {
            anyhow::bail!("Invalid log format: {}", config.logging.format);
        }

        if config.metrics.enabled {
            if config.metrics.port == 0 {
                anyhow::bail!("Invalid metrics port: {}", config.metrics.port);
            }
            config
                .metrics
                .bind_address
                .parse::<std::net::IpAddr>()
                .with_context(|| {
                    format!("Invalid metrics bind address: {}", config.metrics.bind_address)
                })?;
        }
        if config.metrics.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be > 0");
        }

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
