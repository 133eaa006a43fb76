//! Provrelay Daemon Library
//!
//! Provenance relay service writing kernel provenance records as JSON lines

pub mod config;
pub mod daemon;
pub mod handler;
pub mod metrics;

pub use config::{ConfigManager, DaemonConfig};
pub use daemon::{shutdown_signal, Daemon, DaemonStats};
pub use handler::JsonLinesHandler;
pub use metrics::MetricsCollector;
