//! Provrelay Daemon - provenance relay service
//!
//! Drains the per-cpu provenance relay channels of the kernel module and
//! writes every record as a JSON line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use provrelay_daemon::{ConfigManager, Daemon, DaemonConfig};
use provrelay_system::pidfile::read_pid;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Provrelay - provenance relay daemon
#[derive(Parser)]
#[command(name = "provrelayd")]
#[command(about = "Relays kernel provenance records to a JSON lines stream")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start(StartArgs),
    /// Stop a running daemon
    Stop(StopArgs),
    /// Check daemon status
    Status(StatusArgs),
    /// Validate configuration
    Validate(ValidateArgs),
    /// Generate default configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct StartArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "provrelayd.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the cpu count
    #[arg(long)]
    cpus: Option<usize>,

    /// Override the output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Observe records without writing them
    #[arg(short, long)]
    query: bool,
}

#[derive(Args)]
struct StopArgs {
    /// Configuration file naming the PID file
    #[arg(short, long, default_value = "provrelayd.toml")]
    config: PathBuf,

    /// Force stop (SIGKILL)
    #[arg(short, long)]
    force: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Configuration file naming the PID file
    #[arg(short, long, default_value = "provrelayd.toml")]
    config: PathBuf,
}

#[derive(Args)]
struct ValidateArgs {
    /// Configuration file to validate
    #[arg(short, long, default_value = "provrelayd.toml")]
    config: PathBuf,
}

#[derive(Args)]
struct ConfigArgs {
    /// Output file for generated config
    #[arg(short, long, default_value = "provrelayd.toml")]
    output: PathBuf,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => start_daemon(args).await,
        Commands::Stop(args) => stop_daemon(args).await,
        Commands::Status(args) => show_status(args).await,
        Commands::Validate(args) => validate_config(args).await,
        Commands::Config(args) => generate_config(args).await,
    }
}

/// Load `path` if it exists, defaults otherwise
async fn load_config(path: &Path) -> Result<ConfigManager> {
    let mut config_manager = ConfigManager::new();
    if path.exists() {
        config_manager
            .load_from_file(path)
            .await
            .with_context(|| "Failed to load configuration")?;
    }
    Ok(config_manager)
}

/// Start the provenance relay daemon
async fn start_daemon(args: StartArgs) -> Result<()> {
    let config_manager = load_config(&args.config).await?;
    let mut config = config_manager.get_config().await;

    // Apply CLI overrides
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    if let Some(cpus) = args.cpus {
        config.relay.cpus = Some(cpus);
    }
    if let Some(output) = args.output {
        config.output.file = Some(output);
    }
    if args.query {
        config.output.query_mode = true;
    }

    init_tracing(&config)?;
    info!("Starting provrelay daemon v{}", env!("CARGO_PKG_VERSION"));
    if config_manager.config_path().is_none() {
        warn!(
            "Configuration file {} not found, using defaults",
            args.config.display()
        );
    }

    ConfigManager::validate(&config)?;

    if config.metrics.enabled {
        init_metrics(&config)?;
    }

    config_manager.set_config(config).await;
    let daemon = Daemon::new(&config_manager).await?;
    daemon.run().await
}

/// Stop the daemon named by the configured PID file
async fn stop_daemon(args: StopArgs) -> Result<()> {
    let config = load_config(&args.config).await?.get_config().await;
    let pid_file = &config.relay.pid_file;

    let pid = read_pid(pid_file)
        .with_context(|| format!("Failed to read PID file: {}", pid_file.display()))?
        .with_context(|| format!("Daemon not running (no PID file at {})", pid_file.display()))?;

    let signal = if args.force {
        libc::SIGKILL
    } else {
        libc::SIGTERM
    };
    send_signal(pid, signal)?;
    println!("Sent {} to {}", if args.force { "SIGKILL" } else { "SIGTERM" }, pid);

    if args.force {
        // no cleanup runs after SIGKILL
        let _ = tokio::fs::remove_file(pid_file).await;
        return Ok(());
    }

    for _ in 0..100 {
        if !pid_file.exists() {
            println!("✓ Daemon stopped");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("Daemon {} did not stop within 10s", pid)
}

/// Show daemon status
async fn show_status(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.config).await?.get_config().await;
    let pid_file = &config.relay.pid_file;

    println!("Provrelay Daemon Status");
    println!("=======================");
    println!("PID file: {}", pid_file.display());

    match read_pid(pid_file)? {
        Some(pid) if process_alive(pid) => println!("Status: running (pid {pid})"),
        Some(pid) => println!("Status: stale PID file (pid {pid} not running)"),
        None => println!("Status: stopped"),
    }
    Ok(())
}

/// Validate configuration file
async fn validate_config(args: ValidateArgs) -> Result<()> {
    let mut config_manager = ConfigManager::new();
    config_manager.load_from_file(&args.config).await?;

    let config = config_manager.get_config().await;
    ConfigManager::validate(&config)?;

    println!("✓ Configuration is valid");
    Ok(())
}

/// Generate default configuration file
async fn generate_config(args: ConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "Configuration file already exists: {}",
            args.output.display()
        );
    }

    let config_manager = ConfigManager::with_config(DaemonConfig::default());
    config_manager.save_to_file(&args.output).await?;

    println!("Generated configuration file: {}", args.output.display());
    Ok(())
}

fn send_signal(pid: u32, signal: libc::c_int) -> Result<()> {
    let pid = libc::pid_t::try_from(pid).with_context(|| format!("Invalid pid {pid}"))?;
    // SAFETY: kill has no memory-safety preconditions
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to signal process {pid}"));
    }
    Ok(())
}

fn process_alive(pid: u32) -> bool {
    match libc::pid_t::try_from(pid) {
        // SAFETY: signal 0 only checks for existence and permission
        Ok(pid) => unsafe { libc::kill(pid, 0) == 0 },
        Err(_) => false,
    }
}

/// Initialize tracing/logging; `RUST_LOG` overrides the configured level
fn init_tracing(config: &DaemonConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // Records go to stdout, so logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.logging.format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        "compact" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}

/// Initialize Prometheus metrics
fn init_metrics(config: &DaemonConfig) -> Result<()> {
    let ip: std::net::IpAddr = config
        .metrics
        .bind_address
        .parse()
        .with_context(|| format!("Invalid metrics bind address: {}", config.metrics.bind_address))?;

    PrometheusBuilder::new()
        .with_http_listener((ip, config.metrics.port))
        .install()
        .with_context(|| "Failed to install Prometheus exporter")?;

    info!(
        "Metrics endpoint started on {}:{}",
        config.metrics.bind_address, config.metrics.port
    );
    Ok(())
}
