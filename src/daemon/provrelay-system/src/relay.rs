//! Relay registration and shutdown
//!
//! A [`Relay`] owns everything a registration creates: the channel readers
//! running on the worker pool, the shared dispatcher and the PID file.
//! Dropping a half-built relay tears down whatever was started, so every
//! registration failure leaves nothing running.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::affinity::online_cpus;
use crate::dispatch::{Dispatcher, RecordShape};
use crate::error::{RelayError, Result};
use crate::exclusion::SelfExclusion;
use crate::handler::ProvenanceHandler;
use crate::name_cache::NameCache;
use crate::pidfile::{PidFile, DEFAULT_PID_FILE};
use crate::pool::WorkerPool;
use crate::reader::{Channel, ChannelReader, ReaderSettings};
use crate::stats::{RelayStats, StatsSnapshot};

/// Largest cpu count the relay will open channels for
pub const MAX_CPUS: usize = 256;
pub const DEFAULT_SHORT_PREFIX: &str = "/sys/kernel/debug/provenance";
pub const DEFAULT_LONG_PREFIX: &str = "/sys/kernel/debug/long_provenance";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Short channels are `<short_prefix><cpu>`
    pub short_prefix: PathBuf,
    /// Long channels are `<long_prefix><cpu>`
    pub long_prefix: PathBuf,
    /// Override the online cpu count
    pub cpus: Option<usize>,
    pub pid_file: Option<PathBuf>,
    pub exclusion: SelfExclusion,
    /// Pin each reader to the cpu of its channel
    pub pin_readers: bool,
    pub reader: ReaderSettings,
    /// How long registration waits for every reader to start
    pub startup_timeout: Duration,
    /// How long stop waits for every reader to exit
    pub stop_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            short_prefix: PathBuf::from(DEFAULT_SHORT_PREFIX),
            long_prefix: PathBuf::from(DEFAULT_LONG_PREFIX),
            cpus: None,
            pid_file: Some(PathBuf::from(DEFAULT_PID_FILE)),
            exclusion: SelfExclusion::default(),
            pin_readers: true,
            reader: ReaderSettings::default(),
            startup_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Relay {
    running: Arc<AtomicBool>,
    pool: WorkerPool,
    dispatcher: Arc<Dispatcher>,
    open_channels: Arc<AtomicUsize>,
    pid_file: Option<PidFile>,
    cpus: usize,
    stop_timeout: Duration,
    stopped: bool,
}

impl Relay {
    /// Register `handler` with a fresh name cache
    pub fn register(config: RelayConfig, handler: Arc<dyn ProvenanceHandler>) -> Result<Self> {
        Self::register_with_names(config, handler, Arc::new(NameCache::new()))
    }

    /// Register `handler`, recording path names into `names`
    pub fn register_with_names(
        config: RelayConfig,
        handler: Arc<dyn ProvenanceHandler>,
        names: Arc<NameCache>,
    ) -> Result<Self> {
        config.exclusion.mark_opaque().map_err(RelayError::Opaque)?;

        let cpus = config.cpus.unwrap_or_else(online_cpus);
        if cpus > MAX_CPUS {
            return Err(RelayError::TooManyCpus {
                found: cpus,
                max: MAX_CPUS,
            });
        }

        // Channels close on drop, so an early return releases every one
        // opened so far
        let open_channels = Arc::new(AtomicUsize::new(0));
        let mut channels = Vec::with_capacity(cpus * 2);
        for cpu in 0..cpus {
            for (shape, prefix) in [
                (RecordShape::Short, &config.short_prefix),
                (RecordShape::Long, &config.long_prefix),
            ] {
                let path = Channel::path_for(prefix, cpu);
                let channel = Channel::open(path.clone(), &open_channels)
                    .map_err(|source| RelayError::OpenChannel { path, source })?;
                channels.push((cpu, shape, channel));
            }
        }

        let pool = WorkerPool::new(cpus * 2, "provrelay-reader").map_err(RelayError::Pool)?;
        let stats = Arc::new(RelayStats::new());
        let mut relay = Relay {
            running: Arc::new(AtomicBool::new(true)),
            pool,
            dispatcher: Arc::new(Dispatcher::new(handler, names, stats)),
            open_channels,
            pid_file: None,
            cpus,
            stop_timeout: config.stop_timeout,
            stopped: false,
        };

        // From here on an early return drops `relay`, which stops any
        // reader already running
        let readers = channels.len();
        let (ack_tx, ack_rx) = channel::bounded(readers);
        for (cpu, shape, channel) in channels {
            let reader = ChannelReader::new(
                cpu,
                channel,
                shape,
                Arc::clone(&relay.dispatcher),
                config.reader,
                Arc::clone(&relay.running),
            );
            let ack = ack_tx.clone();
            let pin = config.pin_readers;
            relay
                .pool
                .submit(move || reader.run(pin, ack))
                .map_err(RelayError::Pool)?;
        }
        drop(ack_tx);

        for started in 0..readers {
            match ack_rx.recv_timeout(config.startup_timeout) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(RelayError::ReaderStartup(format!(
                        "{} of {} readers started before the timeout",
                        started, readers
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RelayError::ReaderStartup(format!(
                        "a reader exited during startup after {} of {} started",
                        started, readers
                    )))
                }
            }
        }

        if let Some(path) = &config.pid_file {
            let pid_file = PidFile::create(path).map_err(|source| RelayError::PidFile {
                path: path.clone(),
                source,
            })?;
            relay.pid_file = Some(pid_file);
        }

        info!(
            "Relay registered: {} cpus, {} channels, pinned: {}",
            cpus, readers, config.pin_readers
        );
        Ok(relay)
    }

    /// Signal every reader, wait for each to exit and close its channel,
    /// then release the pool and the PID file. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.running.store(false, Ordering::Release);

        let exited = self.pool.wait_timeout(self.stop_timeout);
        let lingering = self.pool.active_tasks();
        self.pool.destroy();
        self.pid_file.take();

        if !exited {
            return Err(RelayError::StopTimeout(lingering));
        }
        info!("Relay stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn cpus(&self) -> usize {
        self.cpus
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats().snapshot()
    }

    /// Live counters, usable after the relay is moved or stopped
    pub fn stats_handle(&self) -> Arc<RelayStats> {
        Arc::clone(self.dispatcher.stats())
    }

    /// Name cache shared with the dispatcher
    pub fn names(&self) -> Arc<NameCache> {
        Arc::clone(self.dispatcher.names())
    }

    /// Channels currently open
    pub fn open_channels(&self) -> usize {
        self.open_channels.load(Ordering::SeqCst)
    }

    /// Readers queued or running on the pool
    pub fn active_readers(&self) -> usize {
        self.pool.active_tasks()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        debug!("Relay dropped while running, stopping");
        if let Err(e) = self.stop() {
            warn!("Relay did not stop cleanly: {}", e);
        }
    }
}
