//! Provrelay System Integration
//!
//! Opens the per-cpu relay channels a provenance-tracking kernel module
//! exposes, drains them on a pool of pinned reader threads and dispatches
//! every record to a [`ProvenanceHandler`].

pub mod affinity;
pub mod dispatch;
pub mod error;
pub mod exclusion;
pub mod handler;
pub mod name_cache;
pub mod pidfile;
pub mod pool;
pub mod reader;
pub mod relay;
pub mod stats;

pub use dispatch::{Dispatcher, RecordShape};
pub use error::RelayError;
pub use exclusion::SelfExclusion;
pub use handler::{NullHandler, ProvenanceHandler};
pub use name_cache::NameCache;
pub use pool::WorkerPool;
pub use reader::ReaderSettings;
pub use relay::{Relay, RelayConfig, MAX_CPUS};
pub use stats::{RelayStats, StatsSnapshot};
