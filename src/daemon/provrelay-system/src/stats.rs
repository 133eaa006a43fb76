use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Relay counters, updated lock-free from every reader
#[derive(Debug, Default)]
pub struct RelayStats {
    short_records: AtomicU64,
    long_records: AtomicU64,
    filtered: AtomicU64,
    decode_errors: AtomicU64,
    io_errors: AtomicU64,
    drains: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub short_records: u64,
    pub long_records: u64,
    pub filtered: u64,
    pub decode_errors: u64,
    pub io_errors: u64,
    pub drains: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_short(&self) {
        self.short_records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_long(&self) {
        self.long_records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            short_records: self.short_records.load(Ordering::Relaxed),
            long_records: self.long_records.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
        }
    }
}
