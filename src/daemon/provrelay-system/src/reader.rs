//! Per-channel reader loop
//!
//! Each reader owns one channel file. It sleeps briefly, polls for
//! readability, drains as many whole records as are available into its
//! buffer and hands them to the dispatcher in order.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;
use tracing::debug;

use crate::affinity::pin_current_thread;
use crate::dispatch::{Dispatcher, RecordShape};
use crate::error::RelayError;

/// Reader timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Sleep before every poll
    pub idle_sleep: Duration,
    /// Upper bound on a single poll, and so on stop latency
    pub poll_timeout: Duration,
    /// Drain buffer capacity in records
    pub records_per_drain: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(5),
            poll_timeout: Duration::from_secs(1),
            records_per_drain: 1000,
        }
    }
}

/// An open channel file; closing is tied to drop
#[derive(Debug)]
pub struct Channel {
    path: PathBuf,
    file: File,
    open: Arc<AtomicUsize>,
}

impl Channel {
    /// `<prefix><cpu>`, e.g. `/sys/kernel/debug/provenance3`
    pub fn path_for(prefix: &Path, cpu: usize) -> PathBuf {
        let mut path = prefix.as_os_str().to_owned();
        path.push(cpu.to_string());
        PathBuf::from(path)
    }

    /// Open read-only and non-blocking; `open` counts live channels
    pub fn open(path: PathBuf, open: &Arc<AtomicUsize>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;
        open.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            path,
            file,
            open: Arc::clone(open),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `timeout` for data. Returns whether the channel is ready.
    fn poll(&self, timeout: Duration) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN | libc::POLLRDNORM | libc::POLLERR,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: pollfd is a valid single-element array for the call
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc > 0)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        debug!("Closed channel {}", self.path.display());
    }
}

/// Read from `source` until the accumulated length is a whole number of
/// records. Returns the number of bytes holding complete records.
///
/// A would-block or empty read on a record boundary ends the drain; inside
/// a record it is retried until the rest arrives or `running` clears, in
/// which case the partial record is discarded.
pub(crate) fn drain<R: Read>(
    source: &mut R,
    buf: &mut [u8],
    record_size: usize,
    running: &AtomicBool,
    settings: &ReaderSettings,
) -> io::Result<usize> {
    let mut len = 0;
    loop {
        match source.read(&mut buf[len..]) {
            Ok(0) => {}
            Ok(n) => len += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
        if len % record_size == 0 {
            return Ok(len);
        }
        if !running.load(Ordering::Acquire) {
            return Ok(len - len % record_size);
        }
        thread::sleep(settings.idle_sleep);
    }
}

pub struct ChannelReader {
    cpu: usize,
    channel: Channel,
    shape: RecordShape,
    dispatcher: Arc<Dispatcher>,
    settings: ReaderSettings,
    running: Arc<AtomicBool>,
}

impl ChannelReader {
    pub fn new(
        cpu: usize,
        channel: Channel,
        shape: RecordShape,
        dispatcher: Arc<Dispatcher>,
        settings: ReaderSettings,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cpu,
            channel,
            shape,
            dispatcher,
            settings,
            running,
        }
    }

    /// Pin to the reader's cpu, run the handler's per-thread init, report
    /// startup on `ack`, then read until the running flag clears.
    ///
    /// The channel is closed when this returns.
    pub fn run(mut self, pin: bool, ack: Sender<Result<(), RelayError>>) {
        if pin {
            if let Err(source) = pin_current_thread(self.cpu) {
                self.dispatcher
                    .report(&format!("Failed setting cpu affinity ({source})."));
                let _ = ack.send(Err(RelayError::Affinity {
                    cpu: self.cpu,
                    source,
                }));
                return;
            }
        }

        self.dispatcher.handler().init();
        let _ = ack.send(Ok(()));
        drop(ack);

        debug!(
            "Reading {} records from {} on cpu {}",
            self.shape.name(),
            self.channel.path().display(),
            self.cpu
        );
        self.read_loop();
    }

    fn read_loop(&mut self) {
        let record_size = self.shape.size();
        let mut buf = vec![0u8; record_size * self.settings.records_per_drain];
        let stats = Arc::clone(self.dispatcher.stats());

        while self.running.load(Ordering::Acquire) {
            thread::sleep(self.settings.idle_sleep);

            if let Err(e) = self.channel.poll(self.settings.poll_timeout) {
                stats.record_io_error();
                self.dispatcher
                    .report(&format!("Failed while polling ({e})."));
                continue;
            }

            let len = match drain(
                &mut self.channel.file,
                &mut buf,
                record_size,
                &self.running,
                &self.settings,
            ) {
                Ok(len) => len,
                Err(e) => {
                    stats.record_io_error();
                    self.dispatcher
                        .report(&format!("Failed while reading ({e})."));
                    continue;
                }
            };

            if len > 0 {
                stats.record_drain();
                for record in buf[..len].chunks_exact(record_size) {
                    self.dispatcher.dispatch(self.shape, record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::Recorder;
    use crate::name_cache::NameCache;
    use crate::stats::RelayStats;
    use crossbeam::channel;
    use provrelay_core::builder::RecordBuilder;
    use provrelay_core::tags::ACT_TASK;
    use std::collections::VecDeque;
    use std::io::Write;
    use tempfile::tempdir;

    /// Source that replays a scripted sequence of read results
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn fast() -> ReaderSettings {
        ReaderSettings {
            idle_sleep: Duration::from_millis(1),
            poll_timeout: Duration::from_millis(10),
            records_per_drain: 4,
        }
    }

    fn would_block() -> io::Result<Vec<u8>> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    #[test]
    fn test_channel_path_appends_cpu() {
        assert_eq!(
            Channel::path_for(Path::new("/sys/kernel/debug/provenance"), 12),
            PathBuf::from("/sys/kernel/debug/provenance12")
        );
    }

    #[test]
    fn test_drain_accumulates_until_aligned() {
        let mut source = Script(VecDeque::from([
            Ok(vec![1u8; 10]),
            would_block(),
            Ok(vec![2u8; 6]),
            Ok(vec![3u8; 8]),
        ]));
        let mut buf = [0u8; 32];
        let running = AtomicBool::new(true);

        let len = drain(&mut source, &mut buf, 8, &running, &fast()).unwrap();
        assert_eq!(len, 16);
        assert_eq!(&buf[10..16], &[2u8; 6]);
        // the aligned drain stops before the next chunk
        assert_eq!(source.0.len(), 1);
    }

    #[test]
    fn test_drain_ends_on_would_block_at_boundary() {
        let mut source = Script(VecDeque::from([would_block()]));
        let mut buf = [0u8; 32];
        let running = AtomicBool::new(true);
        assert_eq!(drain(&mut source, &mut buf, 8, &running, &fast()).unwrap(), 0);
    }

    #[test]
    fn test_drain_discards_torn_record_on_stop() {
        let mut source = Script(VecDeque::from([Ok(vec![1u8; 12])]));
        let mut buf = [0u8; 32];
        let running = AtomicBool::new(false);
        assert_eq!(drain(&mut source, &mut buf, 8, &running, &fast()).unwrap(), 8);
    }

    #[test]
    fn test_drain_propagates_hard_errors() {
        let mut source = Script(VecDeque::from([
            Ok(vec![0u8; 4]),
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
        ]));
        let mut buf = [0u8; 32];
        let running = AtomicBool::new(true);
        let err = drain(&mut source, &mut buf, 8, &running, &fast()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_reader_dispatches_records_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provenance0");
        let mut file = File::create(&path).unwrap();
        for pid in 1..=6 {
            file.write_all(&RecordBuilder::short(ACT_TASK).put_u32(64, pid).build())
                .unwrap();
        }
        drop(file);

        let open = Arc::new(AtomicUsize::new(0));
        let source = Channel::open(path, &open).unwrap();
        assert_eq!(open.load(Ordering::SeqCst), 1);

        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(RelayStats::new());
        let dispatcher = Arc::new(Dispatcher::new(
            recorder.clone(),
            Arc::new(NameCache::new()),
            Arc::clone(&stats),
        ));
        let running = Arc::new(AtomicBool::new(true));
        let reader = ChannelReader::new(
            0,
            source,
            RecordShape::Short,
            dispatcher,
            fast(),
            Arc::clone(&running),
        );

        let (ack_tx, ack_rx) = channel::bounded(1);
        let handle = thread::spawn(move || reader.run(false, ack_tx));
        ack_rx.recv().unwrap().unwrap();

        while stats.snapshot().short_records < 6 {
            thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        let tasks: Vec<_> = recorder
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("task:"))
            .collect();
        assert_eq!(tasks, ["task:1", "task:2", "task:3", "task:4", "task:5", "task:6"]);
        // 6 records with room for 4 per drain
        assert_eq!(stats.snapshot().drains, 2);
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }
}
