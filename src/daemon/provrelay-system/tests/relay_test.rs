use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use provrelay_core::builder::RecordBuilder;
use provrelay_core::tags::{ACT_TASK, ENT_PATH};
use provrelay_core::{FileName, TaskNode, SHORT_RECORD_SIZE};
use provrelay_system::{
    Dispatcher, NameCache, ProvenanceHandler, ReaderSettings, Relay, RelayConfig, RelayStats,
    SelfExclusion,
};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct Collector {
    inits: AtomicUsize,
    tasks: Mutex<Vec<u32>>,
    paths: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl ProvenanceHandler for Collector {
    fn init(&self) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn log_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn on_task(&self, node: &TaskNode) {
        self.tasks.lock().unwrap().push(node.pid);
    }

    fn on_file_name(&self, entry: &FileName) {
        self.paths.lock().unwrap().push(entry.name.clone());
    }
}

fn config(dir: &TempDir, cpus: usize) -> RelayConfig {
    RelayConfig {
        short_prefix: dir.path().join("provenance"),
        long_prefix: dir.path().join("long_provenance"),
        cpus: Some(cpus),
        pid_file: Some(dir.path().join("provenance-service.pid")),
        exclusion: SelfExclusion::Disabled,
        pin_readers: false,
        reader: ReaderSettings {
            idle_sleep: Duration::from_millis(1),
            poll_timeout: Duration::from_millis(20),
            records_per_drain: 1000,
        },
        ..Default::default()
    }
}

fn write_channel(dir: &TempDir, name: String, records: &[Vec<u8>]) {
    let mut file = File::create(dir.path().join(name)).unwrap();
    for record in records {
        file.write_all(record).unwrap();
    }
}

fn task(pid: u32) -> Vec<u8> {
    RecordBuilder::short(ACT_TASK).put_u32(64, pid).build()
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_per_cpu_order_is_preserved() {
    let dir = tempdir().unwrap();
    for cpu in 0..4u32 {
        let records: Vec<_> = (0..3).map(|seq| task(cpu * 100 + seq)).collect();
        write_channel(&dir, format!("provenance{cpu}"), &records);
        write_channel(&dir, format!("long_provenance{cpu}"), &[]);
    }

    let collector = Arc::new(Collector::default());
    let mut relay = Relay::register(config(&dir, 4), collector.clone()).unwrap();
    wait_for("12 tasks", || collector.tasks.lock().unwrap().len() == 12);
    relay.stop().unwrap();

    let tasks = collector.tasks.lock().unwrap().clone();
    assert_eq!(tasks.len(), 12);
    for cpu in 0..4u32 {
        let seen: Vec<_> = tasks.iter().copied().filter(|pid| pid / 100 == cpu).collect();
        assert_eq!(seen, [cpu * 100, cpu * 100 + 1, cpu * 100 + 2]);
    }
    // one init per reader thread, short and long
    assert_eq!(collector.inits.load(Ordering::SeqCst), 8);
    assert!(collector.errors.lock().unwrap().is_empty());
    assert_eq!(relay.stats().short_records, 12);
}

#[test]
fn test_truncated_record_is_dropped_alone() {
    let collector = Arc::new(Collector::default());
    let dispatcher = Dispatcher::new(
        collector.clone(),
        Arc::new(NameCache::new()),
        Arc::new(RelayStats::new()),
    );

    let truncated = task(2);
    dispatcher.dispatch_short(&task(1));
    dispatcher.dispatch_short(&truncated[..SHORT_RECORD_SIZE - 1]);
    dispatcher.dispatch_short(&task(3));

    assert_eq!(*collector.tasks.lock().unwrap(), [1, 3]);
    assert_eq!(
        *collector.errors.lock().unwrap(),
        ["Wrong size 255 expected: 256"]
    );
    assert_eq!(dispatcher.stats().snapshot().decode_errors, 1);
}

#[test]
fn test_same_path_from_every_cpu_keeps_one_name() {
    let dir = tempdir().unwrap();
    for cpu in 0..4 {
        write_channel(&dir, format!("provenance{cpu}"), &[]);
        let path = RecordBuilder::long(ENT_PATH)
            .id(42)
            .string(&format!("/cpu/{cpu}"))
            .build();
        write_channel(&dir, format!("long_provenance{cpu}"), &[path]);
    }

    let collector = Arc::new(Collector::default());
    let mut relay = Relay::register(config(&dir, 4), collector.clone()).unwrap();
    wait_for("4 paths", || collector.paths.lock().unwrap().len() == 4);

    let names = relay.names();
    relay.stop().unwrap();

    assert_eq!(names.len(), 1);
    let id = RecordBuilder::identifier(ENT_PATH, 42);
    let name = names.lookup(&id).unwrap();
    assert!(collector.paths.lock().unwrap().contains(&name));
}

#[test]
fn test_stop_closes_channels_and_drains_pool() {
    let dir = tempdir().unwrap();
    for cpu in 0..4 {
        write_channel(&dir, format!("provenance{cpu}"), &[task(cpu)]);
        write_channel(&dir, format!("long_provenance{cpu}"), &[]);
    }
    let pid_path = dir.path().join("provenance-service.pid");

    let collector = Arc::new(Collector::default());
    let mut relay = Relay::register(config(&dir, 4), collector.clone()).unwrap();
    assert_eq!(relay.open_channels(), 8);
    assert_eq!(relay.active_readers(), 8);
    assert_eq!(
        std::fs::read_to_string(&pid_path).unwrap(),
        std::process::id().to_string()
    );

    let started = Instant::now();
    relay.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(relay.open_channels(), 0);
    assert_eq!(relay.active_readers(), 0);
    assert!(!pid_path.exists());
}

#[test]
fn test_relays_are_independent() {
    let first_dir = tempdir().unwrap();
    let second_dir = tempdir().unwrap();
    for dir in [&first_dir, &second_dir] {
        write_channel(dir, "provenance0".to_string(), &[task(7)]);
        write_channel(dir, "long_provenance0".to_string(), &[]);
    }

    let first = Arc::new(Collector::default());
    let second = Arc::new(Collector::default());
    let mut a = Relay::register(config(&first_dir, 1), first.clone()).unwrap();
    let mut b = Relay::register(config(&second_dir, 1), second.clone()).unwrap();
    wait_for("both relays", || {
        first.tasks.lock().unwrap().len() == 1 && second.tasks.lock().unwrap().len() == 1
    });

    a.stop().unwrap();
    assert!(b.is_running());
    b.stop().unwrap();
}
