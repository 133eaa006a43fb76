//! JSON lines output handler
//!
//! Writes one JSON object per dispatched record: `{"kind": .., "record": ..}`.
//! Relations carry `sender_name` / `receiver_name` when an endpoint's path
//! is already in the name cache.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, LineWriter, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use provrelay_core::{
    AddressEntry, Argument, DisclosedKind, DisclosedNode, FileName, IattrNode, InodeNode,
    LongRecord, MachineInfo, MessageNode, PacketContent, PacketNode, ProcessNode, ProvRecord,
    Relation, ShmNode, ShortRecord, StringEntry, TaskNode, XattrEntry,
};
use provrelay_system::{NameCache, ProvenanceHandler};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::OutputConfig;
use crate::metrics::MetricsCollector;

/// Record kind names accepted by the suppress list
pub const KNOWN_KINDS: &[&str] = &[
    "used",
    "informed",
    "generated",
    "derived",
    "influenced",
    "associated",
    "process",
    "task",
    "inode",
    "message",
    "shm",
    "packet",
    "iattr",
    "string",
    "path",
    "address",
    "xattr",
    "entity_disc",
    "activity_disc",
    "agent_disc",
    "packet_content",
    "argument",
    "machine",
];

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver_name: Option<String>,
    record: &'a T,
}

pub struct JsonLinesHandler {
    out: Mutex<LineWriter<Box<dyn Write + Send>>>,
    query_mode: bool,
    suppress: HashSet<String>,
    names: Option<Arc<NameCache>>,
    metrics: Arc<MetricsCollector>,
}

impl JsonLinesHandler {
    /// Handler writing to `out`. `names` is consulted only when
    /// `config.resolve_names` is set.
    pub fn new(
        out: Box<dyn Write + Send>,
        config: &OutputConfig,
        names: Arc<NameCache>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            out: Mutex::new(LineWriter::new(out)),
            query_mode: config.query_mode,
            suppress: config.suppress.iter().cloned().collect(),
            names: config.resolve_names.then_some(names),
            metrics,
        }
    }

    /// Handler writing to the configured file (appending), or stdout
    pub fn open(
        config: &OutputConfig,
        names: Arc<NameCache>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let out: Box<dyn Write + Send> = match &config.file {
            Some(path) => Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open output file: {}", path.display()))?,
            ),
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(out, config, names, metrics))
    }

    fn resolve(&self, relation: &Relation) -> (Option<String>, Option<String>) {
        match &self.names {
            Some(names) => (
                names.lookup(&relation.sender),
                names.lookup(&relation.receiver),
            ),
            None => (None, None),
        }
    }

    fn emit<T: Serialize>(&self, kind: &'static str, record: &T) {
        self.write_line(&Line {
            kind,
            sender_name: None,
            receiver_name: None,
            record,
        });
    }

    fn emit_relation(&self, relation: &Relation) {
        let (sender_name, receiver_name) = self.resolve(relation);
        self.write_line(&Line {
            kind: relation.kind.name(),
            sender_name,
            receiver_name,
            record: relation,
        });
    }

    fn write_line<T: Serialize>(&self, line: &Line<'_, T>) {
        let result = match self.out.lock() {
            Ok(mut out) => serde_json::to_writer(&mut *out, line)
                .map_err(io::Error::from)
                .and_then(|()| out.write_all(b"\n")),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "output lock poisoned")),
        };
        match result {
            Ok(()) => self.metrics.record_record(line.kind),
            Err(e) => {
                self.metrics.record_error();
                warn!("Failed to write {} record: {}", line.kind, e);
            }
        }
    }

    /// Flush buffered output
    pub fn flush(&self) -> io::Result<()> {
        match self.out.lock() {
            Ok(mut out) => out.flush(),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "output lock poisoned")),
        }
    }
}

impl ProvenanceHandler for JsonLinesHandler {
    fn init(&self) {
        debug!("Reader thread {:?} ready", std::thread::current().name());
    }

    fn received_prov(&self, _record: &ShortRecord<'_>) {
        self.metrics.record_observed();
    }

    fn received_long_prov(&self, _record: &LongRecord<'_>) {
        self.metrics.record_observed();
    }

    fn filter(&self, record: &ProvRecord<'_>) -> bool {
        match record.kind_name() {
            Some(kind) if self.suppress.contains(kind) => {
                self.metrics.record_suppressed(kind);
                true
            }
            _ => false,
        }
    }

    fn is_query(&self) -> bool {
        self.query_mode
    }

    fn log_error(&self, message: &str) {
        self.metrics.record_error();
        error!("{}", message);
    }

    fn on_used(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_informed(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_generated(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_derived(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_influenced(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_associated(&self, relation: &Relation) {
        self.emit_relation(relation);
    }

    fn on_process(&self, node: &ProcessNode) {
        self.emit("process", node);
    }

    fn on_task(&self, node: &TaskNode) {
        self.emit("task", node);
    }

    fn on_inode(&self, node: &InodeNode) {
        self.emit("inode", node);
    }

    fn on_message(&self, node: &MessageNode) {
        self.emit("message", node);
    }

    fn on_shm(&self, node: &ShmNode) {
        self.emit("shm", node);
    }

    fn on_packet(&self, node: &PacketNode) {
        self.emit("packet", node);
    }

    fn on_iattr(&self, node: &IattrNode) {
        self.emit("iattr", node);
    }

    fn on_string(&self, entry: &StringEntry) {
        self.emit("string", entry);
    }

    fn on_file_name(&self, entry: &FileName) {
        self.emit("path", entry);
    }

    fn on_address(&self, entry: &AddressEntry) {
        self.emit("address", entry);
    }

    fn on_xattr(&self, entry: &XattrEntry) {
        self.emit("xattr", entry);
    }

    fn on_disclosed_entity(&self, node: &DisclosedNode) {
        self.emit(disclosed_kind(node.kind), node);
    }

    fn on_disclosed_activity(&self, node: &DisclosedNode) {
        self.emit(disclosed_kind(node.kind), node);
    }

    fn on_disclosed_agent(&self, node: &DisclosedNode) {
        self.emit(disclosed_kind(node.kind), node);
    }

    fn on_packet_content(&self, entry: &PacketContent) {
        self.emit("packet_content", entry);
    }

    fn on_argument(&self, entry: &Argument) {
        self.emit("argument", entry);
    }

    fn on_machine(&self, entry: &MachineInfo) {
        self.emit("machine", entry);
    }
}

fn disclosed_kind(kind: DisclosedKind) -> &'static str {
    match kind {
        DisclosedKind::Entity => "entity_disc",
        DisclosedKind::Activity => "activity_disc",
        DisclosedKind::Agent => "agent_disc",
    }
}
