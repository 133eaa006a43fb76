//! Record classification and routing
//!
//! Both shapes go through the same pipeline: size check, observer, query
//! mode, filter, then decode and route by tag. Path records are added to the
//! name cache before their handler runs.

use std::sync::Arc;

use provrelay_core::{
    DecodeError, DisclosedKind, LongPayload, LongRecord, ProvRecord, RelationKind, ShortPayload,
    ShortRecord, LONG_RECORD_SIZE, SHORT_RECORD_SIZE,
};

use crate::handler::ProvenanceHandler;
use crate::name_cache::NameCache;
use crate::stats::RelayStats;

/// Which of the two record shapes a channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    Short,
    Long,
}

impl RecordShape {
    pub fn size(self) -> usize {
        match self {
            RecordShape::Short => SHORT_RECORD_SIZE,
            RecordShape::Long => LONG_RECORD_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordShape::Short => "short",
            RecordShape::Long => "long",
        }
    }
}

pub struct Dispatcher {
    handler: Arc<dyn ProvenanceHandler>,
    names: Arc<NameCache>,
    stats: Arc<RelayStats>,
}

impl Dispatcher {
    pub fn new(
        handler: Arc<dyn ProvenanceHandler>,
        names: Arc<NameCache>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            handler,
            names,
            stats,
        }
    }

    pub fn handler(&self) -> &dyn ProvenanceHandler {
        self.handler.as_ref()
    }

    pub fn names(&self) -> &Arc<NameCache> {
        &self.names
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Forward a runtime fault to the handler
    pub fn report(&self, message: &str) {
        self.handler.log_error(message);
    }

    pub fn dispatch(&self, shape: RecordShape, bytes: &[u8]) {
        match shape {
            RecordShape::Short => self.dispatch_short(bytes),
            RecordShape::Long => self.dispatch_long(bytes),
        }
    }

    pub fn dispatch_short(&self, bytes: &[u8]) {
        let record = match ShortRecord::parse(bytes) {
            Ok(record) => record,
            Err(e) => return self.decode_failed(e),
        };
        self.stats.record_short();

        self.handler.received_prov(&record);
        if self.handler.is_query() {
            return;
        }
        if self.handler.filter(&ProvRecord::Short(record)) {
            self.stats.record_filtered();
            return;
        }

        match record.decode() {
            Ok(payload) => self.route_short(&payload),
            Err(e) => self.decode_failed(e),
        }
    }

    pub fn dispatch_long(&self, bytes: &[u8]) {
        let record = match LongRecord::parse(bytes) {
            Ok(record) => record,
            Err(e) => return self.decode_failed(e),
        };
        self.stats.record_long();

        self.handler.received_long_prov(&record);
        if self.handler.is_query() {
            return;
        }
        if self.handler.filter(&ProvRecord::Long(record)) {
            self.stats.record_filtered();
            return;
        }

        match record.decode() {
            Ok(payload) => self.route_long(&payload),
            Err(e) => self.decode_failed(e),
        }
    }

    fn decode_failed(&self, error: DecodeError) {
        self.stats.record_decode_error();
        self.handler.log_error(&error.to_string());
    }

    fn route_short(&self, payload: &ShortPayload) {
        let h = self.handler.as_ref();
        match payload {
            ShortPayload::Relation(relation) => match relation.kind {
                RelationKind::Used => h.on_used(relation),
                RelationKind::Informed => h.on_informed(relation),
                RelationKind::Generated => h.on_generated(relation),
                RelationKind::Derived => h.on_derived(relation),
                RelationKind::Influenced => h.on_influenced(relation),
                RelationKind::Associated => h.on_associated(relation),
            },
            ShortPayload::Process(node) => h.on_process(node),
            ShortPayload::Task(node) => h.on_task(node),
            ShortPayload::Inode(node) => h.on_inode(node),
            ShortPayload::Message(node) => h.on_message(node),
            ShortPayload::Shm(node) => h.on_shm(node),
            ShortPayload::Packet(node) => h.on_packet(node),
            ShortPayload::Iattr(node) => h.on_iattr(node),
        }
    }

    fn route_long(&self, payload: &LongPayload) {
        let h = self.handler.as_ref();
        match payload {
            LongPayload::String(entry) => h.on_string(entry),
            LongPayload::Path(entry) => {
                self.names.insert(entry.identifier(), entry.name.as_str());
                h.on_file_name(entry);
            }
            LongPayload::Address(entry) => h.on_address(entry),
            LongPayload::Xattr(entry) => h.on_xattr(entry),
            LongPayload::Disclosed(node) => match node.kind {
                DisclosedKind::Entity => h.on_disclosed_entity(node),
                DisclosedKind::Activity => h.on_disclosed_activity(node),
                DisclosedKind::Agent => h.on_disclosed_agent(node),
            },
            LongPayload::PacketContent(entry) => h.on_packet_content(entry),
            LongPayload::Argument(entry) => h.on_argument(entry),
            LongPayload::Machine(entry) => h.on_machine(entry),
        }
    }
}
