//! Handler interface through which decoded records leave the relay
//!
//! Every method has a no-op default, so an implementation only overrides the
//! kinds it persists. One handler is shared by all readers; methods are
//! called concurrently from reader threads.

use provrelay_core::{
    AddressEntry, Argument, DisclosedNode, FileName, IattrNode, InodeNode, LongRecord,
    MachineInfo, MessageNode, PacketContent, PacketNode, ProcessNode, ProvRecord, Relation,
    ShmNode, ShortRecord, StringEntry, TaskNode, XattrEntry,
};
use tracing::error;

#[allow(unused_variables)]
pub trait ProvenanceHandler: Send + Sync + 'static {
    /// Called once on each reader thread before it reads any record
    fn init(&self) {}

    /// Observes every correctly sized short record before filtering
    fn received_prov(&self, record: &ShortRecord<'_>) {}

    /// Observes every correctly sized long record before filtering
    fn received_long_prov(&self, record: &LongRecord<'_>) {}

    /// Returning `true` drops the record before dispatch
    fn filter(&self, record: &ProvRecord<'_>) -> bool {
        false
    }

    /// Observe-only mode: nothing past the observers runs
    fn is_query(&self) -> bool {
        false
    }

    fn log_error(&self, message: &str) {
        error!("{}", message);
    }

    // relations
    fn on_used(&self, relation: &Relation) {}
    fn on_informed(&self, relation: &Relation) {}
    fn on_generated(&self, relation: &Relation) {}
    fn on_derived(&self, relation: &Relation) {}
    fn on_influenced(&self, relation: &Relation) {}
    fn on_associated(&self, relation: &Relation) {}

    // short nodes
    fn on_process(&self, node: &ProcessNode) {}
    fn on_task(&self, node: &TaskNode) {}
    fn on_inode(&self, node: &InodeNode) {}
    fn on_message(&self, node: &MessageNode) {}
    fn on_shm(&self, node: &ShmNode) {}
    fn on_packet(&self, node: &PacketNode) {}
    fn on_iattr(&self, node: &IattrNode) {}

    // long records
    fn on_string(&self, entry: &StringEntry) {}
    fn on_file_name(&self, entry: &FileName) {}
    fn on_address(&self, entry: &AddressEntry) {}
    fn on_xattr(&self, entry: &XattrEntry) {}
    fn on_disclosed_entity(&self, node: &DisclosedNode) {}
    fn on_disclosed_activity(&self, node: &DisclosedNode) {}
    fn on_disclosed_agent(&self, node: &DisclosedNode) {}
    fn on_packet_content(&self, entry: &PacketContent) {}
    fn on_argument(&self, entry: &Argument) {}
    fn on_machine(&self, entry: &MachineInfo) {}
}

/// Handler that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ProvenanceHandler for NullHandler {}
