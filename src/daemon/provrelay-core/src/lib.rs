//! Provrelay Core - provenance record wire format
//!
//! This crate frames and decodes the fixed-size records a provenance-tracking
//! kernel module writes to its relay channels. It does no I/O; the system
//! crate owns channels, workers and dispatch.

#[cfg(any(test, feature = "test-util"))]
pub mod builder;
pub mod error;
pub mod identifier;
pub mod long;
pub mod record;
pub mod short;
pub mod tags;

pub use error::DecodeError;
pub use identifier::{Identifier, IDENTIFIER_LEN};
pub use long::{
    AddressEntry, Argument, DisclosedKind, DisclosedNode, FileName, LongPayload, MachineInfo,
    PacketContent, StringEntry, XattrEntry,
};
pub use record::{
    Header, LongRecord, ProvRecord, ShortKind, ShortRecord, HEADER_LEN, LONG_RECORD_SIZE,
    PATH_MAX, SHORT_RECORD_SIZE,
};
pub use short::{
    IattrNode, InodeNode, MessageNode, PacketNode, ProcessNode, Relation, ShmNode, ShortPayload,
    TaskNode,
};
pub use tags::{InodeKind, LongKind, NodeKind, RelationKind};

/// Convenience functions for common operations
pub mod prelude {
    use super::*;

    /// Frame and decode one short record
    pub fn decode_short(bytes: &[u8]) -> Result<ShortPayload, DecodeError> {
        ShortRecord::parse(bytes)?.decode()
    }

    /// Frame and decode one long record
    pub fn decode_long(bytes: &[u8]) -> Result<LongPayload, DecodeError> {
        LongRecord::parse(bytes)?.decode()
    }
}
