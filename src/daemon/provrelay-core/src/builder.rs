//! Raw record construction for tests and simulated channels

use bytes::BufMut;

use crate::identifier::{Identifier, IDENTIFIER_LEN};
use crate::record::{layout, LONG_RECORD_SIZE, SHORT_RECORD_SIZE};

/// Builds the raw bytes of a short or long record
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    bytes: Vec<u8>,
}

impl RecordBuilder {
    pub fn short(tag: u64) -> Self {
        Self::with_size(SHORT_RECORD_SIZE, tag)
    }

    pub fn long(tag: u64) -> Self {
        Self::with_size(LONG_RECORD_SIZE, tag)
    }

    fn with_size(size: usize, tag: u64) -> Self {
        let mut bytes = vec![0u8; size];
        (&mut bytes[..8]).put_u64_le(tag);
        Self { bytes }
    }

    /// Identifier with the given tag and node id, all other fields zero
    pub fn identifier(tag: u64, id: u64) -> Identifier {
        let mut raw = [0u8; IDENTIFIER_LEN];
        let mut cursor = &mut raw[..];
        cursor.put_u64_le(tag);
        cursor.put_u64_le(id);
        Identifier::from_bytes(raw)
    }

    pub fn id(self, id: u64) -> Self {
        self.put_u64(8, id)
    }

    pub fn epoch(self, epoch: u64) -> Self {
        self.put_u64(layout::EPOCH, epoch)
    }

    pub fn put_u16(mut self, offset: usize, value: u16) -> Self {
        (&mut self.bytes[offset..]).put_u16_le(value);
        self
    }

    pub fn put_u32(mut self, offset: usize, value: u32) -> Self {
        (&mut self.bytes[offset..]).put_u32_le(value);
        self
    }

    pub fn put_u64(mut self, offset: usize, value: u64) -> Self {
        (&mut self.bytes[offset..]).put_u64_le(value);
        self
    }

    pub fn put_bytes(mut self, offset: usize, value: &[u8]) -> Self {
        (&mut self.bytes[offset..]).put_slice(value);
        self
    }

    /// Allowed relation between two nodes
    pub fn relation(self, sender: Identifier, receiver: Identifier) -> Self {
        self.put_bytes(layout::REL_SENDER, sender.as_bytes())
            .put_bytes(layout::REL_RECEIVER, receiver.as_bytes())
            .put_bytes(layout::REL_ALLOWED, &[1])
    }

    /// Length-prefixed string body (paths and interned strings)
    pub fn string(self, value: &str) -> Self {
        self.put_u16(layout::STR_LEN, value.len() as u16)
            .put_bytes(layout::STR_AREA, value.as_bytes())
    }

    /// Argument or environment body
    pub fn argument(self, value: &str, truncated: bool) -> Self {
        self.put_u16(layout::ARG_LEN, value.len() as u16)
            .put_bytes(layout::ARG_TRUNCATED, &[truncated as u8])
            .put_bytes(layout::ARG_AREA, value.as_bytes())
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
