//! Borrowed views over raw short and long records
//!
//! A view is only constructed from a slice of exactly the shape's fixed size,
//! so every offset read below it is in bounds.

use bytes::Buf;
use serde::Serialize;

use crate::error::DecodeError;
use crate::identifier::{Identifier, IDENTIFIER_LEN};
use crate::long::LongPayload;
use crate::short::ShortPayload;
use crate::tags::{self, LongKind, NodeKind, RelationKind};

/// Fixed size of a short record (`prov_elt`)
pub const SHORT_RECORD_SIZE: usize = 256;
/// Fixed size of a long record (`long_prov_elt`)
pub const LONG_RECORD_SIZE: usize = 4352;
/// Common header shared by both shapes
pub const HEADER_LEN: usize = 64;
/// Capacity of path and string areas
pub const PATH_MAX: usize = 4096;

/// Byte offsets of every field the relay decodes
pub(crate) mod layout {
    use super::PATH_MAX;

    pub const FLAGS: usize = 32;
    pub const EPOCH: usize = 40;
    pub const BODY: usize = super::HEADER_LEN;

    // relations
    pub const REL_SENDER: usize = BODY;
    pub const REL_RECEIVER: usize = BODY + 32;
    pub const REL_ALLOWED: usize = BODY + 64;
    pub const REL_SET: usize = BODY + 65;
    pub const REL_OFFSET: usize = BODY + 72;
    pub const REL_FLAGS: usize = BODY + 80;
    pub const REL_TASK_ID: usize = BODY + 88;

    // interned strings, paths and arguments
    pub const STR_LEN: usize = BODY;
    pub const STR_AREA: usize = BODY + 2;
    pub const ARG_LEN: usize = BODY;
    pub const ARG_TRUNCATED: usize = BODY + 2;
    pub const ARG_AREA: usize = BODY + 4;

    pub const ADDR_LEN: usize = BODY;
    pub const ADDR_AREA: usize = BODY + 2;
    pub const ADDR_CAPACITY: usize = 128;

    pub const XATTR_NAME: usize = BODY;
    pub const XATTR_NAME_CAPACITY: usize = 256;
    pub const XATTR_SIZE: usize = BODY + 256;
    pub const XATTR_VALUE: usize = BODY + 260;
    pub const XATTR_VALUE_CAPACITY: usize = 2048;
    pub const XATTR_FLAGS: usize = XATTR_VALUE + XATTR_VALUE_CAPACITY;

    pub const DISC_PARENT: usize = BODY;
    pub const DISC_LEN: usize = BODY + 32;
    pub const DISC_AREA: usize = BODY + 34;

    pub const PCKCNT_LEN: usize = BODY;
    pub const PCKCNT_TRUNCATED: usize = BODY + 4;
    pub const PCKCNT_AREA: usize = BODY + 8;
    pub const PCKCNT_CAPACITY: usize = 2048;

    pub const UTS_FIELD: usize = 65;
    pub const MACHINE_SYSNAME: usize = BODY;
    pub const MACHINE_NODENAME: usize = BODY + UTS_FIELD;
    pub const MACHINE_RELEASE: usize = BODY + 2 * UTS_FIELD;
    pub const MACHINE_VERSION: usize = BODY + 3 * UTS_FIELD;
    pub const MACHINE_ARCH: usize = BODY + 4 * UTS_FIELD;
    pub const MACHINE_CAM_VERSION: usize = BODY + 5 * UTS_FIELD;
    pub const MACHINE_COMMIT: usize = MACHINE_CAM_VERSION + 3;
    pub const MACHINE_COMMIT_CAPACITY: usize = 40;

    const _: () = assert!(STR_AREA + PATH_MAX <= super::LONG_RECORD_SIZE);
    const _: () = assert!(DISC_AREA + PATH_MAX <= super::LONG_RECORD_SIZE);
    const _: () = assert!(ARG_AREA + PATH_MAX <= super::LONG_RECORD_SIZE);
    const _: () = assert!(XATTR_FLAGS < super::LONG_RECORD_SIZE);
    const _: () = assert!(REL_TASK_ID + 8 <= super::SHORT_RECORD_SIZE);
}

/// Read-only cursor positioned at `offset`
pub(crate) fn at(bytes: &[u8], offset: usize) -> &[u8] {
    &bytes[offset..]
}

pub(crate) fn identifier_at(bytes: &[u8], offset: usize) -> Identifier {
    Identifier::read(&bytes[offset..offset + IDENTIFIER_LEN])
}

/// Length-prefixed string stored in a fixed-capacity area
pub(crate) fn sized_str(
    bytes: &[u8],
    area: usize,
    len: usize,
    capacity: usize,
    field: &'static str,
) -> Result<String, DecodeError> {
    if len > capacity {
        return Err(DecodeError::too_long(field, len, capacity));
    }
    Ok(String::from_utf8_lossy(&bytes[area..area + len]).into_owned())
}

/// NUL-terminated string stored in a fixed-capacity area
pub(crate) fn nul_str(bytes: &[u8], area: usize, capacity: usize) -> String {
    let raw = &bytes[area..area + capacity];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(capacity);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Common record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub identifier: Identifier,
    pub flags: u32,
    pub epoch: u64,
}

impl Header {
    pub(crate) fn read(bytes: &[u8]) -> Self {
        Header {
            identifier: identifier_at(bytes, 0),
            flags: at(bytes, layout::FLAGS).get_u32_le(),
            epoch: at(bytes, layout::EPOCH).get_u64_le(),
        }
    }
}

fn check_size(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() != expected {
        return Err(DecodeError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Classification of a short record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortKind {
    Relation(RelationKind),
    Node(NodeKind),
}

impl ShortKind {
    pub fn name(self) -> &'static str {
        match self {
            ShortKind::Relation(kind) => kind.name(),
            ShortKind::Node(kind) => kind.name(),
        }
    }
}

/// A validated short record
#[derive(Clone, Copy)]
pub struct ShortRecord<'a> {
    bytes: &'a [u8],
}

impl<'a> ShortRecord<'a> {
    pub const SIZE: usize = SHORT_RECORD_SIZE;

    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        check_size(bytes, Self::SIZE)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn header(&self) -> Header {
        Header::read(self.bytes)
    }

    pub fn identifier(&self) -> Identifier {
        identifier_at(self.bytes, 0)
    }

    pub fn tag(&self) -> u64 {
        at(self.bytes, 0).get_u64_le()
    }

    pub fn is_relation(&self) -> bool {
        tags::is_relation(self.tag())
    }

    pub fn classify(&self) -> Result<ShortKind, DecodeError> {
        let tag = self.tag();
        if tags::is_relation(tag) {
            RelationKind::from_tag(tag)
                .map(ShortKind::Relation)
                .ok_or(DecodeError::UnknownRelation(tag))
        } else {
            NodeKind::from_tag(tag)
                .map(ShortKind::Node)
                .ok_or(DecodeError::UnknownNode(tag))
        }
    }

    pub fn decode(&self) -> Result<ShortPayload, DecodeError> {
        let kind = self.classify()?;
        Ok(ShortPayload::decode(kind, self.bytes))
    }
}

impl std::fmt::Debug for ShortRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortRecord")
            .field("identifier", &self.identifier())
            .finish()
    }
}

/// A validated long record
#[derive(Clone, Copy)]
pub struct LongRecord<'a> {
    bytes: &'a [u8],
}

impl<'a> LongRecord<'a> {
    pub const SIZE: usize = LONG_RECORD_SIZE;

    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        check_size(bytes, Self::SIZE)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn header(&self) -> Header {
        Header::read(self.bytes)
    }

    pub fn identifier(&self) -> Identifier {
        identifier_at(self.bytes, 0)
    }

    pub fn tag(&self) -> u64 {
        at(self.bytes, 0).get_u64_le()
    }

    pub fn classify(&self) -> Result<LongKind, DecodeError> {
        let tag = self.tag();
        LongKind::from_tag(tag).ok_or(DecodeError::UnknownLong(tag))
    }

    pub fn decode(&self) -> Result<LongPayload, DecodeError> {
        let kind = self.classify()?;
        LongPayload::decode(kind, self.bytes)
    }
}

impl std::fmt::Debug for LongRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongRecord")
            .field("identifier", &self.identifier())
            .finish()
    }
}

/// Either record shape, as seen by a filter
#[derive(Debug, Clone, Copy)]
pub enum ProvRecord<'a> {
    Short(ShortRecord<'a>),
    Long(LongRecord<'a>),
}

impl<'a> ProvRecord<'a> {
    pub fn identifier(&self) -> Identifier {
        match self {
            ProvRecord::Short(record) => record.identifier(),
            ProvRecord::Long(record) => record.identifier(),
        }
    }

    pub fn tag(&self) -> u64 {
        match self {
            ProvRecord::Short(record) => record.tag(),
            ProvRecord::Long(record) => record.tag(),
        }
    }

    /// Handler-level kind name, `None` for unknown tags
    pub fn kind_name(&self) -> Option<&'static str> {
        match self {
            ProvRecord::Short(record) => record.classify().ok().map(ShortKind::name),
            ProvRecord::Long(record) => record.classify().ok().map(LongKind::name),
        }
    }
}
