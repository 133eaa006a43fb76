//! Provenance entity identifiers
//!
//! An identifier is an opaque 32-byte key produced by the kernel. The relay
//! only hashes and compares it, but the leading fields are decoded for
//! display and for tag extraction.

use std::fmt;

use serde::{Serialize, Serializer};

/// Size of an identifier on the wire
pub const IDENTIFIER_LEN: usize = 32;

/// Opaque key naming a provenance entity (process, inode, packet, ...)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

impl Identifier {
    pub const fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy an identifier out of a record slice.
    ///
    /// Callers index into fixed-size records, so a short slice is a layout bug.
    pub(crate) fn read(bytes: &[u8]) -> Self {
        let mut raw = [0u8; IDENTIFIER_LEN];
        raw.copy_from_slice(&bytes[..IDENTIFIER_LEN]);
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Record type tag carried in the first word
    pub fn tag(&self) -> u64 {
        self.u64_at(0)
    }

    pub fn id(&self) -> u64 {
        self.u64_at(8)
    }

    pub fn boot_id(&self) -> u32 {
        self.u32_at(16)
    }

    pub fn machine_id(&self) -> u32 {
        self.u32_at(20)
    }

    pub fn version(&self) -> u32 {
        self.u32_at(24)
    }

    fn u64_at(&self, offset: usize) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[offset..offset + 8]);
        u64::from_le_bytes(word)
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.0[offset..offset + 4]);
        u32::from_le_bytes(word)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}:{}:{}:{}:{}",
            self.tag(),
            self.id(),
            self.boot_id(),
            self.machine_id(),
            self.version()
        )
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Identifier {
        let mut raw = [0u8; IDENTIFIER_LEN];
        raw[0..8].copy_from_slice(&0x2000_0000_0000_0004u64.to_le_bytes());
        raw[8..16].copy_from_slice(&42u64.to_le_bytes());
        raw[16..20].copy_from_slice(&7u32.to_le_bytes());
        raw[20..24].copy_from_slice(&9u32.to_le_bytes());
        raw[24..28].copy_from_slice(&3u32.to_le_bytes());
        Identifier::from_bytes(raw)
    }

    #[test]
    fn test_field_accessors() {
        let id = sample();
        assert_eq!(id.tag(), 0x2000_0000_0000_0004);
        assert_eq!(id.id(), 42);
        assert_eq!(id.boot_id(), 7);
        assert_eq!(id.machine_id(), 9);
        assert_eq!(id.version(), 3);
    }

    #[test]
    fn test_display_is_stable() {
        assert_eq!(sample().to_string(), "2000000000000004:42:7:9:3");
    }
}
