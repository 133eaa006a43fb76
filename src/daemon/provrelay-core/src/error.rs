use thiserror::Error;

/// Errors raised while framing or decoding a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Wrong size {actual} expected: {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("unknown relation type {0:#x}")]
    UnknownRelation(u64),
    #[error("unknown node type {0:#x}")]
    UnknownNode(u64),
    #[error("unknown node long type {0:#x}")]
    UnknownLong(u64),
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn too_long(field: &'static str, len: usize, capacity: usize) -> Self {
        DecodeError::Malformed {
            field,
            reason: format!("length {len} exceeds capacity {capacity}"),
        }
    }
}
