//! Record type tags
//!
//! The top four bits of a tag name its domain (relation, activity, entity,
//! agent). Relations additionally carry exactly one category bit; nodes and
//! long records are identified by their full tag value.

use serde::Serialize;

pub const DM_RELATION: u64 = 1 << 63;
pub const DM_ACTIVITY: u64 = 1 << 62;
pub const DM_ENTITY: u64 = 1 << 61;
pub const DM_AGENT: u64 = 1 << 60;

pub const RL_DERIVED: u64 = 1 << 59;
pub const RL_GENERATED: u64 = 1 << 58;
pub const RL_USED: u64 = 1 << 57;
pub const RL_INFORMED: u64 = 1 << 56;
pub const RL_INFLUENCED: u64 = 1 << 55;
pub const RL_ASSOCIATED: u64 = 1 << 54;

const RELATION_CATEGORIES: u64 =
    RL_DERIVED | RL_GENERATED | RL_USED | RL_INFORMED | RL_INFLUENCED | RL_ASSOCIATED;

// Concrete relations emitted by the kernel
pub const RL_READ: u64 = DM_RELATION | RL_USED | 0x01;
pub const RL_EXEC: u64 = DM_RELATION | RL_USED | 0x02;
pub const RL_RCV: u64 = DM_RELATION | RL_USED | 0x03;
pub const RL_WRITE: u64 = DM_RELATION | RL_GENERATED | 0x01;
pub const RL_SND: u64 = DM_RELATION | RL_GENERATED | 0x02;
pub const RL_CLONE: u64 = DM_RELATION | RL_INFORMED | 0x01;
pub const RL_VERSION: u64 = DM_RELATION | RL_DERIVED | 0x01;
pub const RL_NAMED: u64 = DM_RELATION | RL_DERIVED | 0x02;
pub const RL_TERMINATE_TASK: u64 = DM_RELATION | RL_INFLUENCED | 0x01;
pub const RL_RAN_ON: u64 = DM_RELATION | RL_ASSOCIATED | 0x01;

// Short record nodes
pub const ACT_TASK: u64 = DM_ACTIVITY | 0x01;
pub const ENT_PROC: u64 = DM_ENTITY | 0x01;
pub const ENT_INODE_UNKNOWN: u64 = DM_ENTITY | 0x02;
pub const ENT_INODE_LINK: u64 = DM_ENTITY | 0x03;
pub const ENT_INODE_FILE: u64 = DM_ENTITY | 0x04;
pub const ENT_INODE_DIRECTORY: u64 = DM_ENTITY | 0x05;
pub const ENT_INODE_CHAR: u64 = DM_ENTITY | 0x06;
pub const ENT_INODE_BLOCK: u64 = DM_ENTITY | 0x07;
pub const ENT_INODE_PIPE: u64 = DM_ENTITY | 0x08;
pub const ENT_INODE_SOCKET: u64 = DM_ENTITY | 0x09;
pub const ENT_MSG: u64 = DM_ENTITY | 0x0a;
pub const ENT_SHM: u64 = DM_ENTITY | 0x0b;
pub const ENT_PACKET: u64 = DM_ENTITY | 0x0c;
pub const ENT_IATTR: u64 = DM_ENTITY | 0x0d;

// Long record nodes
pub const ENT_STR: u64 = DM_ENTITY | 0x0e;
pub const ENT_PATH: u64 = DM_ENTITY | 0x0f;
pub const ENT_ADDR: u64 = DM_ENTITY | 0x10;
pub const ENT_XATTR: u64 = DM_ENTITY | 0x11;
pub const ENT_DISC: u64 = DM_ENTITY | 0x12;
pub const ENT_PCKCNT: u64 = DM_ENTITY | 0x13;
pub const ENT_ARG: u64 = DM_ENTITY | 0x14;
pub const ENT_ENV: u64 = DM_ENTITY | 0x15;
pub const ACT_DISC: u64 = DM_ACTIVITY | 0x02;
pub const AGT_MACHINE: u64 = DM_AGENT | 0x01;
pub const AGT_DISC: u64 = DM_AGENT | 0x02;

pub fn is_relation(tag: u64) -> bool {
    tag & DM_RELATION != 0
}

/// The six relation families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Used,
    Informed,
    Generated,
    Derived,
    Influenced,
    Associated,
}

impl RelationKind {
    pub const ALL: [RelationKind; 6] = [
        RelationKind::Used,
        RelationKind::Informed,
        RelationKind::Generated,
        RelationKind::Derived,
        RelationKind::Influenced,
        RelationKind::Associated,
    ];

    /// Classify a relation tag. Exactly one category bit must be set.
    pub fn from_tag(tag: u64) -> Option<Self> {
        if !is_relation(tag) {
            return None;
        }
        let categories = tag & RELATION_CATEGORIES;
        if categories.count_ones() != 1 {
            return None;
        }
        Self::ALL.into_iter().find(|kind| categories == kind.category_bit())
    }

    pub fn category_bit(self) -> u64 {
        match self {
            RelationKind::Used => RL_USED,
            RelationKind::Informed => RL_INFORMED,
            RelationKind::Generated => RL_GENERATED,
            RelationKind::Derived => RL_DERIVED,
            RelationKind::Influenced => RL_INFLUENCED,
            RelationKind::Associated => RL_ASSOCIATED,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RelationKind::Used => "used",
            RelationKind::Informed => "informed",
            RelationKind::Generated => "generated",
            RelationKind::Derived => "derived",
            RelationKind::Influenced => "influenced",
            RelationKind::Associated => "associated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InodeKind {
    Unknown,
    Link,
    File,
    Directory,
    Char,
    Block,
    Pipe,
    Socket,
}

/// Node kinds carried by short records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Process,
    Task,
    Inode(InodeKind),
    Message,
    SharedMemory,
    Packet,
    InodeAttributes,
}

impl NodeKind {
    pub fn from_tag(tag: u64) -> Option<Self> {
        let kind = match tag {
            ENT_PROC => NodeKind::Process,
            ACT_TASK => NodeKind::Task,
            ENT_INODE_UNKNOWN => NodeKind::Inode(InodeKind::Unknown),
            ENT_INODE_LINK => NodeKind::Inode(InodeKind::Link),
            ENT_INODE_FILE => NodeKind::Inode(InodeKind::File),
            ENT_INODE_DIRECTORY => NodeKind::Inode(InodeKind::Directory),
            ENT_INODE_CHAR => NodeKind::Inode(InodeKind::Char),
            ENT_INODE_BLOCK => NodeKind::Inode(InodeKind::Block),
            ENT_INODE_PIPE => NodeKind::Inode(InodeKind::Pipe),
            ENT_INODE_SOCKET => NodeKind::Inode(InodeKind::Socket),
            ENT_MSG => NodeKind::Message,
            ENT_SHM => NodeKind::SharedMemory,
            ENT_PACKET => NodeKind::Packet,
            ENT_IATTR => NodeKind::InodeAttributes,
            _ => return None,
        };
        Some(kind)
    }

    /// Handler-level name; all inode variants share "inode"
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Process => "process",
            NodeKind::Task => "task",
            NodeKind::Inode(_) => "inode",
            NodeKind::Message => "message",
            NodeKind::SharedMemory => "shm",
            NodeKind::Packet => "packet",
            NodeKind::InodeAttributes => "iattr",
        }
    }
}

/// Kinds carried by long records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongKind {
    String,
    Path,
    Address,
    Xattr,
    DisclosedEntity,
    DisclosedActivity,
    DisclosedAgent,
    PacketContent,
    Argument,
    Environment,
    Machine,
}

impl LongKind {
    pub fn from_tag(tag: u64) -> Option<Self> {
        let kind = match tag {
            ENT_STR => LongKind::String,
            ENT_PATH => LongKind::Path,
            ENT_ADDR => LongKind::Address,
            ENT_XATTR => LongKind::Xattr,
            ENT_DISC => LongKind::DisclosedEntity,
            ACT_DISC => LongKind::DisclosedActivity,
            AGT_DISC => LongKind::DisclosedAgent,
            ENT_PCKCNT => LongKind::PacketContent,
            ENT_ARG => LongKind::Argument,
            ENT_ENV => LongKind::Environment,
            AGT_MACHINE => LongKind::Machine,
            _ => return None,
        };
        Some(kind)
    }

    /// Handler-level name; arguments and environment share "argument"
    pub fn name(self) -> &'static str {
        match self {
            LongKind::String => "string",
            LongKind::Path => "path",
            LongKind::Address => "address",
            LongKind::Xattr => "xattr",
            LongKind::DisclosedEntity => "entity_disc",
            LongKind::DisclosedActivity => "activity_disc",
            LongKind::DisclosedAgent => "agent_disc",
            LongKind::PacketContent => "packet_content",
            LongKind::Argument | LongKind::Environment => "argument",
            LongKind::Machine => "machine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_classification() {
        assert_eq!(RelationKind::from_tag(RL_READ), Some(RelationKind::Used));
        assert_eq!(RelationKind::from_tag(RL_WRITE), Some(RelationKind::Generated));
        assert_eq!(RelationKind::from_tag(RL_CLONE), Some(RelationKind::Informed));
        assert_eq!(RelationKind::from_tag(RL_NAMED), Some(RelationKind::Derived));
        assert_eq!(
            RelationKind::from_tag(RL_TERMINATE_TASK),
            Some(RelationKind::Influenced)
        );
        assert_eq!(RelationKind::from_tag(RL_RAN_ON), Some(RelationKind::Associated));
    }

    #[test]
    fn test_relation_needs_exactly_one_category() {
        assert_eq!(RelationKind::from_tag(DM_RELATION | 0x01), None);
        assert_eq!(RelationKind::from_tag(DM_RELATION | RL_USED | RL_GENERATED), None);
        // category bit without the relation domain is not a relation
        assert_eq!(RelationKind::from_tag(RL_USED | 0x01), None);
    }

    #[test]
    fn test_all_inode_tags_share_a_handler_name() {
        let tags = [
            ENT_INODE_UNKNOWN,
            ENT_INODE_LINK,
            ENT_INODE_FILE,
            ENT_INODE_DIRECTORY,
            ENT_INODE_CHAR,
            ENT_INODE_BLOCK,
            ENT_INODE_PIPE,
            ENT_INODE_SOCKET,
        ];
        for tag in tags {
            let kind = NodeKind::from_tag(tag).unwrap();
            assert!(matches!(kind, NodeKind::Inode(_)));
            assert_eq!(kind.name(), "inode");
        }
    }

    #[test]
    fn test_long_tags_do_not_classify_as_nodes() {
        assert_eq!(NodeKind::from_tag(ENT_PATH), None);
        assert_eq!(LongKind::from_tag(ENT_PATH), Some(LongKind::Path));
        assert_eq!(LongKind::from_tag(ACT_TASK), None);
        assert_eq!(LongKind::Environment.name(), LongKind::Argument.name());
    }
}
