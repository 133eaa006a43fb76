//! Typed payloads of short records

use std::net::Ipv4Addr;

use bytes::Buf;
use serde::Serialize;

use crate::identifier::Identifier;
use crate::record::{at, identifier_at, layout, Header, ShortKind};
use crate::tags::{InodeKind, NodeKind, RelationKind};

const BODY: usize = layout::BODY;

/// Edge between two provenance nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub header: Header,
    pub kind: RelationKind,
    pub sender: Identifier,
    pub receiver: Identifier,
    pub allowed: bool,
    pub set: bool,
    pub offset: i64,
    pub flags: u64,
    pub task_id: u64,
}

impl Relation {
    fn decode(kind: RelationKind, bytes: &[u8]) -> Self {
        Relation {
            header: Header::read(bytes),
            kind,
            sender: identifier_at(bytes, layout::REL_SENDER),
            receiver: identifier_at(bytes, layout::REL_RECEIVER),
            allowed: bytes[layout::REL_ALLOWED] != 0,
            set: bytes[layout::REL_SET] != 0,
            offset: at(bytes, layout::REL_OFFSET).get_i64_le(),
            flags: at(bytes, layout::REL_FLAGS).get_u64_le(),
            task_id: at(bytes, layout::REL_TASK_ID).get_u64_le(),
        }
    }

    /// Concrete relation tag (e.g. read, write, clone)
    pub fn tag(&self) -> u64 {
        self.header.identifier.tag()
    }
}

/// Process memory and credentials entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessNode {
    pub header: Header,
    pub uid: u32,
    pub gid: u32,
    pub tgid: u32,
    pub utsns: u32,
    pub ipcns: u32,
    pub mntns: u32,
    pub pidns: u32,
    pub netns: u32,
    pub cgroupns: u32,
    pub secid: u32,
}

impl ProcessNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        ProcessNode {
            header: Header::read(bytes),
            uid: body.get_u32_le(),
            gid: body.get_u32_le(),
            tgid: body.get_u32_le(),
            utsns: body.get_u32_le(),
            ipcns: body.get_u32_le(),
            mntns: body.get_u32_le(),
            pidns: body.get_u32_le(),
            netns: body.get_u32_le(),
            cgroupns: body.get_u32_le(),
            secid: body.get_u32_le(),
        }
    }
}

/// Task activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub header: Header,
    pub pid: u32,
    pub vpid: u32,
    pub utime: u64,
    pub stime: u64,
    pub vm: u64,
    pub rss: u64,
    pub hw_vm: u64,
    pub hw_rss: u64,
    pub rbytes: u64,
    pub wbytes: u64,
    pub cancel_wbytes: u64,
}

impl TaskNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        TaskNode {
            header: Header::read(bytes),
            pid: body.get_u32_le(),
            vpid: body.get_u32_le(),
            utime: body.get_u64_le(),
            stime: body.get_u64_le(),
            vm: body.get_u64_le(),
            rss: body.get_u64_le(),
            hw_vm: body.get_u64_le(),
            hw_rss: body.get_u64_le(),
            rbytes: body.get_u64_le(),
            wbytes: body.get_u64_le(),
            cancel_wbytes: body.get_u64_le(),
        }
    }
}

/// Any inode entity (file, directory, pipe, socket, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InodeNode {
    pub header: Header,
    pub kind: InodeKind,
    pub uid: u32,
    pub gid: u32,
    pub mode: u16,
    pub secid: u32,
    pub ino: u64,
    pub dev: u32,
}

impl InodeNode {
    fn decode(kind: InodeKind, bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        let uid = body.get_u32_le();
        let gid = body.get_u32_le();
        let mode = body.get_u16_le();
        body.advance(2);
        InodeNode {
            header: Header::read(bytes),
            kind,
            uid,
            gid,
            mode,
            secid: body.get_u32_le(),
            ino: body.get_u64_le(),
            dev: body.get_u32_le(),
        }
    }
}

/// System V message entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageNode {
    pub header: Header,
    pub msg_type: i64,
    pub secid: u32,
}

impl MessageNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        MessageNode {
            header: Header::read(bytes),
            msg_type: body.get_i64_le(),
            secid: body.get_u32_le(),
        }
    }
}

/// Shared memory segment entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShmNode {
    pub header: Header,
    pub mode: u16,
    pub secid: u32,
}

impl ShmNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        let mode = body.get_u16_le();
        body.advance(2);
        ShmNode {
            header: Header::read(bytes),
            mode,
            secid: body.get_u32_le(),
        }
    }
}

/// Network packet entity; addresses are in network byte order on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketNode {
    pub header: Header,
    pub sender: Ipv4Addr,
    pub receiver: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
    pub protocol: u8,
    pub iseq: u32,
    pub length: u16,
}

impl PacketNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        let sender = Ipv4Addr::from(body.get_u32());
        let receiver = Ipv4Addr::from(body.get_u32());
        let sport = body.get_u16();
        let dport = body.get_u16();
        let protocol = body.get_u8();
        body.advance(3);
        PacketNode {
            header: Header::read(bytes),
            sender,
            receiver,
            sport,
            dport,
            protocol,
            iseq: body.get_u32(),
            length: body.get_u16(),
        }
    }
}

/// Inode attribute change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IattrNode {
    pub header: Header,
    pub valid: u32,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl IattrNode {
    fn decode(bytes: &[u8]) -> Self {
        let mut body = at(bytes, BODY);
        let valid = body.get_u32_le();
        let mode = body.get_u16_le();
        body.advance(2);
        IattrNode {
            header: Header::read(bytes),
            valid,
            mode,
            uid: body.get_u32_le(),
            gid: body.get_u32_le(),
            size: body.get_i64_le(),
            atime: body.get_i64_le(),
            mtime: body.get_i64_le(),
            ctime: body.get_i64_le(),
        }
    }
}

/// Decoded short record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShortPayload {
    Relation(Relation),
    Process(ProcessNode),
    Task(TaskNode),
    Inode(InodeNode),
    Message(MessageNode),
    Shm(ShmNode),
    Packet(PacketNode),
    Iattr(IattrNode),
}

impl ShortPayload {
    pub(crate) fn decode(kind: ShortKind, bytes: &[u8]) -> Self {
        match kind {
            ShortKind::Relation(kind) => ShortPayload::Relation(Relation::decode(kind, bytes)),
            ShortKind::Node(NodeKind::Process) => ShortPayload::Process(ProcessNode::decode(bytes)),
            ShortKind::Node(NodeKind::Task) => ShortPayload::Task(TaskNode::decode(bytes)),
            ShortKind::Node(NodeKind::Inode(kind)) => {
                ShortPayload::Inode(InodeNode::decode(kind, bytes))
            }
            ShortKind::Node(NodeKind::Message) => ShortPayload::Message(MessageNode::decode(bytes)),
            ShortKind::Node(NodeKind::SharedMemory) => ShortPayload::Shm(ShmNode::decode(bytes)),
            ShortKind::Node(NodeKind::Packet) => ShortPayload::Packet(PacketNode::decode(bytes)),
            ShortKind::Node(NodeKind::InodeAttributes) => {
                ShortPayload::Iattr(IattrNode::decode(bytes))
            }
        }
    }
}
