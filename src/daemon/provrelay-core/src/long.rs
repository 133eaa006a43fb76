//! Typed payloads of long records

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::Buf;
use serde::Serialize;

use crate::error::DecodeError;
use crate::identifier::Identifier;
use crate::record::{at, identifier_at, layout, nul_str, sized_str, Header, PATH_MAX};
use crate::tags::LongKind;

const AF_INET: u16 = 2;
const AF_INET6: u16 = 10;

/// Interned string emitted by the kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringEntry {
    pub header: Header,
    pub value: String,
}

/// Pathname bound to the identifier in the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName {
    pub header: Header,
    pub name: String,
}

impl FileName {
    pub fn identifier(&self) -> Identifier {
        self.header.identifier
    }
}

/// Socket address attached to a socket inode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    pub header: Header,
    pub family: u16,
    /// `None` for families other than IPv4 and IPv6
    pub address: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XattrEntry {
    pub header: Header,
    pub name: String,
    pub value: Vec<u8>,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosedKind {
    Entity,
    Activity,
    Agent,
}

/// Node disclosed from user space through the provenance API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisclosedNode {
    pub header: Header,
    pub kind: DisclosedKind,
    pub parent: Identifier,
    pub content: String,
}

/// Captured packet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketContent {
    pub header: Header,
    pub content: Vec<u8>,
    pub truncated: bool,
}

/// Process argument or environment string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Argument {
    pub header: Header,
    pub environment: bool,
    pub value: String,
    pub truncated: bool,
}

/// Machine the trace was captured on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineInfo {
    pub header: Header,
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub tracer_version: (u8, u8, u8),
    pub commit: String,
}

/// Decoded long record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LongPayload {
    String(StringEntry),
    Path(FileName),
    Address(AddressEntry),
    Xattr(XattrEntry),
    Disclosed(DisclosedNode),
    PacketContent(PacketContent),
    Argument(Argument),
    Machine(MachineInfo),
}

impl LongPayload {
    pub(crate) fn decode(kind: LongKind, bytes: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::read(bytes);
        let payload = match kind {
            LongKind::String => LongPayload::String(StringEntry {
                header,
                value: length_prefixed(bytes, "string")?,
            }),
            LongKind::Path => LongPayload::Path(FileName {
                header,
                name: length_prefixed(bytes, "path")?,
            }),
            LongKind::Address => LongPayload::Address(decode_address(header, bytes)?),
            LongKind::Xattr => LongPayload::Xattr(decode_xattr(header, bytes)?),
            LongKind::DisclosedEntity => disclosed(header, DisclosedKind::Entity, bytes)?,
            LongKind::DisclosedActivity => disclosed(header, DisclosedKind::Activity, bytes)?,
            LongKind::DisclosedAgent => disclosed(header, DisclosedKind::Agent, bytes)?,
            LongKind::PacketContent => {
                let len = at(bytes, layout::PCKCNT_LEN).get_u32_le() as usize;
                if len > layout::PCKCNT_CAPACITY {
                    return Err(DecodeError::too_long(
                        "packet content",
                        len,
                        layout::PCKCNT_CAPACITY,
                    ));
                }
                LongPayload::PacketContent(PacketContent {
                    header,
                    content: bytes[layout::PCKCNT_AREA..layout::PCKCNT_AREA + len].to_vec(),
                    truncated: bytes[layout::PCKCNT_TRUNCATED] != 0,
                })
            }
            LongKind::Argument | LongKind::Environment => {
                let len = at(bytes, layout::ARG_LEN).get_u16_le() as usize;
                LongPayload::Argument(Argument {
                    header,
                    environment: kind == LongKind::Environment,
                    value: sized_str(bytes, layout::ARG_AREA, len, PATH_MAX, "argument")?,
                    truncated: bytes[layout::ARG_TRUNCATED] != 0,
                })
            }
            LongKind::Machine => LongPayload::Machine(decode_machine(header, bytes)),
        };
        Ok(payload)
    }
}

fn length_prefixed(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    let len = at(bytes, layout::STR_LEN).get_u16_le() as usize;
    sized_str(bytes, layout::STR_AREA, len, PATH_MAX, field)
}

fn disclosed(
    header: Header,
    kind: DisclosedKind,
    bytes: &[u8],
) -> Result<LongPayload, DecodeError> {
    let len = at(bytes, layout::DISC_LEN).get_u16_le() as usize;
    Ok(LongPayload::Disclosed(DisclosedNode {
        header,
        kind,
        parent: identifier_at(bytes, layout::DISC_PARENT),
        content: sized_str(bytes, layout::DISC_AREA, len, PATH_MAX, "disclosed content")?,
    }))
}

fn decode_address(header: Header, bytes: &[u8]) -> Result<AddressEntry, DecodeError> {
    let len = at(bytes, layout::ADDR_LEN).get_u16_le() as usize;
    if len > layout::ADDR_CAPACITY {
        return Err(DecodeError::too_long("address", len, layout::ADDR_CAPACITY));
    }
    let raw = &bytes[layout::ADDR_AREA..layout::ADDR_AREA + len];
    if raw.len() < 2 {
        return Ok(AddressEntry {
            header,
            family: 0,
            address: None,
        });
    }

    let mut cursor = raw;
    let family = cursor.get_u16_le();
    let address = match family {
        AF_INET if cursor.remaining() >= 6 => {
            let port = cursor.get_u16();
            let ip = Ipv4Addr::from(cursor.get_u32());
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        AF_INET6 if cursor.remaining() >= 26 => {
            let port = cursor.get_u16();
            let flowinfo = cursor.get_u32();
            let ip = Ipv6Addr::from(cursor.get_u128());
            let scope_id = cursor.get_u32_le();
            Some(SocketAddr::V6(SocketAddrV6::new(ip, port, flowinfo, scope_id)))
        }
        _ => None,
    };
    Ok(AddressEntry {
        header,
        family,
        address,
    })
}

fn decode_xattr(header: Header, bytes: &[u8]) -> Result<XattrEntry, DecodeError> {
    let size = at(bytes, layout::XATTR_SIZE).get_u32_le() as usize;
    if size > layout::XATTR_VALUE_CAPACITY {
        return Err(DecodeError::too_long(
            "xattr value",
            size,
            layout::XATTR_VALUE_CAPACITY,
        ));
    }
    Ok(XattrEntry {
        header,
        name: nul_str(bytes, layout::XATTR_NAME, layout::XATTR_NAME_CAPACITY),
        value: bytes[layout::XATTR_VALUE..layout::XATTR_VALUE + size].to_vec(),
        flags: bytes[layout::XATTR_FLAGS],
    })
}

fn decode_machine(header: Header, bytes: &[u8]) -> MachineInfo {
    let uts = |offset| nul_str(bytes, offset, layout::UTS_FIELD);
    let version = &bytes[layout::MACHINE_CAM_VERSION..layout::MACHINE_CAM_VERSION + 3];
    MachineInfo {
        header,
        sysname: uts(layout::MACHINE_SYSNAME),
        nodename: uts(layout::MACHINE_NODENAME),
        release: uts(layout::MACHINE_RELEASE),
        version: uts(layout::MACHINE_VERSION),
        machine: uts(layout::MACHINE_ARCH),
        tracer_version: (version[0], version[1], version[2]),
        commit: nul_str(bytes, layout::MACHINE_COMMIT, layout::MACHINE_COMMIT_CAPACITY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::record::LongRecord;
    use crate::tags::{AGT_DISC, AGT_MACHINE, ENT_ADDR, ENT_ENV, ENT_PATH, ENT_XATTR};

    #[test]
    fn test_path_name() {
        let bytes = RecordBuilder::long(ENT_PATH).id(3).string("/etc/passwd").build();
        let record = LongRecord::parse(&bytes).unwrap();
        let LongPayload::Path(path) = record.decode().unwrap() else {
            panic!("expected path");
        };
        assert_eq!(path.name, "/etc/passwd");
        assert_eq!(path.identifier().id(), 3);
    }

    #[test]
    fn test_overlong_string_is_malformed() {
        let bytes = RecordBuilder::long(ENT_PATH)
            .put_u16(layout::STR_LEN, (PATH_MAX + 1) as u16)
            .build();
        let record = LongRecord::parse(&bytes).unwrap();
        assert!(matches!(
            record.decode().unwrap_err(),
            DecodeError::Malformed { field: "path", .. }
        ));
    }

    #[test]
    fn test_ipv4_address() {
        let mut sockaddr = Vec::new();
        sockaddr.extend_from_slice(&AF_INET.to_le_bytes());
        sockaddr.extend_from_slice(&8080u16.to_be_bytes());
        sockaddr.extend_from_slice(&[127, 0, 0, 1]);
        let bytes = RecordBuilder::long(ENT_ADDR)
            .put_u16(layout::ADDR_LEN, sockaddr.len() as u16)
            .put_bytes(layout::ADDR_AREA, &sockaddr)
            .build();
        let record = LongRecord::parse(&bytes).unwrap();
        let LongPayload::Address(addr) = record.decode().unwrap() else {
            panic!("expected address");
        };
        assert_eq!(addr.family, AF_INET);
        assert_eq!(addr.address, Some("127.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_unix_address_has_no_socket_addr() {
        let bytes = RecordBuilder::long(ENT_ADDR)
            .put_u16(layout::ADDR_LEN, 4)
            .put_bytes(layout::ADDR_AREA, &[1, 0, b'/', b'x'])
            .build();
        let record = LongRecord::parse(&bytes).unwrap();
        let LongPayload::Address(addr) = record.decode().unwrap() else {
            panic!("expected address");
        };
        assert_eq!(addr.family, 1);
        assert_eq!(addr.address, None);
    }

    #[test]
    fn test_environment_shares_argument_payload() {
        let bytes = RecordBuilder::long(ENT_ENV).argument("HOME=/root", true).build();
        let record = LongRecord::parse(&bytes).unwrap();
        let LongPayload::Argument(arg) = record.decode().unwrap() else {
            panic!("expected argument");
        };
        assert!(arg.environment);
        assert!(arg.truncated);
        assert_eq!(arg.value, "HOME=/root");
    }

    #[test]
    fn test_xattr_and_disclosed() {
        let bytes = RecordBuilder::long(ENT_XATTR)
            .put_bytes(layout::XATTR_NAME, b"security.selinux\0")
            .put_u32(layout::XATTR_SIZE, 3)
            .put_bytes(layout::XATTR_VALUE, b"abc")
            .build();
        let LongPayload::Xattr(xattr) = LongRecord::parse(&bytes).unwrap().decode().unwrap()
        else {
            panic!("expected xattr");
        };
        assert_eq!(xattr.name, "security.selinux");
        assert_eq!(xattr.value, b"abc");

        let parent = RecordBuilder::identifier(AGT_MACHINE, 1);
        let bytes = RecordBuilder::long(AGT_DISC)
            .put_bytes(layout::DISC_PARENT, parent.as_bytes())
            .put_u16(layout::DISC_LEN, 5)
            .put_bytes(layout::DISC_AREA, b"alice")
            .build();
        let LongPayload::Disclosed(node) = LongRecord::parse(&bytes).unwrap().decode().unwrap()
        else {
            panic!("expected disclosed node");
        };
        assert_eq!(node.kind, DisclosedKind::Agent);
        assert_eq!(node.parent, parent);
        assert_eq!(node.content, "alice");
    }

    #[test]
    fn test_machine_descriptor() {
        let bytes = RecordBuilder::long(AGT_MACHINE)
            .put_bytes(layout::MACHINE_SYSNAME, b"Linux\0")
            .put_bytes(layout::MACHINE_ARCH, b"x86_64\0")
            .put_bytes(layout::MACHINE_CAM_VERSION, &[0, 8, 1])
            .build();
        let LongPayload::Machine(machine) = LongRecord::parse(&bytes).unwrap().decode().unwrap()
        else {
            panic!("expected machine");
        };
        assert_eq!(machine.sysname, "Linux");
        assert_eq!(machine.machine, "x86_64");
        assert_eq!(machine.tracer_version, (0, 8, 1));
        assert_eq!(machine.nodename, "");
    }
}
