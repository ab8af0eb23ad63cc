//! Bitcoin message payloads (§4.1): parsing and serialization.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::net::Ipv6Addr;
use thiserror::Error;

use crawler_chain::bip155::{self, Bip155Error};
use crawler_chain::varint;

use crate::constants::{
    CMD_ADDR, CMD_ADDRV2, CMD_GETADDR, CMD_PING, CMD_PONG, CMD_SENDADDRV2, CMD_VERACK, CMD_VERSION,
    VERSION_WITH_RELAY, VERSION_WITH_SENDER_FIELDS,
};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unrecognized command: {0:?}")]
    UnknownCommand(String),
    #[error(transparent)]
    VarInt(#[from] crawler_chain::varint::VarIntError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver_services: u64,
    pub receiver_ip: Ipv6Addr,
    pub receiver_port: u16,
    pub sender_services: Option<u64>,
    pub sender_ip: Option<Ipv6Addr>,
    pub sender_port: Option<u16>,
    pub nonce: u64,
    pub user_agent: String,
    pub latest_block: i32,
    pub relay: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddrEntry {
    pub timestamp: u32,
    pub services: u64,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddrV2Entry {
    pub timestamp: u32,
    pub services: u64,
    pub net_id: u8,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    SendAddrV2,
    Ping(u64),
    Pong(u64),
    GetAddr,
    Addr(Vec<AddrEntry>),
    AddrV2(Vec<AddrV2Entry>),
}

impl Message {
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => CMD_VERSION,
            Message::Verack => CMD_VERACK,
            Message::SendAddrV2 => CMD_SENDADDRV2,
            Message::Ping(_) => CMD_PING,
            Message::Pong(_) => CMD_PONG,
            Message::GetAddr => CMD_GETADDR,
            Message::Addr(_) => CMD_ADDR,
            Message::AddrV2(_) => CMD_ADDRV2,
        }
    }

    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Version(v) => write_version(&mut buf, v),
            Message::Verack | Message::SendAddrV2 | Message::GetAddr => {}
            Message::Ping(nonce) | Message::Pong(nonce) => {
                buf.write_u64::<LittleEndian>(*nonce).unwrap();
            }
            Message::Addr(entries) => write_addr(&mut buf, entries),
            Message::AddrV2(entries) => write_addrv2(&mut buf, entries),
        }
        buf
    }

    pub fn parse(command: &str, payload: &[u8]) -> Result<Message, ProtocolError> {
        let mut cursor = Cursor::new(payload);
        match command {
            CMD_VERSION => Ok(Message::Version(read_version(&mut cursor)?)),
            CMD_VERACK => Ok(Message::Verack),
            CMD_SENDADDRV2 => Ok(Message::SendAddrV2),
            CMD_GETADDR => Ok(Message::GetAddr),
            CMD_PING => Ok(Message::Ping(cursor.read_u64::<LittleEndian>()?)),
            CMD_PONG => Ok(Message::Pong(cursor.read_u64::<LittleEndian>()?)),
            CMD_ADDR => Ok(Message::Addr(read_addr(&mut cursor)?)),
            CMD_ADDRV2 => Ok(Message::AddrV2(read_addrv2(&mut cursor)?)),
            other => Err(ProtocolError::UnknownCommand(other.to_owned())),
        }
    }
}

fn write_ipv6_be_port(buf: &mut Vec<u8>, ip: &Ipv6Addr, port: u16) {
    buf.extend_from_slice(&ip.octets());
    buf.write_u16::<BigEndian>(port).unwrap();
}

fn write_user_agent(buf: &mut Vec<u8>, user_agent: &str) {
    varint::write(buf, user_agent.len() as u64).unwrap();
    buf.extend_from_slice(user_agent.as_bytes());
}

fn write_version(buf: &mut Vec<u8>, v: &VersionMessage) {
    buf.write_i32::<LittleEndian>(v.version).unwrap();
    buf.write_u64::<LittleEndian>(v.services).unwrap();
    buf.write_i64::<LittleEndian>(v.timestamp).unwrap();
    buf.write_u64::<LittleEndian>(v.receiver_services).unwrap();
    write_ipv6_be_port(buf, &v.receiver_ip, v.receiver_port);
    if v.version >= VERSION_WITH_SENDER_FIELDS {
        buf.write_u64::<LittleEndian>(v.sender_services.unwrap_or(0)).unwrap();
        write_ipv6_be_port(buf, &v.sender_ip.unwrap_or(Ipv6Addr::UNSPECIFIED), v.sender_port.unwrap_or(0));
    }
    buf.write_u64::<LittleEndian>(v.nonce).unwrap();
    write_user_agent(buf, &v.user_agent);
    buf.write_i32::<LittleEndian>(v.latest_block).unwrap();
    if v.version >= VERSION_WITH_RELAY {
        buf.write_u8(v.relay.unwrap_or(true) as u8).unwrap();
    }
}

fn read_ipv6_be_port(cursor: &mut Cursor<&[u8]>) -> Result<(Ipv6Addr, u16), ProtocolError> {
    let mut octets = [0u8; 16];
    cursor.read_exact(&mut octets)?;
    let port = cursor.read_u16::<BigEndian>()?;
    Ok((Ipv6Addr::from(octets), port))
}

fn read_user_agent(cursor: &mut Cursor<&[u8]>) -> Result<String, ProtocolError> {
    let len = varint::read(cursor)?;
    let mut bytes = vec![0u8; len as usize];
    cursor.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes.clone()).unwrap_or_else(|_| hex::encode(&bytes)))
}

fn read_version(cursor: &mut Cursor<&[u8]>) -> Result<VersionMessage, ProtocolError> {
    let version = cursor.read_i32::<LittleEndian>()?;
    let services = cursor.read_u64::<LittleEndian>()?;
    let timestamp = cursor.read_i64::<LittleEndian>()?;
    let receiver_services = cursor.read_u64::<LittleEndian>()?;
    let (receiver_ip, receiver_port) = read_ipv6_be_port(cursor)?;

    let (sender_services, sender_ip, sender_port) = if version >= VERSION_WITH_SENDER_FIELDS {
        let services = cursor.read_u64::<LittleEndian>()?;
        let (ip, port) = read_ipv6_be_port(cursor)?;
        (Some(services), Some(ip), Some(port))
    } else {
        (None, None, None)
    };

    let nonce = cursor.read_u64::<LittleEndian>()?;
    let user_agent = read_user_agent(cursor)?;
    let latest_block = cursor.read_i32::<LittleEndian>()?;

    let relay = if version >= VERSION_WITH_RELAY {
        let mut byte = [0u8; 1];
        match cursor.read_exact(&mut byte) {
            Ok(_) => Some(byte[0] != 0),
            Err(_) => None,
        }
    } else {
        None
    };

    Ok(VersionMessage {
        version,
        services,
        timestamp,
        receiver_services,
        receiver_ip,
        receiver_port,
        sender_services,
        sender_ip,
        sender_port,
        nonce,
        user_agent,
        latest_block,
        relay,
    })
}

fn ipv6_display_host(ip: &Ipv6Addr) -> String {
    match ip.to_ipv4_mapped() {
        Some(v4) => v4.to_string(),
        None => ip.to_string(),
    }
}

fn write_addr(buf: &mut Vec<u8>, entries: &[AddrEntry]) {
    varint::write(buf, entries.len() as u64).unwrap();
    for entry in entries {
        buf.write_u32::<LittleEndian>(entry.timestamp).unwrap();
        buf.write_u64::<LittleEndian>(entry.services).unwrap();
        let ip: Ipv6Addr = entry
            .host
            .parse()
            .unwrap_or_else(|_| entry.host.parse::<std::net::Ipv4Addr>().map(|v4| v4.to_ipv6_mapped()).unwrap_or(Ipv6Addr::UNSPECIFIED));
        write_ipv6_be_port(buf, &ip, entry.port);
    }
}

fn read_addr(cursor: &mut Cursor<&[u8]>) -> Result<Vec<AddrEntry>, ProtocolError> {
    let count = varint::read(cursor)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let services = cursor.read_u64::<LittleEndian>()?;
        let (ip, port) = read_ipv6_be_port(cursor)?;
        entries.push(AddrEntry { timestamp, services, host: ipv6_display_host(&ip), port });
    }
    Ok(entries)
}

fn write_addrv2(buf: &mut Vec<u8>, entries: &[AddrV2Entry]) {
    varint::write(buf, entries.len() as u64).unwrap();
    for entry in entries {
        buf.write_u32::<LittleEndian>(entry.timestamp).unwrap();
        varint::write(buf, entry.services).unwrap();
        if let Ok((net_id, addr_bytes)) = bip155::encode_address(&entry.host) {
            buf.write_u8(net_id).unwrap();
            varint::write(buf, addr_bytes.len() as u64).unwrap();
            buf.extend_from_slice(&addr_bytes);
        } else {
            buf.write_u8(entry.net_id).unwrap();
            varint::write(buf, 0).unwrap();
        }
        buf.write_u16::<BigEndian>(entry.port).unwrap();
    }
}

/// Parses `addrv2` entries. Per §4.1: "If `addr-length` differs from the
/// type's canonical size the message decoder aborts parsing that entry,
/// logs, and returns the addresses accumulated so far."
fn read_addrv2(cursor: &mut Cursor<&[u8]>) -> Result<Vec<AddrV2Entry>, ProtocolError> {
    let count = varint::read(cursor)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let timestamp = match cursor.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(_) => break,
        };
        let services = match varint::read(cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let net_id = match cursor.read_u8() {
            Ok(v) => v,
            Err(_) => break,
        };
        let addr_len = match varint::read(cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let mut addr_bytes = vec![0u8; addr_len as usize];
        if cursor.read_exact(&mut addr_bytes).is_err() {
            break;
        }
        let port = match cursor.read_u16::<BigEndian>() {
            Ok(v) => v,
            Err(_) => break,
        };

        let host = match bip155::decode_address(net_id, &addr_bytes) {
            Ok(host) => host,
            Err(Bip155Error::WrongLength { .. }) | Err(Bip155Error::UnknownNetId(_)) => {
                tracing::warn!(net_id, addr_len, "addrv2 entry has malformed address bytes; stopping list");
                break;
            }
            Err(e) => {
                tracing::warn!(?e, "failed to decode addrv2 entry");
                break;
            }
        };

        entries.push(AddrV2Entry { timestamp, services, net_id, host, port });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips() {
        let msg = Message::Version(VersionMessage {
            version: 70015,
            services: 0,
            timestamp: 1_700_000_000,
            receiver_services: 0,
            receiver_ip: Ipv6Addr::UNSPECIFIED,
            receiver_port: 8333,
            sender_services: Some(0),
            sender_ip: Some(Ipv6Addr::UNSPECIFIED),
            sender_port: Some(0),
            nonce: 0x0102_0304_0506_0708,
            user_agent: "/TestPeer:1.0/".to_owned(),
            latest_block: 800_000,
            relay: Some(true),
        });
        let payload = msg.serialize_payload();
        let parsed = Message::parse(CMD_VERSION, &payload).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = Message::Ping(0xDEAD_BEEF);
        let payload = ping.serialize_payload();
        assert_eq!(Message::parse(CMD_PING, &payload).unwrap(), ping);

        let pong = Message::Pong(0xDEAD_BEEF);
        let payload = pong.serialize_payload();
        assert_eq!(Message::parse(CMD_PONG, &payload).unwrap(), pong);
    }

    #[test]
    fn empty_payload_messages_round_trip() {
        for msg in [Message::Verack, Message::SendAddrV2, Message::GetAddr] {
            let payload = msg.serialize_payload();
            assert!(payload.is_empty());
            assert_eq!(Message::parse(msg.command(), &payload).unwrap(), msg);
        }
    }

    #[test]
    fn addrv2_stops_on_wrong_length_but_keeps_prior_entries() {
        let mut buf = Vec::new();
        varint::write(&mut buf, 2).unwrap();

        buf.write_u32::<LittleEndian>(1000).unwrap();
        varint::write(&mut buf, 0).unwrap();
        buf.write_u8(1).unwrap(); // ipv4
        varint::write(&mut buf, 4).unwrap();
        buf.extend_from_slice(&[203, 0, 113, 1]);
        buf.write_u16::<BigEndian>(8333).unwrap();

        buf.write_u32::<LittleEndian>(2000).unwrap();
        varint::write(&mut buf, 0).unwrap();
        buf.write_u8(1).unwrap(); // ipv4, but wrong length
        varint::write(&mut buf, 3).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        buf.write_u16::<BigEndian>(8333).unwrap();

        let mut cursor = Cursor::new(buf.as_slice());
        let entries = read_addrv2(&mut cursor).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].host, "203.0.113.1");
    }

    #[test]
    fn addr_collapses_ipv4_mapped() {
        let entries = vec![AddrEntry { timestamp: 0, services: 0, host: "203.0.113.1".to_owned(), port: 8333 }];
        let payload = {
            let mut buf = Vec::new();
            write_addr(&mut buf, &entries);
            buf
        };
        let mut cursor = Cursor::new(payload.as_slice());
        let parsed = read_addr(&mut cursor).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn user_agent_decode_falls_back_to_hex() {
        let mut buf = Vec::new();
        let invalid_utf8 = vec![0xff, 0xfe, 0xfd];
        varint::write(&mut buf, invalid_utf8.len() as u64).unwrap();
        buf.extend_from_slice(&invalid_utf8);
        let mut cursor = Cursor::new(buf.as_slice());
        let user_agent = read_user_agent(&mut cursor).unwrap();
        assert_eq!(user_agent, "fffefd");
    }
}
