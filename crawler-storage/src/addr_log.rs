//! The addr-data log (§4.7): a compact, append-only binary record of which
//! addresses were advertised by which node.
//!
//! Addresses are interned by `MurmurHash3_x86_32(str(address))` rather than
//! written out in full, and the per-entry timestamp is a zigzag-encoded
//! delta from a single file-wide epoch. Both save space over a naive JSON
//! or CSV log on a crawl that can see millions of advertisements. The core
//! writer emits uncompressed bytes; `crawlerd` is responsible for the
//! outer xz/bz2 compression named in §6 ("the core itself emits
//! uncompressed and hands to the Output collaborator").

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use thiserror::Error;

use crawler_chain::{leb128, murmur, now_unix, zigzag, Address, NetworkType};

const MAGIC: &[u8] = b"p2p-addr-data";
const FORMAT_VERSION: u8 = 1;
const EOF_MARKER: &[u8] = b"EOF";

#[derive(Debug, Error)]
pub enum AddrLogError {
    #[error("bad magic bytes in addr-data log header")]
    BadMagic,
    #[error("unsupported addr-data log version: {0}")]
    UnsupportedVersion(u8),
    #[error("missing header terminator")]
    MissingHeaderTerminator,
    #[error("record not properly terminated with a newline")]
    MissingRecordTerminator,
    #[error(transparent)]
    Leb128(#[from] leb128::Leb128Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Appends node/addr-advertisement records to a freshly created file.
///
/// One writer owns one file for the file's entire lifetime: the header is
/// written once, at construction, and [`AddrLogWriter::close`] writes the
/// trailing `EOF` marker and consumes the writer so it cannot be appended to
/// afterwards.
pub struct AddrLogWriter {
    file: File,
    epoch: i64,
    next_id: u32,
    interned: HashMap<u32, u32>,
}

impl AddrLogWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<AddrLogWriter> {
        let mut file = File::create(path)?;
        let epoch = now_unix();
        file.write_all(MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        file.write_all(&(epoch as u32).to_be_bytes())?;
        file.write_all(b"\n")?;
        Ok(AddrLogWriter { file, epoch, next_id: 0, interned: HashMap::new() })
    }

    /// Intern `addr`'s `MurmurHash3_x86_32(str(addr))`, assigning a new
    /// sequential id the first time a given hash is seen.
    fn intern(&mut self, addr: &Address) -> u32 {
        let hash = murmur::hash_address(&addr.to_string());
        *self.interned.entry(hash).or_insert_with(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        })
    }

    /// Appends one node record: the node that sent the reply, and the
    /// addresses it advertised. Addresses whose [`NetworkType`] has no
    /// addr-data `net_id` slot (i.e. [`NetworkType::Unknown`]) are skipped.
    /// The format has no representation for them, matching the six-entry
    /// `net_id` table in §4.7.
    pub fn append_node(&mut self, node_string: &str, addrs: &[Address]) -> io::Result<()> {
        let mut buf = Vec::new();
        leb128::write_u64(&mut buf, node_string.len() as u64)?;
        buf.extend_from_slice(node_string.as_bytes());

        let encodable: Vec<&Address> = addrs.iter().filter(|a| a.network_type().addr_data_index().is_some()).collect();
        leb128::write_u64(&mut buf, encodable.len() as u64)?;
        for addr in encodable {
            let net_id = addr.network_type().addr_data_index().expect("filtered above");
            let addr_id = self.intern(addr);
            leb128::write_u64(&mut buf, ((addr_id as u64) << 3) | net_id as u64)?;
            let delta = self.epoch - addr.last_seen();
            leb128::write_u64(&mut buf, zigzag::encode_i32(delta as i32) as u64)?;
        }
        buf.push(b'\n');

        self.file.write_all(&buf)
    }

    /// Writes the trailing `EOF` marker and closes the file.
    pub fn close(mut self) -> io::Result<()> {
        self.file.write_all(EOF_MARKER)
    }
}

/// One node's advertised-address records, decoded back from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedAddrRecord {
    pub node: String,
    pub entries: Vec<DecodedEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedEntry {
    pub addr_id: u32,
    pub last_seen: i64,
    pub network_type: NetworkType,
}

/// The inverse of [`AddrLogWriter`]: reads every node record in `bytes`
/// until the `EOF` marker, per §4.7 ("verify magic/version/terminator, then
/// repeatedly read node/record blocks until the `EOF` marker").
pub fn decode(bytes: &[u8]) -> Result<Vec<DecodedAddrRecord>, AddrLogError> {
    let mut cursor = io::Cursor::new(bytes);

    let mut magic = vec![0u8; MAGIC.len()];
    cursor.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(AddrLogError::BadMagic);
    }

    let mut version = [0u8; 1];
    cursor.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(AddrLogError::UnsupportedVersion(version[0]));
    }

    let mut epoch_bytes = [0u8; 4];
    cursor.read_exact(&mut epoch_bytes)?;
    let epoch = u32::from_be_bytes(epoch_bytes) as i64;

    let mut terminator = [0u8; 1];
    cursor.read_exact(&mut terminator)?;
    if terminator[0] != b'\n' {
        return Err(AddrLogError::MissingHeaderTerminator);
    }

    let mut records = Vec::new();
    loop {
        if at_eof_marker(&mut cursor)? {
            break;
        }

        let node_len = leb128::read_u64(&mut cursor)?;
        let mut node_bytes = vec![0u8; node_len as usize];
        cursor.read_exact(&mut node_bytes)?;
        let node = String::from_utf8_lossy(&node_bytes).into_owned();

        let num_entries = leb128::read_u64(&mut cursor)?;
        let mut entries = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            let addr_net_id = leb128::read_u64(&mut cursor)?;
            let addr_id = (addr_net_id >> 3) as u32;
            let net_id = (addr_net_id & 0x07) as u8;
            let network_type = NetworkType::from_addr_data_index(net_id).unwrap_or(NetworkType::Unknown);

            let delta_zigzag = leb128::read_u64(&mut cursor)?;
            let delta = zigzag::decode_i32(delta_zigzag as u32) as i64;
            let last_seen = epoch - delta;

            entries.push(DecodedEntry { addr_id, last_seen, network_type });
        }

        let mut newline = [0u8; 1];
        cursor.read_exact(&mut newline)?;
        if newline[0] != b'\n' {
            return Err(AddrLogError::MissingRecordTerminator);
        }

        records.push(DecodedAddrRecord { node, entries });
    }

    Ok(records)
}

fn at_eof_marker(cursor: &mut io::Cursor<&[u8]>) -> io::Result<bool> {
    let position = cursor.position();
    let remaining = &cursor.get_ref()[position as usize..];
    if remaining.starts_with(EOF_MARKER) {
        cursor.set_position(position + EOF_MARKER.len() as u64);
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_records_with_duplicate_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addr-data.bin");

        let mut writer = AddrLogWriter::create(&path).unwrap();
        let epoch = writer.epoch;

        let a = Address::new("203.0.113.1", 8333, epoch - 60);
        let b = Address::new("203.0.113.1", 8333, epoch - 60); // duplicate host -> same addr_id
        let c = Address::new("2001:db8::1", 8333, epoch - 120);

        writer.append_node("198.51.100.1:8333", &[a.clone(), c.clone()]).unwrap();
        writer.append_node("198.51.100.2:8333", &[b.clone()]).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let records = decode(&bytes).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].node, "198.51.100.1:8333");
        assert_eq!(records[0].entries.len(), 2);
        assert_eq!(records[0].entries[0].last_seen, a.last_seen());
        assert_eq!(records[0].entries[0].network_type, NetworkType::Ipv4);
        assert_eq!(records[0].entries[1].network_type, NetworkType::Ipv6);

        assert_eq!(records[1].entries[0].addr_id, records[0].entries[0].addr_id, "duplicate host reuses addr_id");
    }

    #[test]
    fn skips_addresses_with_no_addr_data_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addr-data.bin");

        let mut writer = AddrLogWriter::create(&path).unwrap();
        let unknown = Address::new("not-an-address", 1, 0);
        writer.append_node("198.51.100.1:8333", &[unknown]).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let records = decode(&bytes).unwrap();
        assert_eq!(records[0].entries.len(), 0);
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(matches!(decode(b"not-the-right-magic"), Err(AddrLogError::BadMagic)));
    }

    #[test]
    fn large_batch_with_many_duplicates_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addr-data.bin");
        let mut writer = AddrLogWriter::create(&path).unwrap();
        let epoch = writer.epoch;

        for i in 0..1000u32 {
            let host = format!("203.0.{}.{}", (i / 2) % 256, (i / 2) % 256);
            let addr = Address::new(host, 8333, epoch - i as i64);
            writer.append_node(&format!("node-{i}"), &[addr]).unwrap();
        }
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let records = decode(&bytes).unwrap();
        assert_eq!(records.len(), 1000);
        // every pair of consecutive entries shares a host, so shares an addr_id
        assert_eq!(records[0].entries[0].addr_id, records[1].entries[0].addr_id);
    }
}
