//! Bitcoin's `CompactSize` wire varint.
//!
//! Distinct from [`crate::leb128`], which backs the addr-data log's own
//! continuation-byte varint. The two formats are not interchangeable: this
//! one is used for message-level lengths (script, vector counts, `addr`
//! entry counts), the other for the addr-data log's per-record integers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VarIntError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Write `value` as a `CompactSize`.
pub fn write(writer: &mut impl Write, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => writer.write_u8(value as u8),
        0xfd..=0xffff => {
            writer.write_u8(0xfd)?;
            writer.write_u16::<LittleEndian>(value as u16)
        }
        0x10000..=0xffff_ffff => {
            writer.write_u8(0xfe)?;
            writer.write_u32::<LittleEndian>(value as u32)
        }
        _ => {
            writer.write_u8(0xff)?;
            writer.write_u64::<LittleEndian>(value)
        }
    }
}

/// Read a `CompactSize`: first byte dispatches to a 2/4/8-byte little-endian
/// follow-on per spec.md §4.1, with no minimality check on the encoding
/// (matching `original_source/protocol.py`'s `read_varint`, which accepts
/// any width for a given prefix).
pub fn read(reader: &mut impl Read) -> Result<u64, VarIntError> {
    let prefix = reader.read_u8()?;
    let value = match prefix {
        0xfd => reader.read_u16::<LittleEndian>()? as u64,
        0xfe => reader.read_u32::<LittleEndian>()? as u64,
        0xff => reader.read_u64::<LittleEndian>()?,
        small => small as u64,
    };
    Ok(value)
}

/// The number of bytes `write` would emit for `value`.
pub fn encoded_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) {
        let mut buf = Vec::new();
        write(&mut buf, value).unwrap();
        assert_eq!(buf.len(), encoded_len(value));
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read(&mut cursor).unwrap(), value);
    }

    #[test]
    fn round_trips_boundary_values() {
        for v in [0, 1, 0xfc, 0xfd, 0xfe, 0xffff, 0x10000, 0xffff_ffff, u64::MAX] {
            round_trip(v);
        }
    }

    #[test]
    fn accepts_non_canonical_fd() {
        let mut cursor = io::Cursor::new(vec![0xfd, 0x0a, 0x00]);
        assert_eq!(read(&mut cursor).unwrap(), 0x0a);
    }

    #[test]
    fn accepts_non_canonical_fe() {
        let mut cursor = io::Cursor::new(vec![0xfe, 0xff, 0xff, 0x00, 0x00]);
        assert_eq!(read(&mut cursor).unwrap(), 0xffff);
    }

    proptest::proptest! {
        #[test]
        fn round_trips_any_u64(v: u64) {
            let mut buf = Vec::new();
            write(&mut buf, v).unwrap();
            proptest::prop_assert_eq!(buf.len(), encoded_len(v));
            let mut cursor = io::Cursor::new(buf);
            proptest::prop_assert_eq!(read(&mut cursor).unwrap(), v);
        }
    }
}
