//! The Bitcoin network message envelope (§4.1).

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::MAINNET_MAGIC;

const COMMAND_LEN: usize = 12;
const HEADER_LEN: usize = 4 + COMMAND_LEN + 4 + 4;

/// A framed, not-yet-interpreted message.
///
/// `magic_ok`/`checksum_ok` are recorded rather than turned into a hard
/// error: per §4.1 "a magic or checksum mismatch is recorded but does not
/// abort the stream", the envelope is still yielded.
#[derive(Clone, Debug)]
pub struct RawEnvelope {
    pub command: String,
    pub payload: Vec<u8>,
    pub magic_ok: bool,
    pub checksum_ok: bool,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("connection closed while reading envelope")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn hash256(payload: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(payload);
    Sha256::digest(first).into()
}

pub fn command_bytes(command: &str) -> [u8; COMMAND_LEN] {
    let mut buf = [0u8; COMMAND_LEN];
    let bytes = command.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn command_from_bytes(bytes: &[u8; COMMAND_LEN]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

pub async fn write(writer: &mut (impl AsyncWrite + Unpin), command: &str, payload: &[u8]) -> std::io::Result<()> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MAINNET_MAGIC);
    header.extend_from_slice(&command_bytes(command));
    header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    let digest = hash256(payload);
    header.extend_from_slice(&digest[..4]);
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

pub async fn read(reader: &mut (impl AsyncRead + Unpin)) -> Result<RawEnvelope, EnvelopeError> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(EnvelopeError::Eof),
        Err(e) => return Err(e.into()),
    }
    let magic_ok = magic == MAINNET_MAGIC;

    let mut command_buf = [0u8; COMMAND_LEN];
    reader.read_exact(&mut command_buf).await?;
    let command = command_from_bytes(&command_buf);

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut checksum_buf = [0u8; 4];
    reader.read_exact(&mut checksum_buf).await?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let checksum_ok = hash256(&payload)[..4] == checksum_buf;

    Ok(RawEnvelope { command, payload, magic_ok, checksum_ok })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_write_and_read() {
        let mut buf = Vec::new();
        write(&mut buf, "ping", &8u64.to_le_bytes()).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let env = read(&mut cursor).await.unwrap();
        assert_eq!(env.command, "ping");
        assert!(env.magic_ok);
        assert!(env.checksum_ok);
        assert_eq!(env.payload, 8u64.to_le_bytes());
    }

    #[tokio::test]
    async fn detects_checksum_mismatch_without_aborting() {
        let mut buf = Vec::new();
        write(&mut buf, "verack", &[]).await.unwrap();
        buf[20] ^= 0xff; // checksum field starts right after the 4-byte length

        let mut cursor = std::io::Cursor::new(buf);
        let env = read(&mut cursor).await.unwrap();
        assert_eq!(env.command, "verack");
        assert!(!env.checksum_ok);
    }
}
