//! I2P transport via the textual SAM v3 protocol.
//!
//! No SAM client crate is part of this corpus' stack, so the minimal subset
//! of SAM v3 we need (`HELLO`, `SESSION CREATE`, `STREAM CONNECT`) is
//! implemented directly over a plain `TcpStream`, in the same style as the
//! rest of this crate's wire-protocol code. This plays the role `i2plib`
//! plays in the original Python crawler (§4.2, §9 "I2P session lifecycle").

use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crawler_chain::Address;

use crate::config::NetworkSettings;

use super::{BoxedStream, TransportError};

/// The process-wide SAM session, created on first I2P dial under a
/// one-shot initializer (§9) and torn down implicitly at process exit when
/// the control connection it holds open is dropped.
#[derive(Default)]
pub struct SharedSamSession {
    inner: OnceCell<SamSession>,
}

struct SamSession {
    id: String,
    /// Held open for the session's lifetime: SAM destroys a session when
    /// the socket that created it closes.
    _control: TcpStream,
}

impl SharedSamSession {
    pub fn new() -> SharedSamSession {
        SharedSamSession::default()
    }

    async fn id(&self, network: &NetworkSettings) -> Result<&str, TransportError> {
        let session = self
            .inner
            .get_or_try_init(|| create_session(network))
            .await?;
        Ok(session.id.as_str())
    }
}

fn generate_session_id() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..12).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

async fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await
}

/// Reads exactly one `\n`-terminated reply line, one byte at a time, so we
/// never buffer past it into bytes that belong to application data that
/// starts flowing over the same socket right after (notably on the data
/// stream returned by `STREAM CONNECT`).
async fn read_reply_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn check_result_ok(reply: &str, context: &'static str) -> Result<(), TransportError> {
    if reply.contains("RESULT=OK") {
        Ok(())
    } else {
        Err(TransportError::Sam(format!("{context}: {reply}")))
    }
}

async fn create_session(network: &NetworkSettings) -> Result<SamSession, TransportError> {
    let mut control = TcpStream::connect((network.i2p_sam_host.as_str(), network.i2p_sam_port)).await?;

    write_line(&mut control, "HELLO VERSION MIN=3.0 MAX=3.3").await?;
    let reply = read_reply_line(&mut control).await?;
    check_result_ok(&reply, "SAM HELLO failed")?;

    let id = generate_session_id();
    write_line(&mut control, &format!("SESSION CREATE STYLE=STREAM ID={id} DESTINATION=TRANSIENT")).await?;
    let reply = read_reply_line(&mut control).await?;
    check_result_ok(&reply, "SAM SESSION CREATE failed")?;

    Ok(SamSession { id, _control: control })
}

pub async fn dial(
    addr: &Address,
    connect_timeout: Duration,
    network: &NetworkSettings,
    session: &SharedSamSession,
) -> Result<BoxedStream, TransportError> {
    let attempt = async {
        let id = session.id(network).await?.to_owned();
        let mut stream = TcpStream::connect((network.i2p_sam_host.as_str(), network.i2p_sam_port)).await?;
        write_line(&mut stream, &format!("STREAM CONNECT ID={id} DESTINATION={} SILENT=false", addr.host())).await?;
        let reply = read_reply_line(&mut stream).await?;
        check_result_ok(&reply, "SAM STREAM CONNECT failed")?;
        Ok(Box::new(stream) as BoxedStream)
    };
    match timeout(connect_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(connect_timeout)),
    }
}
