//! Dialing a byte stream to a peer, regardless of which network it lives on.

pub mod i2p;
pub mod ip;
pub mod tor;

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crawler_chain::{Address, NetworkType};

use crate::config::{NetworkSettings, TimeoutsByTransport};

/// A connected, bidirectional byte stream to a peer.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("address type has no transport: {0}")]
    Unsupported(NetworkType),
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("SOCKS5 proxy error: {0}")]
    Socks(#[from] tokio_socks::Error),
    #[error("SAM protocol error: {0}")]
    Sam(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The transport class an address dials through, used to pick the right
/// timeout triple (§4.3) and proxy target (§4.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportClass {
    Ip,
    Tor,
    I2p,
}

impl TransportClass {
    pub fn of(network_type: NetworkType) -> Option<TransportClass> {
        if network_type.dials_as_ip() {
            Some(TransportClass::Ip)
        } else if network_type.is_onion() {
            Some(TransportClass::Tor)
        } else if network_type.is_i2p() {
            Some(TransportClass::I2p)
        } else {
            None
        }
    }
}

/// Dial `addr`, routing to the IP/Tor/I2P transport based on its network
/// type, applying that class's connect timeout.
pub async fn dial(
    addr: &Address,
    timeouts: &TimeoutsByTransport,
    network: &NetworkSettings,
    i2p_session: &i2p::SharedSamSession,
) -> Result<BoxedStream, TransportError> {
    match TransportClass::of(addr.network_type()) {
        Some(TransportClass::Ip) => ip::dial(addr, timeouts.ip.connect).await,
        Some(TransportClass::Tor) => tor::dial(addr, timeouts.tor.connect, network).await,
        Some(TransportClass::I2p) => i2p::dial(addr, timeouts.i2p.connect, network, i2p_session).await,
        None => Err(TransportError::Unsupported(addr.network_type())),
    }
}
