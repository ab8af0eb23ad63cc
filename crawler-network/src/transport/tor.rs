//! Onion v2/v3 transport: a SOCKS5 connection through a local Tor proxy.
//!
//! Per §4.2, the full onion host (not an IP) is handed to the proxy, and a
//! single deadline covers both the proxy handshake and the remote connect.
//! `tokio::time::timeout` wrapping the whole `Socks5Stream::connect` call
//! gives us exactly that, since the crate resolves the target at the proxy
//! rather than locally.

use std::time::Duration;

use tokio::time::timeout;
use tokio_socks::tcp::Socks5Stream;

use crawler_chain::Address;

use crate::config::NetworkSettings;

use super::{BoxedStream, TransportError};

pub async fn dial(
    addr: &Address,
    connect_timeout: Duration,
    network: &NetworkSettings,
) -> Result<BoxedStream, TransportError> {
    let proxy = (network.tor_proxy_host.as_str(), network.tor_proxy_port);
    let target = (addr.host(), addr.port());
    let attempt = Socks5Stream::connect(proxy, target);
    match timeout(connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(Box::new(stream)),
        Ok(Err(e)) => Err(TransportError::Socks(e)),
        Err(_) => Err(TransportError::Timeout(connect_timeout)),
    }
}
