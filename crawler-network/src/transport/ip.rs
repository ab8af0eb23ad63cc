//! Direct TCP transport for IPv4, IPv6 and CJDNS addresses.
//!
//! CJDNS addresses present as IPv6 on the wire and are dialed the same way
//! (§7: "CJDNS dials are attempted as IP").

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crawler_chain::Address;

use super::{BoxedStream, TransportError};

pub async fn dial(addr: &Address, connect_timeout: Duration) -> Result<BoxedStream, TransportError> {
    let attempt = TcpStream::connect((addr.host(), addr.port()));
    match timeout(connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(Box::new(stream)),
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::Timeout(connect_timeout)),
    }
}
