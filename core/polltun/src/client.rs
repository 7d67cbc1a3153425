use std::fmt;

use polltun_camouflage::{CamouflageTransport, Fingerprint};
use polltun_core::{Config, PollingPacketConn};

use crate::error::ConnectError;

/// The client's one peer: the configured remote host and port. Distinct
/// from [`polltun_core::ClientId`], which identifies the *local* side to
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connects to `host:port` with a TLS-camouflaged [`CamouflageTransport`]
/// and wraps it in a [`PollingPacketConn`], ready for `send_to`/
/// `recv_from`. This is the composition point a pluggable-transport
/// process handshake (out of scope here) would call after parsing its
/// own configuration into `host`, `port`, and `fingerprint`.
pub async fn connect(
    host: impl Into<String>,
    port: u16,
    fingerprint: Fingerprint,
    config: Config,
) -> Result<PollingPacketConn<RemoteAddr, CamouflageTransport>, ConnectError> {
    let host = host.into();
    let transport = CamouflageTransport::connect(host.clone(), port, fingerprint).await?;
    let remote = RemoteAddr { host, port };
    Ok(PollingPacketConn::new(remote, transport, config))
}
