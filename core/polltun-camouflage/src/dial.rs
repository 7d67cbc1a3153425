use std::sync::{Arc, Mutex as StdMutex};

use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::CamouflageError;
use crate::fingerprint::Fingerprint;

pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

fn default_root_store() -> Arc<rustls::RootCertStore> {
    let mut store = rustls::RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(store)
}

/// Owns the single-use bootstrap connection used by [`crate::Connector`]:
/// the first TLS handshake a [`crate::CamouflageTransport`] performs,
/// used to discover the ALPN-negotiated protocol before the internal
/// HTTP/1.1 or HTTP/2 transport is chosen. Every dial after that first
/// one must negotiate the same ALPN, or it is rejected.
pub struct BootstrapDialer {
    host: String,
    port: u16,
    connector: tokio_rustls::TlsConnector,
    server_name: ServerName<'static>,
    bootstrap: AsyncMutex<Option<TlsStream>>,
    // Set once, by `bootstrap()`, before any dial can reach the
    // fresh-handshake branch (the very first dial always consumes the
    // bootstrap connection instead).
    expected_alpn: StdMutex<Option<Vec<u8>>>,
}

impl BootstrapDialer {
    pub fn new(host: String, port: u16, fingerprint: Fingerprint) -> Result<Self, CamouflageError> {
        let config = fingerprint.client_config(default_root_store());
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| CamouflageError::Handshake(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?
            .to_owned();
        Ok(Self {
            host,
            port,
            connector: tokio_rustls::TlsConnector::from(config),
            server_name,
            bootstrap: AsyncMutex::new(None),
            expected_alpn: StdMutex::new(None),
        })
    }

    /// Performs the bootstrap handshake and stashes the resulting
    /// connection for the connector's first dial to reuse. Returns the
    /// negotiated ALPN protocol, if any.
    pub async fn bootstrap(&self) -> Result<Option<Vec<u8>>, CamouflageError> {
        let (stream, alpn) = self.handshake().await?;
        *self.expected_alpn.lock().unwrap() = Some(alpn.clone().unwrap_or_default());
        *self.bootstrap.lock().await = Some(stream);
        Ok(alpn)
    }

    async fn handshake(&self) -> Result<(TlsStream, Option<Vec<u8>>), CamouflageError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(CamouflageError::Handshake)?;
        let (_, session) = stream.get_ref();
        let alpn = session.alpn_protocol().map(|p| p.to_vec());
        Ok((stream, alpn))
    }

    /// The dial callback: the first call returns the already-handshaken
    /// bootstrap connection; later calls re-handshake with the same
    /// fingerprint and reject an ALPN that disagrees with the
    /// bootstrap's.
    pub async fn dial(&self) -> Result<TlsStream, CamouflageError> {
        if let Some(stream) = self.bootstrap.lock().await.take() {
            return Ok(stream);
        }
        let (stream, alpn) = self.handshake().await?;
        let got = alpn.unwrap_or_default();
        let expected = self.expected_alpn.lock().unwrap().clone().unwrap_or_default();
        if got != expected {
            return Err(CamouflageError::AlpnMismatch {
                expected: Some(String::from_utf8_lossy(&expected).into_owned()),
                got: Some(String::from_utf8_lossy(&got).into_owned()),
            });
        }
        Ok(stream)
    }
}
