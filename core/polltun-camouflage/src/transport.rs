use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use polltun_core::{PollError, Poller};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::connector::Connector;
use crate::dial::BootstrapDialer;
use crate::error::CamouflageError;
use crate::fingerprint::Fingerprint;

type HttpClient = Client<Connector, Full<Bytes>>;

/// A `Poller` that wraps HTTPS requests in a browser-fingerprinted TLS
/// handshake while still letting hyper manage connection pooling and
/// HTTP/2. See the module-level design notes in [`crate::dial`] and
/// [`crate::connector`] for the bootstrap/ALPN mechanism.
///
/// Reusable only against servers that negotiate the same ALPN protocol
/// every time (a documented constraint, not enforced beyond the
/// `alpn-mismatch` check on each post-bootstrap dial).
pub struct CamouflageTransport {
    origin: http::Uri,
    client: HttpClient,
}

impl CamouflageTransport {
    /// Connects to `host:port`, performing the bootstrap handshake with
    /// `fingerprint` and selecting an HTTP/1.1 or HTTP/2 transport based
    /// on the negotiated ALPN.
    pub async fn connect(host: impl Into<String>, port: u16, fingerprint: Fingerprint) -> Result<Self, CamouflageError> {
        let host = host.into();
        let dialer = Arc::new(BootstrapDialer::new(host.clone(), port, fingerprint)?);
        let alpn = dialer.bootstrap().await?;
        let negotiated_h2 = alpn.as_deref() == Some(b"h2");

        let connector = Connector::new(dialer, negotiated_h2);
        let client = Client::builder(TokioExecutor::new()).http2_only(negotiated_h2).build(connector);

        let origin = http::Uri::builder()
            .scheme("https")
            .authority(format!("{host}:{port}"))
            .path_and_query("/")
            .build()
            .map_err(|e| CamouflageError::Handshake(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        Ok(Self { origin, client })
    }
}

/// A boxed stream of response-body data chunks, used to erase the
/// concrete (and unnameable) `filter_map` combinator type.
pub type DynBodyStream = std::pin::Pin<Box<dyn futures_util::Stream<Item = std::io::Result<Bytes>> + Send>>;

#[async_trait]
impl Poller for CamouflageTransport {
    type Body = StreamReader<DynBodyStream, Bytes>;

    async fn poll(&self, request_body: Bytes, cancellation: CancellationToken) -> Result<Self::Body, PollError> {
        let request = http::Request::post(self.origin.clone())
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(request_body))
            .expect("request built from a fixed origin and a Full body is always well-formed");

        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(PollError::Cancelled),
            result = self.client.request(request) => {
                result.map_err(|err| PollError::Failed(std::io::Error::other(err)))?
            }
        };

        let stream: DynBodyStream = Box::pin(BodyStream::new(response.into_body()).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(err) => Some(Err(std::io::Error::other(err))),
            }
        }));

        Ok(StreamReader::new(stream))
    }
}
