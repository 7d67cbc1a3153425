use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::PollError;

/// An abstract request/response operation: writes a byte stream (the
/// HTTP request body) and returns a readable byte stream (the HTTP
/// response body). Implementations may apply request customizations
/// (custom headers, domain fronting, a chosen TLS fingerprint) opaque to
/// [`crate::PollingPacketConn`].
///
/// `cancellation` is the same handle the owning `PollingPacketConn`
/// passes to every in-flight poll; implementations should abandon the
/// request promptly once it fires.
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    /// The response body stream returned by a successful poll.
    type Body: AsyncRead + Send + Unpin;

    async fn poll(&self, request_body: Bytes, cancellation: CancellationToken) -> Result<Self::Body, PollError>;
}
