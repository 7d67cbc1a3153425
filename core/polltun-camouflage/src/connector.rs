use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use tower_service::Service;

use crate::dial::{BootstrapDialer, TlsStream};
use crate::error::CamouflageError;

pin_project! {
    /// Adapts a dialed TLS stream to hyper's IO traits, reporting
    /// whether the bootstrap handshake negotiated `h2` so hyper-util's
    /// legacy client can multiplex this connection correctly.
    pub struct CamouflageIo {
        #[pin]
        io: TokioIo<TlsStream>,
        negotiated_h2: bool,
    }
}

impl hyper::rt::Read for CamouflageIo {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: hyper::rt::ReadBufCursor<'_>) -> Poll<std::io::Result<()>> {
        self.project().io.poll_read(cx, buf)
    }
}

impl hyper::rt::Write for CamouflageIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.project().io.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().io.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().io.poll_shutdown(cx)
    }
}

impl Connection for CamouflageIo {
    fn connected(&self) -> Connected {
        let connected = Connected::new();
        if self.negotiated_h2 {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}

/// The custom TLS dial callback, exposed as a `tower_service::Service`
/// so hyper-util's legacy client can use it as a connector. Holds no
/// lock of its own beyond what [`BootstrapDialer`] already serializes;
/// the one-time transport-construction lock lives in
/// [`crate::CamouflageTransport`].
#[derive(Clone)]
pub struct Connector {
    dialer: Arc<BootstrapDialer>,
    negotiated_h2: bool,
}

impl Connector {
    pub fn new(dialer: Arc<BootstrapDialer>, negotiated_h2: bool) -> Self {
        Self { dialer, negotiated_h2 }
    }
}

impl Service<Uri> for Connector {
    type Response = CamouflageIo;
    type Error = CamouflageError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let dialer = self.dialer.clone();
        let negotiated_h2 = self.negotiated_h2;
        Box::pin(async move {
            let stream = dialer.dial().await?;
            Ok(CamouflageIo {
                io: TokioIo::new(stream),
                negotiated_h2,
            })
        })
    }
}
