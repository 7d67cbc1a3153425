use std::convert::Infallible;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use polltun_core::{ClientId, QueuePacketConn};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::handler;

/// Binds the shared [`QueuePacketConn`] that demultiplexes packets by
/// ClientID to a real HTTP listener, spawning one task per accepted
/// connection (the same one-task-per-connection discipline spec.md §5
/// allows, mirrored from how the teacher's netbench drivers structure
/// their accept loops).
pub struct Server {
    queue: QueuePacketConn<ClientId>,
    config: Config,
}

impl Server {
    /// The server's own `local_addr` is a fixed sentinel: the
    /// `QueuePacketConn`'s peers are keyed by the *client's* ClientID,
    /// never the server's own address, so this value is never read on
    /// the wire.
    pub fn new(config: Config) -> Self {
        let queue = QueuePacketConn::new(ClientId::from_bytes([0u8; polltun_core::CLIENT_ID_LEN]), config.queue.clone());
        Self { queue, config }
    }

    /// The shared packet connection a reliability layer above this
    /// handler reads incoming packets from and writes outgoing packets
    /// (addressed by ClientID) to.
    pub fn queue(&self) -> QueuePacketConn<ClientId> {
        self.queue.clone()
    }

    /// Runs the accept loop until the listener errors. Each connection
    /// is served on its own task, bounded by `config.io_timeout`.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!(local_addr = ?listener.local_addr().ok(), "serving");
        loop {
            let (stream, _peer) = listener.accept().await.map_err(ServerError::Accept)?;
            let io = TokioIo::new(stream);
            let queue = self.queue.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let queue = queue.clone();
                    let config = config.clone();
                    async move { Ok::<_, Infallible>(handler::handle(req, &queue, &config).await) }
                });
                let conn = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new()).serve_connection(io, service);
                match tokio::time::timeout(config.io_timeout, conn).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => debug!(%err, "connection error"),
                    Err(_) => warn!("connection exceeded the io timeout, dropping it"),
                }
            });
        }
    }
}
