use std::sync::Arc;

use polltun_core::{ClientId, QueuePacketConn};
use polltun_server::{Config, Server, ServerError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Binds `listener` and starts serving it in a background task, returning
/// the shared [`QueuePacketConn`] a reliability layer above this core
/// reads/writes and a handle to the accept loop. This is the composition
/// point a process-level server binary (out of scope here) would call
/// after parsing its own listen address and TLS configuration.
pub fn serve(listener: TcpListener, config: Config) -> (QueuePacketConn<ClientId>, JoinHandle<Result<(), ServerError>>) {
    let server = Arc::new(Server::new(config));
    let queue = server.queue();
    let handle = tokio::spawn(async move { server.serve(listener).await });
    (queue, handle)
}
