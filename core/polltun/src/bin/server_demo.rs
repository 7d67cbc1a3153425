//! Minimal echo server: every ingested packet is sent back to the
//! ClientID it arrived from. Illustrates the packet interface a
//! reliability layer above `QueuePacketConn` would drive; not a
//! reimplementation of the pluggable-transport process handshake.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Demonstration echo server for the polling-to-datagram transport core")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let listener = TcpListener::bind(args.addr).await?;
    let (queue, _accept_loop) = polltun::server::serve(listener, polltun_server::Config::default());
    tracing::info!(addr = %args.addr, "listening");

    loop {
        let (packet, client_id) = queue.recv_from().await?;
        queue.send_to(client_id, packet)?;
    }
}
