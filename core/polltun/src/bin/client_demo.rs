//! Sends one packet to a polltun server and prints its echo. Illustrates
//! `polltun::client::connect`; not a reimplementation of the
//! pluggable-transport process handshake.

use bytes::Bytes;
use clap::Parser;
use polltun::{client, Fingerprint};
use polltun_core::Config;

#[derive(Parser)]
#[command(about = "Demonstration client for the polling-to-datagram transport core")]
struct Args {
    #[arg(long)]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value = "hellofirefox_auto")]
    fingerprint: String,
    #[arg(long, default_value = "hello from polltun")]
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let fingerprint = Fingerprint::parse(&args.fingerprint)?;

    let conn = client::connect(args.host.clone(), args.port, fingerprint, Config::client()).await?;
    conn.send_to(Bytes::from(args.message.clone().into_bytes()))?;

    let (packet, remote) = conn.recv_from().await?;
    println!("received {} bytes from {remote}: {packet:?}", packet.len());
    Ok(())
}
