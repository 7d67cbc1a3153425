//! Client and server packet-queue primitives for a polling-to-datagram
//! HTTPS transport: [`QueuePacketConn`] demultiplexes packets per peer
//! address; [`PollingPacketConn`] drives the client-side request loop
//! over an injected [`Poller`].

mod client_id;
mod config;
mod error;
mod poller;
mod polling;
mod queue;

pub use client_id::{ClientId, CLIENT_ID_LEN};
pub use config::Config;
pub use error::{Error, PollError};
pub use poller::Poller;
pub use polling::PollingPacketConn;
pub use queue::{PeerAddr, QueuePacketConn};
