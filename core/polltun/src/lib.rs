//! Composition points wiring the client (`polltun-camouflage` +
//! `polltun-core`) and server (`polltun-server`) halves of the polling
//! transport together. Re-exports the public surface so a caller depends
//! on one crate.

pub mod client;
mod error;
pub mod server;

pub use error::ConnectError;
pub use polltun_camouflage::Fingerprint;
pub use polltun_core::{ClientId, Config, Error, PollError, PollingPacketConn, QueuePacketConn};
pub use polltun_server::ServerError;
