//! The server side of the polling transport: an HTTP GET/POST handler
//! (§4.4) bound to a [`polltun_core::QueuePacketConn`] shared across all
//! connected ClientIDs.

mod config;
mod error;
mod handler;
mod serve;

pub use config::Config;
pub use error::ServerError;
pub use handler::{handle, ResponseBody};
pub use serve::Server;
