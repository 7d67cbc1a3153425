//! A [`polltun_core::Poller`] that dials HTTPS with a browser-shaped TLS
//! Client Hello, bootstrapping once per transport to discover whether
//! the peer negotiates `h2` or `http/1.1` and picking the matching
//! hyper transport accordingly.

mod connector;
mod dial;
mod error;
mod fingerprint;
mod transport;

pub use connector::{CamouflageIo, Connector};
pub use dial::BootstrapDialer;
pub use error::CamouflageError;
pub use fingerprint::Fingerprint;
pub use transport::{CamouflageTransport, DynBodyStream};
