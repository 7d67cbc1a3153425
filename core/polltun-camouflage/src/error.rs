use thiserror::Error;

#[derive(Debug, Error)]
pub enum CamouflageError {
    #[error("unknown client hello fingerprint: {0}")]
    UnknownFingerprint(String),

    #[error("tls handshake failed")]
    Handshake(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A post-bootstrap dial negotiated a different ALPN protocol than
    /// the bootstrap handshake did.
    #[error("dial negotiated ALPN {got:?}, expected {expected:?} from the bootstrap handshake")]
    AlpnMismatch { expected: Option<String>, got: Option<String> },
}
