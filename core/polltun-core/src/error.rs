use thiserror::Error;

/// Errors surfaced by [`crate::QueuePacketConn`] and [`crate::PollingPacketConn`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation on a closed connection")]
    Closed,
}

/// Errors surfaced by an injected [`crate::Poller`].
#[derive(Debug, Error)]
pub enum PollError {
    #[error("poll failed")]
    Failed(#[source] std::io::Error),
    #[error("poll cancelled")]
    Cancelled,
}

impl From<std::io::Error> for PollError {
    fn from(err: std::io::Error) -> Self {
        PollError::Failed(err)
    }
}
