use thiserror::Error;

/// Errors surfaced by the parts of serving that are genuinely fallible:
/// binding a listener and accepting connections. Per-request handling
/// never returns an error (see the module-level docs on [`crate::handler`]).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),
    #[error("failed to accept connection")]
    Accept(#[source] std::io::Error),
}
