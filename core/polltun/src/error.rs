use thiserror::Error;

/// Errors surfaced by [`crate::client::connect`].
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Camouflage(#[from] polltun_camouflage::CamouflageError),
}
