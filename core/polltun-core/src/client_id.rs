use std::fmt;

use rand::RngCore;

/// Number of random bytes in a [`ClientId`].
pub const CLIENT_ID_LEN: usize = 8;

/// An 8-byte opaque value chosen uniformly at random by a client at
/// construction, used as both its local address and the server's
/// demultiplexing key. Fixed for the lifetime of the connection that
/// generated it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId([u8; CLIENT_ID_LEN]);

impl ClientId {
    /// Generates a new ClientID from a cryptographically secure RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLIENT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; CLIENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_LEN] {
        &self.0
    }
}

/// Returned when a byte slice presented as a wire-format ClientID prefix
/// is not exactly [`CLIENT_ID_LEN`] bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongLength;

impl fmt::Display for WrongLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client id must be exactly {CLIENT_ID_LEN} bytes")
    }
}

impl std::error::Error for WrongLength {}

impl TryFrom<&[u8]> for ClientId {
    type Error = WrongLength;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; CLIENT_ID_LEN] = value.try_into().map_err(|_| WrongLength)?;
        Ok(Self(array))
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({self})")
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
