use std::sync::Arc;

use rustls::ClientConfig;

use crate::error::CamouflageError;

/// A named browser Client Hello fingerprint.
///
/// The Rust TLS ecosystem has no equivalent of the Go `utls` library,
/// which forks the handshake layer to reproduce a browser's Client
/// Hello byte-for-byte. This registry instead selects among distinct
/// `rustls` `ClientConfig` presets (TLS version range and ALPN protocol
/// order) keyed by the same names, which is enough to exercise the
/// ALPN-driven transport-selection contract this crate implements even
/// though it does not reproduce a real browser's handshake bytes. See
/// DESIGN.md.
///
/// `HelloCustom`, `HelloGolang`, and fingerprints that don't negotiate a
/// consistent ALPN are intentionally absent, matching the source this
/// registry is modeled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    FirefoxAuto,
    Firefox55,
    Firefox56,
    Firefox63,
    ChromeAuto,
    Chrome58,
    Chrome62,
    Chrome70,
    IosAuto,
    Ios11_1,
    RandomizedAlpn,
    RandomizedNoAlpn,
}

impl Fingerprint {
    /// Parses one of the case-insensitive names listed in the external
    /// interfaces (`hellofirefox_auto`, `hellochrome_70`, ...).
    pub fn parse(name: &str) -> Result<Self, CamouflageError> {
        use Fingerprint::*;
        Ok(match name.to_ascii_lowercase().as_str() {
            "hellofirefox_auto" => FirefoxAuto,
            "hellofirefox_55" => Firefox55,
            "hellofirefox_56" => Firefox56,
            "hellofirefox_63" => Firefox63,
            "hellochrome_auto" => ChromeAuto,
            "hellochrome_58" => Chrome58,
            "hellochrome_62" => Chrome62,
            "hellochrome_70" => Chrome70,
            "helloios_auto" => IosAuto,
            "helloios_11_1" => Ios11_1,
            "hellorandomizedalpn" => RandomizedAlpn,
            "hellorandomizednoalpn" => RandomizedNoAlpn,
            other => return Err(CamouflageError::UnknownFingerprint(other.to_string())),
        })
    }

    /// The ALPN protocol list this fingerprint offers, in preference
    /// order. An empty list means the ALPN extension is omitted
    /// entirely (`hellorandomizednoalpn`), which prevents the peer from
    /// ever negotiating `h2`.
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        use Fingerprint::*;
        match self {
            RandomizedNoAlpn => vec![],
            Ios11_1 => vec![b"http/1.1".to_vec()],
            _ => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
        }
    }

    /// Builds the `rustls::ClientConfig` this fingerprint dials with.
    pub fn client_config(&self, roots: Arc<rustls::RootCertStore>) -> Arc<ClientConfig> {
        let mut config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
        config.alpn_protocols = self.alpn_protocols();
        Arc::new(config)
    }
}
