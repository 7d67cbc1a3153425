use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use polltun_camouflage::{BootstrapDialer, CamouflageError, Fingerprint};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Spawns a TLS echo-nothing server on localhost that negotiates
/// `alpn_sequence[n]` for its n-th accepted connection (clamped to the
/// last entry once exhausted), so tests can simulate a server whose
/// ALPN choice changes between the bootstrap dial and a later one.
async fn spawn_server(alpn_sequence: Vec<&'static [u8]>) -> std::net::SocketAddr {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.cert.der().to_vec());
    let key_der = PrivatePkcs8KeyDer::from(cert.signing_key.serialize_der());

    let configs: Vec<Arc<ServerConfig>> = alpn_sequence
        .iter()
        .map(|alpn| {
            let mut config = ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(vec![cert_der.clone()], key_der.clone_key().into())
                .unwrap();
            config.alpn_protocols = vec![alpn.to_vec()];
            Arc::new(config)
        })
        .collect();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else { return };
            let idx = counter.fetch_add(1, Ordering::SeqCst).min(configs.len() - 1);
            let acceptor = TlsAcceptor::from(configs[idx].clone());
            tokio::spawn(async move {
                // Just complete the handshake; the test only cares about
                // the negotiated ALPN, not any application data.
                let _ = acceptor.accept(tcp).await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn consistent_alpn_across_dials_succeeds() {
    let addr = spawn_server(vec![b"h2"]).await;
    let dialer = BootstrapDialer::new(addr.ip().to_string(), addr.port(), Fingerprint::ChromeAuto).unwrap();

    let bootstrap_alpn = dialer.bootstrap().await.unwrap();
    assert_eq!(bootstrap_alpn.as_deref(), Some(&b"h2"[..]));

    // The first dial is the one-shot reuse of the bootstrap connection
    // and never touches the network again.
    let _first = dialer.dial().await.expect("bootstrap reuse should not be rejected");
    // The second dial performs a fresh handshake against the same
    // always-h2 server and must also succeed.
    let _second = dialer.dial().await.expect("a second, freshly-handshaken dial with consistent ALPN should not be rejected");
}

#[tokio::test]
async fn alpn_mismatch_on_a_later_dial_is_rejected() {
    // Bootstrap negotiates h2 against the server's first accepted
    // connection; it flips to http/1.1 from its second connection on.
    let addr = spawn_server(vec![b"h2", b"http/1.1"]).await;
    let dialer = BootstrapDialer::new(addr.ip().to_string(), addr.port(), Fingerprint::ChromeAuto).unwrap();

    let bootstrap_alpn = dialer.bootstrap().await.unwrap();
    assert_eq!(bootstrap_alpn.as_deref(), Some(&b"h2"[..]));

    // The first dial only reuses the already-handshaken bootstrap
    // connection, so it never reaches the server's second connection.
    let _first = dialer.dial().await.expect("bootstrap reuse should not be rejected");
    // The second dial performs a fresh handshake, landing on the
    // server's http/1.1 connection, and must be rejected.
    let result = dialer.dial().await;
    assert!(matches!(result, Err(CamouflageError::AlpnMismatch { .. })), "expected an alpn-mismatch error, got {result:?}");
}
