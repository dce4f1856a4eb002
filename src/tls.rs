//! TLS client configuration for sessions layered on top of a SOCKS5 tunnel.
//!
//! The connector never opens its own transport: the caller hands it an
//! already-relayed socket, and SNI plus certificate checks are made against
//! the destination hostname rather than the proxy the socket points at.

use crate::error::Result;
use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// How the destination's certificate is checked.
#[derive(Clone, Debug, Default)]
pub enum TlsPolicy {
    /// Validate against the Mozilla root program bundled by `webpki-roots`.
    #[default]
    WebPkiRoots,
    /// Validate against an explicit trust store.
    CustomRoots(Arc<RootCertStore>),
    /// Accept whatever the peer presents. Signatures are still checked so the
    /// handshake is well formed, but the peer is not authenticated.
    InsecureSkipVerify,
}

impl TlsPolicy {
    pub fn verifies_peer(&self) -> bool {
        !matches!(self, TlsPolicy::InsecureSkipVerify)
    }
}

/// Builds the connector shared by every pipeline. Only HTTP/1.1 is offered via ALPN.
pub fn build_connector(policy: &TlsPolicy) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let mut config = match policy {
        TlsPolicy::WebPkiRoots => {
            let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsPolicy::CustomRoots(roots) => builder.with_root_certificates(roots.clone()).with_no_client_auth(),
        TlsPolicy::InsecureSkipVerify => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
            .with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parses the destination hostname into the name sent as SNI and checked
/// against the certificate.
pub fn server_name(host: &str) -> std::result::Result<ServerName<'static>, String> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_owned()).map_err(|e| format!("invalid server name {host:?}: {e}"))
}

#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
