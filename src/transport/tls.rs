use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// TLS negotiation profile for an https request.
///
/// `Low` skips peer verification entirely, the historical default of this
/// kind of engine, kept as the default here. `High` verifies the chain
/// against the bundled webpki roots and checks the hostname. `Custom` uses
/// a caller-built rustls config verbatim.
#[derive(Clone, Default)]
pub enum TlsProfile {
  /// No peer verification
  #[default]
  Low,
  /// CA-chain verification plus hostname match
  High,
  /// Caller-supplied configuration, used as-is
  Custom(Arc<ClientConfig>),
}

impl std::fmt::Debug for TlsProfile {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Low => f.write_str("TlsProfile::Low"),
      Self::High => f.write_str("TlsProfile::High"),
      Self::Custom(_) => f.write_str("TlsProfile::Custom"),
    }
  }
}

impl TlsProfile {
  /// Materialize the rustls configuration for this profile.
  #[must_use]
  pub fn client_config(&self) -> Arc<ClientConfig> {
    match self {
      Self::Custom(config) => Arc::clone(config),
      Self::High => {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
          ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
        )
      },
      Self::Low => Arc::new(
        ClientConfig::builder()
          .dangerous()
          .with_custom_certificate_verifier(Arc::new(NoVerify::new()))
          .with_no_client_auth(),
      ),
    }
  }
}

/// Accept-everything verifier backing [`TlsProfile::Low`]
#[derive(Debug)]
struct NoVerify {
  schemes: Vec<SignatureScheme>,
}

impl NoVerify {
  fn new() -> Self {
    Self {
      schemes: rustls::crypto::ring::default_provider()
        .signature_verification_algorithms
        .supported_schemes(),
    }
  }
}

impl ServerCertVerifier for NoVerify {
  fn verify_server_cert(
    &self,
    _end_entity: &CertificateDer<'_>,
    _intermediates: &[CertificateDer<'_>],
    _server_name: &ServerName<'_>,
    _ocsp_response: &[u8],
    _now: UnixTime,
  ) -> Result<ServerCertVerified, rustls::Error> {
    Ok(ServerCertVerified::assertion())
  }

  fn verify_tls12_signature(
    &self,
    _message: &[u8],
    _cert: &CertificateDer<'_>,
    _dss: &DigitallySignedStruct,
  ) -> Result<HandshakeSignatureValid, rustls::Error> {
    Ok(HandshakeSignatureValid::assertion())
  }

  fn verify_tls13_signature(
    &self,
    _message: &[u8],
    _cert: &CertificateDer<'_>,
    _dss: &DigitallySignedStruct,
  ) -> Result<HandshakeSignatureValid, rustls::Error> {
    Ok(HandshakeSignatureValid::assertion())
  }

  fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
    self.schemes.clone()
  }
}
