//! rustls client configurations for the [`TlsConfig`] strategies.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::error::HcpError;
use crate::transport::config::TlsConfig;

/// OS root certificates, loaded once per process
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(|| {
        let result = rustls_native_certs::load_native_certs();
        for err in &result.errors {
            tracing::warn!(error = %err, "error loading native root certificate");
        }
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
        result.certs
    })
}

/// The process-wide default provider if one is installed, aws-lc-rs otherwise
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn tls_error(msg: impl Into<String>) -> HcpError {
    HcpError::Tls(msg.into().into())
}

/// Build the client configuration for `tls`.
///
/// `WebPki` yields `None`: the connector then installs the bundled Mozilla
/// roots itself.
///
/// # Errors
/// [`HcpError::Tls`] if no usable root certificate is found,
/// [`HcpError::Io`]/[`HcpError::Tls`] if a CA file cannot be read.
pub fn client_config(tls: &TlsConfig) -> Result<Option<rustls::ClientConfig>, HcpError> {
    let roots = match tls {
        TlsConfig::WebPki => return Ok(None),
        TlsConfig::AcceptInvalidCerts => {
            tracing::warn!(
                "certificate verification disabled (TlsConfig::AcceptInvalidCerts); \
                 the HCP system is not authenticated"
            );
            return accept_any_config().map(Some);
        }
        TlsConfig::Native => {
            let mut store = RootCertStore::empty();
            let (added, ignored) = store.add_parsable_certificates(native_root_certs().iter().cloned());
            if ignored > 0 {
                tracing::warn!(added, ignored, "some native root certificates could not be parsed");
            }
            if added == 0 {
                return Err(tls_error("no usable root CA certificate in the OS certificate store"));
            }
            store
        }
        TlsConfig::CustomCa(path) => custom_ca_store(path)?,
    };

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HcpError::Tls(Box::new(e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Some(config))
}

/// Root store holding exactly the certificates of a PEM file
fn custom_ca_store(path: &Path) -> Result<RootCertStore, HcpError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| tls_error(format!("cannot read CA file {}: {e}", path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("invalid PEM in {}: {e}", path.display())))?;

    let mut store = RootCertStore::empty();
    let (added, _) = store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(tls_error(format!(
            "no CA certificate found in {}",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), added, "loaded custom CA certificates");
    Ok(store)
}

fn accept_any_config() -> Result<rustls::ClientConfig, HcpError> {
    let provider = crypto_provider();
    Ok(rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| HcpError::Tls(Box::new(e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
        .with_no_client_auth())
}

/// Accepts every server certificate, but still checks that the handshake is
/// signed by the key the server presented
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_webpki_needs_no_config() {
        assert!(client_config(&TlsConfig::WebPki).unwrap().is_none());
    }

    #[test]
    fn test_accept_invalid_certs_builds() {
        assert!(client_config(&TlsConfig::AcceptInvalidCerts).unwrap().is_some());
    }

    #[test]
    fn test_native_roots_do_not_panic() {
        // Minimal containers have no OS certificates; both outcomes are fine
        let _ = client_config(&TlsConfig::Native);
        assert!(std::ptr::eq(native_root_certs(), native_root_certs()));
    }

    #[test]
    fn test_custom_ca_missing_file() {
        let result = client_config(&TlsConfig::CustomCa("/nonexistent/ca.pem".into()));
        assert!(matches!(result, Err(HcpError::Tls(_))));
    }

    #[test]
    fn test_custom_ca_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let result = client_config(&TlsConfig::CustomCa(file.path().to_path_buf()));
        assert!(matches!(result, Err(HcpError::Tls(_))));
    }
}
