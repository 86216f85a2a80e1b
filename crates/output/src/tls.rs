//! TLS 클라이언트 설정
//!
//! 네트워크 출력(HTTP, Splunk, TCP, syslog over TLS)이 공유하는 rustls
//! `ClientConfig`를 초기화 시점에 한 번 만듭니다.
//!
//! - CA: `ca_cert` PEM 파일, 없으면 OS 신뢰 저장소
//! - 클라이언트 인증서: `client_cert` + `client_key`
//! - `verify = false`: 서버 인증서 검증 생략
//! - `server_name`: 인증서 검증에 사용할 호스트명 고정
//! - `tls12_only`: 최소 버전 TLS 1.2. rustls의 하한이 이미 1.2이므로 `false`여도
//!   1.2와 1.3만 협상하며, 그 사실을 경고로 남깁니다.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::{certs, private_key};

use evfwd_core::config::TlsConfig;

use crate::error::OutputError;

/// 협상 가능한 버전. 최소 TLS 1.2
const PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// TLS 설정으로 rustls 클라이언트 설정을 생성합니다.
pub fn build_client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>, OutputError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    if !tls.tls12_only {
        tracing::warn!("TLS versions below 1.2 are not supported, using TLS 1.2 minimum");
    }

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(PROTOCOL_VERSIONS)
        .map_err(|e| OutputError::Configuration(format!("tls protocol versions: {e}")))?;

    let builder = if !tls.verify {
        tracing::warn!("TLS server certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
    } else {
        let roots = load_roots(&tls.ca_cert)?;
        if tls.server_name.is_empty() {
            builder.with_root_certificates(roots)
        } else {
            let name = ServerName::try_from(tls.server_name.clone()).map_err(|e| {
                OutputError::Configuration(format!(
                    "invalid tls server_name '{}': {e}",
                    tls.server_name
                ))
            })?;
            let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| OutputError::Configuration(format!("tls verifier: {e}")))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(PinnedServerName { inner, name }))
        }
    };

    let config = if tls.has_client_auth() {
        let chain = load_certs(Path::new(&tls.client_cert))?;
        let key = load_private_key(Path::new(&tls.client_key))?;
        builder
            .with_client_auth_cert(chain, key)
            .map_err(|e| OutputError::Configuration(format!("tls client certificate: {e}")))?
    } else {
        builder.with_no_client_auth()
    };

    Ok(Arc::new(config))
}

fn load_roots(ca_cert: &str) -> Result<RootCertStore, OutputError> {
    let mut roots = RootCertStore::empty();
    if ca_cert.is_empty() {
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            tracing::debug!(error = %err, "failed to load native certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "loaded native root certificates");
    } else {
        let (added, _) = roots.add_parsable_certificates(load_certs(Path::new(ca_cert))?);
        if added == 0 {
            return Err(OutputError::Configuration(format!(
                "no usable CA certificates in {ca_cert}"
            )));
        }
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, OutputError> {
    let file = File::open(path).map_err(|e| {
        OutputError::Configuration(format!("failed to open certificate file {}: {e}", path.display()))
    })?;
    let chain = certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            OutputError::Configuration(format!("failed to parse certificates {}: {e}", path.display()))
        })?;
    if chain.is_empty() {
        return Err(OutputError::Configuration(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, OutputError> {
    let file = File::open(path).map_err(|e| {
        OutputError::Configuration(format!("failed to open key file {}: {e}", path.display()))
    })?;
    private_key(&mut BufReader::new(file))
        .map_err(|e| {
            OutputError::Configuration(format!("failed to read private key {}: {e}", path.display()))
        })?
        .ok_or_else(|| {
            OutputError::Configuration(format!("no private key found in {}", path.display()))
        })
}

// ─── 인증서 검증기 ─────────────────────────────────────────────────

/// 서버 인증서를 검증하지 않음 (`verify = false`)
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// 접속 호스트 대신 설정된 이름으로 인증서를 검증
#[derive(Debug)]
struct PinnedServerName {
    inner: Arc<WebPkiServerVerifier>,
    name: ServerName<'static>,
}

impl ServerCertVerifier for PinnedServerName {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, &self.name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_builds() {
        let config = build_client_config(&TlsConfig::default()).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn minimum_version_is_tls12_either_way() {
        use rustls::ProtocolVersion;

        for tls12_only in [true, false] {
            let tls = TlsConfig {
                verify: false,
                tls12_only,
                ..TlsConfig::default()
            };
            let config = build_client_config(&tls).unwrap();
            assert!(config.supports_version(ProtocolVersion::TLSv1_2));
            assert!(config.supports_version(ProtocolVersion::TLSv1_3));
            assert!(!config.supports_version(ProtocolVersion::TLSv1_1));
        }
    }

    #[test]
    fn verification_can_be_disabled() {
        let tls = TlsConfig {
            verify: false,
            server_name: "collector.internal".to_owned(),
            ..TlsConfig::default()
        };
        build_client_config(&tls).unwrap();
    }

    #[test]
    fn missing_ca_file_is_configuration_error() {
        let tls = TlsConfig {
            ca_cert: "/nonexistent/evfwd/ca.pem".to_owned(),
            ..TlsConfig::default()
        };
        let err = build_client_config(&tls).unwrap_err();
        assert!(matches!(err, OutputError::Configuration(_)));
        assert!(err.to_string().contains("/nonexistent/evfwd/ca.pem"));
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a pem file").unwrap();
        let tls = TlsConfig {
            ca_cert: file.path().display().to_string(),
            ..TlsConfig::default()
        };
        let err = build_client_config(&tls).unwrap_err();
        assert!(err.to_string().contains("no certificates found"));
    }

    #[test]
    fn missing_client_key_is_rejected() {
        let tls = TlsConfig {
            verify: false,
            client_cert: "/nonexistent/client.pem".to_owned(),
            client_key: "/nonexistent/client.key".to_owned(),
            ..TlsConfig::default()
        };
        assert!(matches!(
            build_client_config(&tls).unwrap_err(),
            OutputError::Configuration(_)
        ));
    }
}
