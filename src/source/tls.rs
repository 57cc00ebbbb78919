// Shared TLS plumbing for the direct sources
//
// Dials the target, performs a handshake with SNI, and harvests the peer
// chain. Certificate validity is recorded, never enforced: the crawler's
// whole purpose is to look at certificates other tools would reject.

use crate::dns;
use crate::error::GraphError;
use crate::fingerprint::Fingerprint;
use crate::Result;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

/// One certificate out of a harvested peer chain.
#[derive(Debug, Clone)]
pub struct ChainCert {
    pub fingerprint: Fingerprint,
    pub der: Vec<u8>,
    /// CN plus SAN DNS names, lowercase, deduplicated.
    pub domains: Vec<String>,
    pub expired: bool,
}

/// Open a TCP connection to `host:port`, resolving the hostname first.
pub async fn dial(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let ips = dns::resolve_ips(host, limit).await?;
    let addr = SocketAddr::new(ips[0], port);

    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| GraphError::Timeout { duration: limit })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                GraphError::ConnectionRefused {
                    host: format!("{}:{}", host, port),
                }
            } else {
                GraphError::IoError { source: e }
            }
        })?;
    Ok(stream)
}

/// Complete a TLS handshake over `stream` and return the peer chain.
pub async fn handshake_chain(
    stream: TcpStream,
    host: &str,
    limit: Duration,
) -> Result<Vec<ChainCert>> {
    let connector = TlsConnector::from(insecure_client_config());
    let server_name =
        ServerName::try_from(host.to_string()).map_err(|_| GraphError::HandshakeFailed {
            details: format!("invalid SNI hostname: {}", host),
        })?;

    let tls_stream = timeout(limit, connector.connect(server_name, stream))
        .await
        .map_err(|_| GraphError::Timeout { duration: limit })?
        .map_err(|e| GraphError::HandshakeFailed {
            details: e.to_string(),
        })?;

    let (_io, connection) = tls_stream.into_inner();
    let peer_certs = connection
        .peer_certificates()
        .ok_or_else(|| GraphError::HandshakeFailed {
            details: "no certificates received from server".to_string(),
        })?;

    let mut chain = Vec::with_capacity(peer_certs.len());
    for der in peer_certs {
        chain.push(parse_chain_cert(der.as_ref())?);
    }
    if chain.is_empty() {
        return Err(GraphError::HandshakeFailed {
            details: "empty certificate chain".to_string(),
        });
    }
    Ok(chain)
}

/// Extract names and validity from one DER certificate.
pub fn parse_chain_cert(der: &[u8]) -> Result<ChainCert> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| GraphError::ParseError {
        message: format!("failed to parse certificate: {:?}", e),
    })?;

    let mut domains = Vec::new();
    for attr in cert.subject().iter_common_name() {
        if let Ok(cn) = attr.as_str() {
            push_unique(&mut domains, cn);
        }
    }
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    push_unique(&mut domains, dns);
                }
            }
        }
    }

    let now = chrono::Utc::now().timestamp();
    let expired = cert.validity().not_after.timestamp() < now;

    Ok(ChainCert {
        fingerprint: Fingerprint::from_der(der),
        der: der.to_vec(),
        domains,
        expired,
    })
}

fn push_unique(domains: &mut Vec<String>, name: &str) {
    let name = crate::host::normalize(name);
    if !name.is_empty() && !domains.contains(&name) {
        domains.push(name);
    }
}

/// Client config that accepts any server certificate.
fn insecure_client_config() -> Arc<ClientConfig> {
    let provider = rustls::crypto::ring::default_provider();
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    Arc::new(config)
}

#[derive(Debug)]
struct AcceptAnyCert(CryptoProvider);

impl ServerCertVerifier for AcceptAnyCert {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_chain_cert(b"not a certificate").is_err());
    }

    #[test]
    fn test_push_unique_normalizes() {
        let mut domains = Vec::new();
        push_unique(&mut domains, "Example.COM");
        push_unique(&mut domains, "example.com.");
        push_unique(&mut domains, "www.example.com");
        assert_eq!(domains, vec!["example.com", "www.example.com"]);
    }
}
