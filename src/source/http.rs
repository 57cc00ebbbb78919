// Direct HTTPS source - handshake with host:443 and read the peer chain

use super::tls;
use super::{CertResult, CertSource, PrefetchedResult, QueryResult, SourceOptions};
use crate::graph::is_cdn_cert;
use crate::host;
use crate::status::{DomainStatus, StatusMap};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const HTTPS_PORT: u16 = 443;

/// Queries a host by performing a real TLS handshake against port 443 with
/// SNI set to the hostname.
pub struct HttpSource {
    timeout: Duration,
    save_dir: Option<PathBuf>,
}

impl HttpSource {
    pub fn new(opts: &SourceOptions) -> Self {
        Self {
            timeout: opts.timeout,
            save_dir: opts.save_dir.clone(),
        }
    }

    async fn fetch_leaf(&self, host: &str) -> Result<tls::ChainCert> {
        let stream = tls::dial(host, HTTPS_PORT, self.timeout).await?;
        let mut chain = tls::handshake_chain(stream, host, self.timeout).await?;
        Ok(chain.remove(0))
    }
}

#[async_trait]
impl CertSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn query(&self, host: &str) -> Result<Box<dyn QueryResult>> {
        let host = host::normalize(host);
        let mut status = StatusMap::new();
        let mut fingerprints = HashMap::new();
        let mut certs = HashMap::new();

        match self.fetch_leaf(&host).await {
            Ok(leaf) => {
                let observed = if leaf.expired {
                    DomainStatus::Expired
                } else {
                    DomainStatus::Good
                };
                status.insert(host.clone(), observed);

                if let Some(dir) = &self.save_dir {
                    super::save_certificate_logged(dir, &leaf.fingerprint, &leaf.der);
                }

                fingerprints.insert(host.clone(), vec![leaf.fingerprint]);
                certs.insert(
                    leaf.fingerprint,
                    CertResult {
                        fingerprint: leaf.fingerprint,
                        cdn: is_cdn_cert(leaf.domains.iter()),
                        domains: leaf.domains,
                    },
                );
            }
            Err(e) => {
                debug!(domain = %host, error = %e, "https probe failed");
                status.insert(host.clone(), DomainStatus::from_error(&e));
                fingerprints.insert(host.clone(), Vec::new());
            }
        }

        Ok(Box::new(PrefetchedResult {
            status,
            related: Vec::new(),
            fingerprints,
            certs,
        }))
    }
}
