// crt.sh certificate transparency source
//
// Queries the crt.sh aggregator for certificates naming a domain, then
// downloads each matching certificate to fingerprint it. Free, no API key,
// rate limited and frequently slow.

use super::tls;
use super::{CertResult, CertSource, PrefetchedResult, QueryResult, SourceOptions};
use crate::error::GraphError;
use crate::graph::is_cdn_cert;
use crate::host;
use crate::status::{DomainStatus, StatusMap};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

const CRTSH_URL: &str = "https://crt.sh/";

/// CT entries processed per query; crt.sh happily returns tens of thousands
/// for popular names.
const RESULT_CAP: usize = 1000;

/// One row of the crt.sh JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct CrtShEntry {
    pub id: i64,
    pub issuer_ca_id: Option<i64>,
    pub serial_number: Option<String>,
    pub common_name: Option<String>,
    pub name_value: Option<String>,
}

pub struct CrtShSource {
    client: reqwest::Client,
    save_dir: Option<PathBuf>,
    include_subdomains: bool,
    include_expired: bool,
}

impl CrtShSource {
    pub fn new(opts: &SourceOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .user_agent(concat!("certgraph/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            save_dir: opts.save_dir.clone(),
            include_subdomains: opts.ct_subdomains,
            include_expired: opts.ct_expired,
        }
    }

    async fn search(&self, host: &str) -> Result<Vec<CrtShEntry>> {
        let pattern = if self.include_subdomains {
            format!("%.{}", host)
        } else {
            host.to_string()
        };

        let mut params = vec![("q", pattern), ("output", "json".to_string())];
        if !self.include_expired {
            params.push(("exclude", "expired".to_string()));
        }

        let response = self.client.get(CRTSH_URL).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::HttpError {
                status: status.as_u16(),
                details: format!("crt.sh search for {}", host),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<CrtShEntry> =
            serde_json::from_str(&body).map_err(|e| GraphError::ParseError {
                message: format!("crt.sh response: {}", e),
            })?;
        Ok(entries)
    }

    /// Download one certificate by crt.sh row id and parse it.
    async fn download_cert(&self, id: i64) -> Result<tls::ChainCert> {
        let response = self
            .client
            .get(CRTSH_URL)
            .query(&[("d", id.to_string())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::HttpError {
                status: status.as_u16(),
                details: format!("crt.sh download of id {}", id),
            });
        }

        let body = response.bytes().await?;
        let der = match pem::parse(&body) {
            Ok(block) => block.into_contents(),
            Err(_) => body.to_vec(),
        };
        tls::parse_chain_cert(&der)
    }
}

#[async_trait]
impl CertSource for CrtShSource {
    fn name(&self) -> &'static str {
        "crtsh"
    }

    async fn query(&self, host: &str) -> Result<Box<dyn QueryResult>> {
        let host = host::normalize(host);
        let entries = dedup_entries(self.search(&host).await?, RESULT_CAP);
        debug!(domain = %host, entries = entries.len(), "crt.sh search done");

        let mut fps = Vec::new();
        let mut certs = HashMap::new();
        for entry in entries {
            let cert = match self.download_cert(entry.id).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(id = entry.id, error = %e, "crt.sh certificate fetch failed");
                    continue;
                }
            };

            if let Some(dir) = &self.save_dir {
                super::save_certificate_logged(dir, &cert.fingerprint, &cert.der);
            }

            if !certs.contains_key(&cert.fingerprint) {
                fps.push(cert.fingerprint);
                certs.insert(
                    cert.fingerprint,
                    CertResult {
                        fingerprint: cert.fingerprint,
                        cdn: is_cdn_cert(cert.domains.iter()),
                        domains: cert.domains,
                    },
                );
            }
        }

        let mut status = StatusMap::new();
        status.insert(host.clone(), DomainStatus::Good);

        let mut fingerprints = HashMap::new();
        fingerprints.insert(host, fps);

        Ok(Box::new(PrefetchedResult {
            status,
            related: Vec::new(),
            fingerprints,
            certs,
        }))
    }
}

/// Collapse precertificate/leaf pairs, which share an issuer and serial but
/// occupy two rows, and bound the amount of work per query.
fn dedup_entries(entries: Vec<CrtShEntry>, cap: usize) -> Vec<CrtShEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in entries {
        let key = match (&entry.issuer_ca_id, &entry.serial_number) {
            (Some(ca), Some(serial)) => format!("{}/{}", ca, serial),
            _ => format!("id/{}", entry.id),
        };
        if seen.insert(key) {
            out.push(entry);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, ca: i64, serial: &str) -> CrtShEntry {
        CrtShEntry {
            id,
            issuer_ca_id: Some(ca),
            serial_number: Some(serial.to_string()),
            common_name: None,
            name_value: None,
        }
    }

    #[test]
    fn test_dedup_collapses_precert_pairs() {
        let entries = vec![entry(1, 10, "aa"), entry(2, 10, "aa"), entry(3, 10, "bb")];
        let deduped = dedup_entries(entries, 100);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 1);
        assert_eq!(deduped[1].id, 3);
    }

    #[test]
    fn test_dedup_respects_cap() {
        let entries = (0..50).map(|i| entry(i, i, "s")).collect();
        assert_eq!(dedup_entries(entries, 10).len(), 10);
    }

    #[test]
    fn test_response_model_parses() {
        let json = r#"[{"issuer_ca_id":16418,"issuer_name":"C=US, O=Let's Encrypt","common_name":"a.test","name_value":"a.test\nb.a.test","id":987654321,"entry_timestamp":"2025-01-01T00:00:00","not_before":"2025-01-01T00:00:00","not_after":"2025-04-01T00:00:00","serial_number":"03abcdef"}]"#;
        let entries: Vec<CrtShEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 987654321);
        assert_eq!(entries[0].common_name.as_deref(), Some("a.test"));
        assert!(entries[0].name_value.as_deref().unwrap().contains("b.a.test"));
    }
}
