// Google certificate transparency source
//
// Queries the transparency report's certificate search API. Results are
// paginated; each page carries base64 SHA-256 hashes, and full details are
// fetched per certificate on demand. The API never exposes DER bytes, so
// this source cannot persist certificates.

use super::{CertResult, CertSource, QueryResult, SourceOptions};
use crate::error::GraphError;
use crate::fingerprint::Fingerprint;
use crate::graph::is_cdn_cert;
use crate::host;
use crate::status::{DomainStatus, StatusMap};
use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const BASE_URL: &str =
    "https://transparencyreport.google.com/transparencyreport/api/v3/httpsreport/ct/certsearch";

/// Certificates collected per query before pagination stops.
const RESULT_CAP: usize = 50;

pub struct GoogleCtSource {
    client: reqwest::Client,
    include_subdomains: bool,
    include_expired: bool,
}

impl GoogleCtSource {
    pub fn new(opts: &SourceOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .user_agent(concat!("certgraph/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            include_subdomains: opts.ct_subdomains,
            include_expired: opts.ct_expired,
        }
    }

    async fn fetch_page(&self, host: &str, token: Option<&str>) -> Result<String> {
        let request = match token {
            Some(token) => self
                .client
                .get(format!("{}/page", BASE_URL))
                .query(&[("p", token)]),
            None => self.client.get(BASE_URL).query(&[
                ("include_expired", bool_param(self.include_expired)),
                ("include_subdomains", bool_param(self.include_subdomains)),
                ("domain", host),
            ]),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::HttpError {
                status: status.as_u16(),
                details: format!("certificate search for {}", host),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CertSource for GoogleCtSource {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn query(&self, host: &str) -> Result<Box<dyn QueryResult>> {
        let host = host::normalize(host);

        let mut hashes: Vec<(Fingerprint, String)> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let body = self.fetch_page(&host, token.as_deref()).await?;
            let (page_hashes, next) = parse_search_payload(&body)?;
            for hash in page_hashes {
                if let Some(fp) = fingerprint_from_hash(&hash) {
                    if !hashes.iter().any(|(existing, _)| *existing == fp) {
                        hashes.push((fp, hash));
                    }
                }
                if hashes.len() >= RESULT_CAP {
                    break;
                }
            }
            if hashes.len() >= RESULT_CAP {
                break;
            }
            match next {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        debug!(domain = %host, certs = hashes.len(), "certificate search done");

        let mut status = StatusMap::new();
        status.insert(host.clone(), DomainStatus::Good);

        let mut fingerprints = HashMap::new();
        fingerprints.insert(host.clone(), hashes.iter().map(|(fp, _)| *fp).collect());

        Ok(Box::new(GoogleResult {
            client: self.client.clone(),
            status,
            fingerprints,
            hashes: hashes.into_iter().collect(),
        }))
    }
}

struct GoogleResult {
    client: reqwest::Client,
    status: StatusMap,
    fingerprints: HashMap<String, Vec<Fingerprint>>,
    hashes: HashMap<Fingerprint, String>,
}

#[async_trait]
impl QueryResult for GoogleResult {
    fn status(&self) -> StatusMap {
        self.status.clone()
    }

    fn related(&self) -> Vec<String> {
        Vec::new()
    }

    fn fingerprints(&self) -> HashMap<String, Vec<Fingerprint>> {
        self.fingerprints.clone()
    }

    async fn query_cert(&self, fp: &Fingerprint) -> Result<CertResult> {
        let hash = self.hashes.get(fp).ok_or_else(|| GraphError::CertNotFound {
            fingerprint: fp.hex(),
        })?;

        let response = self
            .client
            .get(format!("{}/certbyhash", BASE_URL))
            .query(&[("hash", hash)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::HttpError {
                status: status.as_u16(),
                details: format!("certificate lookup for {}", fp),
            });
        }

        let body = response.text().await?;
        let domains = parse_cert_payload(&body)?;
        Ok(CertResult {
            fingerprint: *fp,
            cdn: is_cdn_cert(domains.iter()),
            domains,
        })
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn fingerprint_from_hash(hash: &str) -> Option<Fingerprint> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(hash)
        .ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    Some(Fingerprint::from_bytes(bytes))
}

/// The API prefixes every response with an anti-XSSI line that must be
/// stripped before the JSON parser sees it.
fn strip_xssi_prefix(body: &str) -> &str {
    match body.find('\n') {
        Some(pos) if body.starts_with(")]}'") => &body[pos + 1..],
        _ => body,
    }
}

/// Pull certificate hashes and the next-page token out of a search response.
///
/// The payload is a nested array: `[0][1]` lists certificate entries with
/// the base64 hash at index 5, and `[0][3][1]` carries the pagination token.
fn parse_search_payload(body: &str) -> Result<(Vec<String>, Option<String>)> {
    let value: Value =
        serde_json::from_str(strip_xssi_prefix(body)).map_err(|e| GraphError::ParseError {
            message: format!("certificate search response: {}", e),
        })?;

    let mut hashes = Vec::new();
    if let Some(entries) = value
        .get(0)
        .and_then(|v| v.get(1))
        .and_then(Value::as_array)
    {
        for entry in entries {
            if let Some(hash) = entry.get(5).and_then(Value::as_str) {
                hashes.push(hash.to_string());
            }
        }
    }

    let token = value
        .get(0)
        .and_then(|v| v.get(3))
        .and_then(|v| v.get(1))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((hashes, token))
}

/// Pull the subject CN and DNS names out of a certificate-details response.
///
/// The details live at `[0][1]`: the CN at index 1, the DNS name list at
/// index 7.
fn parse_cert_payload(body: &str) -> Result<Vec<String>> {
    let value: Value =
        serde_json::from_str(strip_xssi_prefix(body)).map_err(|e| GraphError::ParseError {
            message: format!("certificate details response: {}", e),
        })?;

    let details = value
        .get(0)
        .and_then(|v| v.get(1))
        .ok_or_else(|| GraphError::ParseError {
            message: "certificate details missing from response".to_string(),
        })?;

    let mut domains = Vec::new();
    let mut push = |name: &str| {
        let name = host::normalize(name);
        if !name.is_empty() && !domains.contains(&name) {
            domains.push(name);
        }
    };

    if let Some(cn) = details.get(1).and_then(Value::as_str) {
        push(cn);
    }
    if let Some(names) = details.get(7).and_then(Value::as_array) {
        for name in names {
            if let Some(name) = name.as_str() {
                push(name);
            }
        }
    }

    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_xssi_prefix() {
        let body = ")]}'\n[[\"x\"]]";
        assert_eq!(strip_xssi_prefix(body), "[[\"x\"]]");
        assert_eq!(strip_xssi_prefix("[[1]]"), "[[1]]");
    }

    #[test]
    fn test_parse_search_payload() {
        let hash = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let body = format!(
            ")]}}'\n[[\"https.ct.cdsr\",[[null,\"a.test\",\"CA\",\"\",\"\",\"{}\",1,2]],null,[null,\"NEXT_TOKEN\",null,1,5]]]",
            hash
        );
        let (hashes, token) = parse_search_payload(&body).unwrap();
        assert_eq!(hashes, vec![hash]);
        assert_eq!(token.as_deref(), Some("NEXT_TOKEN"));
    }

    #[test]
    fn test_parse_search_payload_without_entries() {
        let body = ")]}'\n[[\"https.ct.cdsr\",null,null,null]]";
        let (hashes, token) = parse_search_payload(body).unwrap();
        assert!(hashes.is_empty());
        assert!(token.is_none());
    }

    #[test]
    fn test_parse_cert_payload() {
        let body = ")]}'\n[[\"https.ct.cdsr\",[\"03\",\"a.test\",\"CA\",1,2,null,null,[\"a.test\",\"B.test\",\"a.test\"]]]]";
        let domains = parse_cert_payload(body).unwrap();
        assert_eq!(domains, vec!["a.test", "b.test"]);
    }

    #[test]
    fn test_fingerprint_from_hash() {
        let hash = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        let fp = fingerprint_from_hash(&hash).unwrap();
        assert_eq!(fp.as_bytes(), &[9u8; 32]);
        assert!(fingerprint_from_hash("AAAA").is_none());
        assert!(fingerprint_from_hash("!!!").is_none());
    }
}
