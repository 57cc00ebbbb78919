// Certificate nodes of the certificate graph

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// SAN markers of certificates issued to content-delivery networks. A match
/// means the certificate implies shared hosting rather than domain kinship.
const CDN_SAN_MARKERS: &[&str] = &[
    ".cloudflaressl.com",
    ".cloudflare.com",
    ".fastly.net",
    ".incapsula.com",
    ".edgekey.net",
    ".edgesuite.net",
    ".akamaized.net",
    ".cloudfront.net",
    ".azureedge.net",
    ".wpengine.com",
    ".netlify.app",
    ".jdcloud.com",
];

/// A distinct certificate observed via some source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertNode {
    pub fingerprint: Fingerprint,
    /// Hostnames from the common name and SAN list, deduplicated, lowercase,
    /// sorted. Wildcard entries are kept verbatim here and canonicalized at
    /// neighbor-expansion time.
    pub domains: Vec<String>,
    /// Names of the sources that reported this certificate.
    pub found: BTreeSet<String>,
    /// Whether the certificate is known to belong to a CDN.
    pub cdn: bool,
}

impl CertNode {
    pub fn new(fingerprint: Fingerprint, names: Vec<String>, cdn: bool) -> Self {
        let mut domains: Vec<String> = names
            .into_iter()
            .map(|n| crate::host::normalize(&n))
            .filter(|n| !n.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        Self {
            fingerprint,
            domains,
            found: BTreeSet::new(),
            cdn,
        }
    }

    pub fn add_found(&mut self, source: &str) {
        self.found.insert(source.to_string());
    }
}

/// Policy hook: does this name set look like a CDN-issued certificate?
pub fn is_cdn_cert<'a, I>(names: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    names.into_iter().any(|name| {
        let name = crate::host::normalize(name);
        CDN_SAN_MARKERS.iter().any(|marker| name.ends_with(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_sorted_and_deduped() {
        let fp = Fingerprint::from_der(b"cert");
        let node = CertNode::new(
            fp,
            vec![
                "B.test".to_string(),
                "a.test".to_string(),
                "b.test.".to_string(),
            ],
            false,
        );
        assert_eq!(node.domains, vec!["a.test", "b.test"]);
    }

    #[test]
    fn test_found_grows() {
        let fp = Fingerprint::from_der(b"cert");
        let mut node = CertNode::new(fp, vec![], false);
        node.add_found("http");
        node.add_found("http");
        node.add_found("crtsh");
        assert_eq!(node.found.len(), 2);
    }

    #[test]
    fn test_cdn_detection() {
        let cdn = vec!["sni12345.cloudflaressl.com".to_string()];
        assert!(is_cdn_cert(cdn.iter()));

        let plain = vec!["www.example.com".to_string(), "example.com".to_string()];
        assert!(!is_cdn_cert(plain.iter()));
    }

    #[test]
    fn test_cdn_detection_wildcard() {
        let cdn = vec!["*.global.fastly.net".to_string()];
        assert!(is_cdn_cert(cdn.iter()));
    }
}
