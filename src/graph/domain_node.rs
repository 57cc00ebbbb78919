// Domain nodes of the certificate graph

use crate::fingerprint::Fingerprint;
use crate::status::{DomainStatus, StatusMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A hostname discovered during traversal.
///
/// Created once per distinct domain when the domain is first accepted into
/// the graph, then populated by the visiting worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNode {
    pub domain: String,
    pub depth: u32,
    pub root: bool,
    /// Source name to the status that source observed for this domain.
    #[serde(default)]
    pub status: BTreeMap<String, DomainStatus>,
    /// Source name to the fingerprints that source associated with this domain.
    #[serde(default)]
    pub certs: BTreeMap<String, BTreeSet<Fingerprint>>,
    /// Hostnames a source reported as related without appearing in any SAN
    /// list, e.g. MX exchanges.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub related: BTreeSet<String>,
}

impl DomainNode {
    pub fn new(domain: &str, depth: u32) -> Self {
        Self {
            domain: crate::host::normalize(domain),
            depth,
            root: false,
            status: BTreeMap::new(),
            certs: BTreeMap::new(),
            related: BTreeSet::new(),
        }
    }

    pub fn root(domain: &str) -> Self {
        let mut node = Self::new(domain, 0);
        node.root = true;
        node
    }

    pub fn add_status(&mut self, source: &str, status: DomainStatus) {
        self.status.insert(source.to_string(), status);
    }

    /// Record the entry for this node's own domain out of a source's
    /// host-keyed status map.
    pub fn add_status_map(&mut self, source: &str, statuses: &StatusMap) {
        if let Some(status) = statuses.get(&self.domain) {
            self.add_status(source, *status);
        }
    }

    pub fn add_related(&mut self, hosts: &[String]) {
        for host in hosts {
            let host = crate::host::normalize(host);
            if !host.is_empty() && host != self.domain {
                self.related.insert(host);
            }
        }
    }

    pub fn add_cert_fingerprint(&mut self, source: &str, fingerprint: Fingerprint) {
        self.certs
            .entry(source.to_string())
            .or_default()
            .insert(fingerprint);
    }
}

impl fmt::Display for DomainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let statuses: Vec<String> = self
            .status
            .iter()
            .map(|(source, status)| format!("{}:{}", source, status))
            .collect();
        write!(f, "{} {} {}", self.domain, self.depth, statuses.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_domain() {
        let node = DomainNode::new("A.Test.", 2);
        assert_eq!(node.domain, "a.test");
        assert_eq!(node.depth, 2);
        assert!(!node.root);
    }

    #[test]
    fn test_root_constructor() {
        let node = DomainNode::root("seed.test");
        assert_eq!(node.depth, 0);
        assert!(node.root);
    }

    #[test]
    fn test_status_map_only_takes_own_entry() {
        let mut node = DomainNode::new("a.test", 0);
        let mut statuses = StatusMap::new();
        statuses.insert("a.test".into(), DomainStatus::Good);
        statuses.insert("mx.a.test".into(), DomainStatus::Timeout);
        node.add_status_map("smtp", &statuses);
        assert_eq!(node.status.get("smtp"), Some(&DomainStatus::Good));
        assert_eq!(node.status.len(), 1);
    }

    #[test]
    fn test_related_excludes_self() {
        let mut node = DomainNode::new("a.test", 0);
        node.add_related(&["A.test".into(), "mx.a.test.".into()]);
        assert_eq!(node.related.len(), 1);
        assert!(node.related.contains("mx.a.test"));
    }

    #[test]
    fn test_display_detail_line() {
        let mut node = DomainNode::new("a.test", 1);
        node.add_status("http", DomainStatus::Good);
        assert_eq!(node.to_string(), "a.test 1 http:GOOD");
    }
}
