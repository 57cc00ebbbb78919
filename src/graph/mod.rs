// Thread-safe bipartite store of domain nodes and certificate nodes
//
// The graph is the sole point of synchronization between workers: one
// read/write lock guards both maps, and every mutating operation goes
// through a method here.

mod cert_node;
mod domain_node;

pub use cert_node::{is_cdn_cert, CertNode};
pub use domain_node::DomainNode;

use crate::fingerprint::Fingerprint;
use crate::host;
use crate::status::StatusMap;
use publicsuffix::List;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct GraphInner {
    domains: HashMap<String, DomainNode>,
    certs: HashMap<Fingerprint, CertNode>,
}

/// Deduplicating bipartite graph of domains and certificates.
pub struct CertGraph {
    inner: RwLock<GraphInner>,
    psl: Arc<List>,
}

impl CertGraph {
    pub fn new(psl: Arc<List>) -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
            psl,
        }
    }

    /// Look up a domain node by normalized hostname.
    pub fn get_domain(&self, domain: &str) -> Option<DomainNode> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.domains.get(&host::normalize(domain)).cloned()
    }

    /// Insert a domain node if absent. Returns whether the node was inserted.
    ///
    /// A re-encounter never replaces the existing node; it only lowers the
    /// stored depth when the new sighting is shallower, and marks the node
    /// as a root if any sighting was a seed.
    pub fn add_domain(&self, node: DomainNode) -> bool {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        match inner.domains.get_mut(&node.domain) {
            Some(existing) => {
                if node.depth < existing.depth {
                    existing.depth = node.depth;
                }
                existing.root |= node.root;
                false
            }
            None => {
                inner.domains.insert(node.domain.clone(), node);
                true
            }
        }
    }

    pub fn get_cert(&self, fingerprint: &Fingerprint) -> Option<CertNode> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.certs.get(fingerprint).cloned()
    }

    /// Insert a certificate node, or merge `found` into the existing one.
    pub fn add_cert(&self, node: CertNode) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        match inner.certs.get_mut(&node.fingerprint) {
            Some(existing) => {
                for source in &node.found {
                    existing.found.insert(source.clone());
                }
            }
            None => {
                inner.certs.insert(node.fingerprint, node);
            }
        }
    }

    /// Record that `source` reported the certificate identified by `fp`.
    pub fn add_cert_found(&self, fp: &Fingerprint, source: &str) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        if let Some(cert) = inner.certs.get_mut(fp) {
            cert.add_found(source);
        }
    }

    /// Merge a source's host-keyed status map into the graph. The entry for
    /// `domain` always lands on that node; entries for other hostnames are
    /// applied only where a node already exists.
    pub fn add_status_map(&self, domain: &str, source: &str, statuses: &StatusMap) {
        let domain = host::normalize(domain);
        let mut inner = self.inner.write().expect("graph lock poisoned");
        for (target, status) in statuses {
            let target = host::normalize(target);
            if target == domain {
                if let Some(node) = inner.domains.get_mut(&domain) {
                    node.add_status(source, *status);
                }
            } else if let Some(node) = inner.domains.get_mut(&target) {
                node.add_status(source, *status);
            }
        }
    }

    pub fn add_related(&self, domain: &str, hosts: &[String]) {
        if hosts.is_empty() {
            return;
        }
        let mut inner = self.inner.write().expect("graph lock poisoned");
        if let Some(node) = inner.domains.get_mut(&host::normalize(domain)) {
            node.add_related(hosts);
        }
    }

    /// Link `domain` to the certificate `fp` under `source`.
    pub fn add_cert_fingerprint(&self, domain: &str, source: &str, fp: Fingerprint) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        if let Some(node) = inner.domains.get_mut(&host::normalize(domain)) {
            node.add_cert_fingerprint(source, fp);
        }
    }

    /// Hostnames reachable from `domain` through its certificates.
    ///
    /// Certificates flagged as CDN-issued are skipped unless `allow_cdn`;
    /// certificates naming more than `max_sans` distinct registrable parents
    /// are skipped unless `max_sans` is zero. Wildcard names collapse to
    /// their bare parent. The result is sorted, deduplicated, and excludes
    /// `domain` itself.
    pub fn get_domain_neighbors(
        &self,
        domain: &str,
        allow_cdn: bool,
        max_sans: usize,
    ) -> Vec<String> {
        let domain = host::normalize(domain);
        let inner = self.inner.read().expect("graph lock poisoned");

        let Some(node) = inner.domains.get(&domain) else {
            return Vec::new();
        };

        let fingerprints: BTreeSet<Fingerprint> =
            node.certs.values().flatten().copied().collect();

        let mut neighbors = BTreeSet::new();
        for fp in fingerprints {
            let Some(cert) = inner.certs.get(&fp) else {
                continue;
            };
            if cert.cdn && !allow_cdn {
                continue;
            }
            if max_sans > 0
                && host::registrable_parent_count(&self.psl, cert.domains.iter()) > max_sans
            {
                continue;
            }
            for name in &cert.domains {
                let neighbor = host::canonicalize_san(name);
                if !neighbor.is_empty() && neighbor != domain {
                    neighbors.insert(neighbor);
                }
            }
        }
        neighbors.into_iter().collect()
    }

    pub fn num_domains(&self) -> usize {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.domains.len()
    }

    /// Largest BFS depth present in the graph.
    pub fn domain_depth(&self) -> u32 {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.domains.values().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Stable-ordered dump of the graph for serialization: domains sorted by
    /// name, certificates sorted by fingerprint.
    pub fn generate_map(&self) -> crate::output::GraphDump {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut domains: Vec<DomainNode> = inner.domains.values().cloned().collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        let mut certificates: Vec<CertNode> = inner.certs.values().cloned().collect();
        certificates.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        crate::output::GraphDump {
            domains,
            certificates,
        }
    }
}
