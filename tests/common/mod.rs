// Deterministic in-memory certificate source for traversal tests
#![allow(dead_code)]

use async_trait::async_trait;
use certgraph::error::GraphError;
use certgraph::fingerprint::Fingerprint;
use certgraph::source::{CertResult, CertSource, QueryResult};
use certgraph::status::{DomainStatus, StatusMap};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SOURCE_NAME: &str = "mock";

/// Deterministic fingerprint for a test certificate label.
pub fn fp(label: &str) -> Fingerprint {
    Fingerprint::from_der(label.as_bytes())
}

#[derive(Debug, Clone, Default)]
struct MockReply {
    certs: Vec<(Fingerprint, Vec<String>)>,
    related: Vec<String>,
}

/// A scripted source: every hostname maps to a fixed reply, and every query
/// is counted so tests can assert each domain is visited at most once.
#[derive(Default)]
pub struct MockSource {
    replies: HashMap<String, MockReply>,
    failures: HashSet<String>,
    queries: AtomicUsize,
    queried_hosts: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `host` to answer with certificate `label` naming `sans`.
    pub fn add_cert(mut self, host: &str, label: &str, sans: &[&str]) -> Self {
        let reply = self.replies.entry(host.to_string()).or_default();
        reply
            .certs
            .push((fp(label), sans.iter().map(|s| s.to_string()).collect()));
        self
    }

    /// Script `host` to report `hosts` as related (non-SAN) hostnames.
    pub fn add_related(mut self, host: &str, hosts: &[&str]) -> Self {
        let reply = self.replies.entry(host.to_string()).or_default();
        reply.related.extend(hosts.iter().map(|s| s.to_string()));
        self
    }

    /// Script `host` so the whole query errors out.
    pub fn add_failure(mut self, host: &str) -> Self {
        self.failures.insert(host.to_string());
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn queried_hosts(&self) -> Vec<String> {
        self.queried_hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertSource for MockSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn query(&self, host: &str) -> certgraph::Result<Box<dyn QueryResult>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.queried_hosts.lock().unwrap().push(host.to_string());

        if self.failures.contains(host) {
            return Err(GraphError::Other(format!("scripted failure for {}", host)));
        }

        let reply = self.replies.get(host).cloned().unwrap_or_default();

        let mut status = StatusMap::new();
        let observed = if reply.certs.is_empty() {
            DomainStatus::NoHost
        } else {
            DomainStatus::Good
        };
        status.insert(host.to_string(), observed);

        let mut fingerprints = HashMap::new();
        fingerprints.insert(
            host.to_string(),
            reply.certs.iter().map(|(fp, _)| *fp).collect(),
        );

        let certs = reply
            .certs
            .iter()
            .map(|(fp, sans)| {
                (
                    *fp,
                    CertResult {
                        fingerprint: *fp,
                        domains: sans.clone(),
                        cdn: false,
                    },
                )
            })
            .collect();

        Ok(Box::new(MockResult {
            status,
            related: reply.related,
            fingerprints,
            certs,
        }))
    }
}

struct MockResult {
    status: StatusMap,
    related: Vec<String>,
    fingerprints: HashMap<String, Vec<Fingerprint>>,
    certs: HashMap<Fingerprint, CertResult>,
}

#[async_trait]
impl QueryResult for MockResult {
    fn status(&self) -> StatusMap {
        self.status.clone()
    }

    fn related(&self) -> Vec<String> {
        self.related.clone()
    }

    fn fingerprints(&self) -> HashMap<String, Vec<Fingerprint>> {
        self.fingerprints.clone()
    }

    async fn query_cert(&self, fp: &Fingerprint) -> certgraph::Result<CertResult> {
        self.certs
            .get(fp)
            .cloned()
            .ok_or_else(|| GraphError::CertNotFound {
                fingerprint: fp.hex(),
            })
    }
}
