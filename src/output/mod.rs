// Final graph emission - JSON shapes and scan metadata

use crate::cli::Args;
use crate::graph::{CertNode, DomainNode};
use serde::{Deserialize, Serialize};

/// Stable-ordered view of the graph, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDump {
    pub domains: Vec<DomainNode>,
    pub certificates: Vec<CertNode>,
}

/// Top-level JSON document: metadata alongside the graph payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub certgraph: Metadata,
    pub domains: Vec<DomainNode>,
    pub certificates: Vec<CertNode>,
}

impl Report {
    pub fn new(metadata: Metadata, dump: GraphDump) -> Self {
        Self {
            certgraph: metadata,
            domains: dump.domains,
            certificates: dump.certificates,
        }
    }
}

/// Scan provenance carried in the JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    pub website: String,
    pub scan_date: String,
    pub command: String,
    pub options: MetadataOptions,
}

/// Effective option values echoed into the JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataOptions {
    pub parallel: usize,
    pub driver: String,
    pub ct_subdomains: bool,
    pub ct_expired: bool,
    pub sanscap: usize,
    pub cdn: bool,
    pub timeout: u64,
    pub depth: u32,
}

impl Metadata {
    pub fn collect(args: &Args) -> Self {
        let command: Vec<String> = std::env::args().collect();
        Self {
            version: format!("certgraph {}", env!("CARGO_PKG_VERSION")),
            website: concat!("https://crates.io/crates/", env!("CARGO_PKG_NAME")).to_string(),
            scan_date: chrono::Utc::now().to_rfc3339(),
            command: command.join(" "),
            options: MetadataOptions {
                parallel: args.parallel,
                driver: args.driver.clone(),
                ct_subdomains: args.ct_subdomains,
                ct_expired: args.ct_expired,
                sanscap: args.sanscap,
                cdn: args.cdn,
                timeout: args.timeout,
                depth: args.depth,
            },
        }
    }
}
