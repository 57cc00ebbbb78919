//! certgraph discovers domain relationships by following the graph induced
//! by TLS certificates: starting from seed hostnames, it obtains the
//! certificates referencing each host, treats every name those certificates
//! carry as a new node, and continues breadth-first to a depth bound. The
//! output is a bipartite graph linking domains to the certificates that
//! name them.

pub mod cli;
pub mod crawler;
pub mod dns;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod host;
pub mod output;
pub mod source;
pub mod status;

pub use crate::cli::Args;
pub use crate::crawler::{CrawlOptions, Crawler};
pub use crate::error::GraphError;
pub use crate::fingerprint::Fingerprint;
pub use crate::graph::CertGraph;

/// Result type for certgraph operations
pub type Result<T> = std::result::Result<T, GraphError>;
