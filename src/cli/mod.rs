// CLI module - command line interface and argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "certgraph")]
#[command(version)]
#[command(about = "Discover domain relationships by crawling the TLS certificate graph", long_about = None)]
pub struct Args {
    /// Host domains to crawl from
    #[arg(value_name = "HOST")]
    pub hosts: Vec<String>,

    /// TCP and per-operation timeout in seconds
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    pub timeout: u64,

    /// Verbose diagnostic logging to stderr
    #[arg(long)]
    pub verbose: bool,

    /// Certificate source to query [http, smtp, crtsh, google]
    #[arg(long, default_value = "http", value_name = "NAME")]
    pub driver: String,

    /// Include sub-domains in certificate transparency searches
    #[arg(long = "ct-subdomains")]
    pub ct_subdomains: bool,

    /// Include expired certificates in certificate transparency searches
    #[arg(long = "ct-expired")]
    pub ct_expired: bool,

    /// Maximum number of distinct registrable parents per certificate for
    /// neighbor expansion; 0 removes the cap
    #[arg(long, default_value_t = 80, value_name = "N")]
    pub sanscap: usize,

    /// Expand through certificates issued to CDNs
    #[arg(long)]
    pub cdn: bool,

    /// Check NS records to determine whether discovered domains are registered
    #[arg(long)]
    pub ns: bool,

    /// For every domain found, also crawl the domain's registrable parent
    #[arg(long)]
    pub tldplus1: bool,

    /// Maximum BFS depth
    #[arg(long, default_value_t = 5, value_name = "N")]
    pub depth: u32,

    /// Number of parallel workers
    #[arg(long, default_value_t = 10, value_name = "N")]
    pub parallel: usize,

    /// Print details about each crawled domain
    #[arg(long)]
    pub details: bool,

    /// Print the final graph as JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Directory to save PEM-encoded certificates into
    #[arg(long, value_name = "DIR")]
    pub save: Option<PathBuf>,
}
