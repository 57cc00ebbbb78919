// certgraph - crawl the graph induced by TLS certificates

use anyhow::{bail, Context, Result};
use certgraph::crawler::{CrawlOptions, Crawler};
use certgraph::graph::CertGraph;
use certgraph::output::{Metadata, Report};
use certgraph::source::{source_for_name, SourceOptions};
use certgraph::{host, Args};
use clap::Parser;
use publicsuffix::List;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args = Args::parse();

    // Diagnostics go to stderr so stdout stays a clean data stream.
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(if args.verbose { Level::DEBUG } else { Level::WARN });
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");

    if args.hosts.is_empty() {
        bail!("no host domains supplied; usage: certgraph [OPTIONS] HOST...");
    }
    if args.parallel < 1 {
        bail!("must use a positive number of parallel workers");
    }

    let timeout = Duration::from_secs(args.timeout);
    let psl = Arc::new(List::new());

    let mut seeds = Vec::new();
    for raw in &args.hosts {
        let seed = host::normalize_seed(raw);
        if seed.is_empty() {
            continue;
        }
        if args.tldplus1 {
            if let Some(parent) = host::registrable_parent(&psl, &seed) {
                seeds.push(parent);
            }
        }
        seeds.push(seed);
    }
    if seeds.is_empty() {
        bail!("no usable host domains after normalization");
    }

    if let Some(dir) = &args.save {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create save directory {}", dir.display()))?;
    }

    let source = source_for_name(
        &args.driver,
        &SourceOptions {
            timeout,
            save_dir: args.save.clone(),
            ct_subdomains: args.ct_subdomains,
            ct_expired: args.ct_expired,
        },
    )?;

    let graph = Arc::new(CertGraph::new(psl.clone()));
    let options = CrawlOptions {
        max_depth: args.depth,
        parallel: args.parallel,
        allow_cdn: args.cdn,
        san_cap: args.sanscap,
        tld_plus_one: args.tldplus1,
        check_ns: args.ns,
        details: args.details,
        json: args.json,
        timeout,
    };

    let crawler = Crawler::new(graph.clone(), source, psl, options);
    crawler.run(&seeds).await;

    if args.json {
        let report = Report::new(Metadata::collect(&args), graph.generate_map());
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    debug!("Found {} domains", graph.num_domains());
    debug!("Graph Depth: {}", graph.domain_depth());

    Ok(())
}
