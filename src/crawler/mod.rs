// Breadth-first traversal engine
//
// Workers are both producers and consumers: visiting a domain enqueues its
// neighbors. The input queue is unbounded and concurrency is capped by a
// semaphore of `parallel` permits instead, so a worker never deadlocks on
// its own fan-out. A pending counter (enqueued minus finished) detects
// quiescence: it is incremented before every enqueue and decremented on
// every exit path, and the crawl is over exactly when it reaches zero.

use crate::dns;
use crate::graph::{CertGraph, CertNode, DomainNode};
use crate::host;
use crate::source::CertSource;
use publicsuffix::List;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

/// Capacity of the output queue feeding the sink.
const OUTPUT_QUEUE_DEPTH: usize = 5;

/// Policy knobs for one traversal.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum BFS depth.
    pub max_depth: u32,
    /// Worker permit pool size; bounds concurrent queries.
    pub parallel: usize,
    /// Expand through certificates flagged as CDN-issued.
    pub allow_cdn: bool,
    /// Skip certificates naming more than this many distinct registrable
    /// parents; zero disables the cap.
    pub san_cap: usize,
    /// Also enqueue each neighbor's registrable parent.
    pub tld_plus_one: bool,
    /// Probe NS records for visited domains in the sink.
    pub check_ns: bool,
    /// Emit the detailed per-domain line instead of the bare hostname.
    pub details: bool,
    /// JSON mode: suppress per-node stdout output.
    pub json: bool,
    /// Per-operation timeout.
    pub timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            parallel: 10,
            allow_cdn: false,
            san_cap: 80,
            tld_plus_one: false,
            check_ns: false,
            details: false,
            json: false,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Quiescence detector: every node ever enqueued minus every node finished.
struct Pending {
    count: AtomicUsize,
    notify: Notify,
}

impl Pending {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    fn value(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.value() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Handle workers use to enqueue successors. The counter is bumped before
/// the node enters the channel so quiescence can never be observed early.
#[derive(Clone)]
struct Frontier {
    pending: Arc<Pending>,
    tx: mpsc::UnboundedSender<DomainNode>,
}

impl Frontier {
    fn push(&self, node: DomainNode) {
        self.pending.add();
        if self.tx.send(node).is_err() {
            self.pending.done();
        }
    }
}

/// Bounded-concurrency BFS over the certificate graph.
pub struct Crawler {
    graph: Arc<CertGraph>,
    source: Arc<dyn CertSource>,
    psl: Arc<List>,
    opts: CrawlOptions,
    permits: Arc<Semaphore>,
    pending: Arc<Pending>,
}

impl Crawler {
    pub fn new(
        graph: Arc<CertGraph>,
        source: Arc<dyn CertSource>,
        psl: Arc<List>,
        opts: CrawlOptions,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(opts.parallel.max(1)));
        Self {
            graph,
            source,
            psl,
            opts,
            permits,
            pending: Arc::new(Pending::new()),
        }
    }

    /// Outstanding node count; zero once a crawl has fully terminated.
    pub fn pending_count(&self) -> usize {
        self.pending.value()
    }

    /// Crawl outward from the seed hostnames until the frontier drains.
    pub async fn run(&self, seeds: &[String]) {
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let frontier = Frontier {
            pending: self.pending.clone(),
            tx: in_tx,
        };

        let sink = tokio::spawn(sink_loop(out_rx, self.opts.clone(), self.psl.clone()));

        for seed in seeds {
            let seed = host::normalize_seed(seed);
            if seed.is_empty() {
                continue;
            }
            frontier.push(DomainNode::root(&seed));
        }

        loop {
            tokio::select! {
                _ = self.pending.idle() => break,
                node = in_rx.recv() => {
                    let Some(node) = node else { break };
                    self.dispatch(node, &frontier, &out_tx);
                }
            }
        }

        drop(frontier);
        drop(out_tx);
        if let Err(e) = sink.await {
            debug!(error = %e, "sink task failed");
        }
    }

    /// Depth check and the deduplication point. A node that survives both
    /// gets a worker task.
    fn dispatch(&self, node: DomainNode, frontier: &Frontier, out_tx: &mpsc::Sender<DomainNode>) {
        if node.depth > self.opts.max_depth {
            debug!(domain = %node.domain, depth = node.depth, "max depth reached, skipping");
            self.pending.done();
            return;
        }

        if !self.graph.add_domain(node.clone()) {
            self.pending.done();
            return;
        }

        let worker = Worker {
            graph: self.graph.clone(),
            source: self.source.clone(),
            psl: self.psl.clone(),
            opts: self.opts.clone(),
            frontier: frontier.clone(),
            out_tx: out_tx.clone(),
            permits: self.permits.clone(),
            pending: self.pending.clone(),
        };
        tokio::spawn(async move { worker.visit(node).await });
    }
}

struct Worker {
    graph: Arc<CertGraph>,
    source: Arc<dyn CertSource>,
    psl: Arc<List>,
    opts: CrawlOptions,
    frontier: Frontier,
    out_tx: mpsc::Sender<DomainNode>,
    permits: Arc<Semaphore>,
    pending: Arc<Pending>,
}

impl Worker {
    async fn visit(self, node: DomainNode) {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.pending.done();
                return;
            }
        };

        debug!(depth = node.depth, domain = %node.domain, "visiting");

        let queried = self.query_source(&node).await;
        if queried {
            for neighbor in
                self.graph
                    .get_domain_neighbors(&node.domain, self.opts.allow_cdn, self.opts.san_cap)
            {
                self.frontier.push(DomainNode::new(&neighbor, node.depth + 1));
                if self.opts.tld_plus_one {
                    if let Some(parent) = host::registrable_parent(&self.psl, &neighbor) {
                        self.frontier.push(DomainNode::new(&parent, node.depth + 1));
                    }
                }
            }
        }

        if let Some(snapshot) = self.graph.get_domain(&node.domain) {
            let _ = self.out_tx.send(snapshot).await;
        }

        drop(permit);
        self.pending.done();
    }

    /// Run the source query and fold everything it learned into the graph.
    /// Returns whether the query succeeded; failures are absorbed here.
    async fn query_source(&self, node: &DomainNode) -> bool {
        let results = match self.source.query(&node.domain).await {
            Ok(results) => results,
            Err(e) => {
                debug!(domain = %node.domain, error = %e, "query failed");
                return false;
            }
        };

        self.graph
            .add_status_map(&node.domain, self.source.name(), &results.status());

        let related = results.related();
        if !related.is_empty() {
            self.graph.add_related(&node.domain, &related);
            for related_host in &related {
                self.frontier
                    .push(DomainNode::new(related_host, node.depth + 1));
            }
        }

        // Fingerprints keyed by other hostnames are picked up when those
        // domains are themselves visited.
        let mut fingerprint_map = results.fingerprints();
        if let Some(fps) = fingerprint_map.remove(&node.domain) {
            for fp in fps {
                if self.graph.get_cert(&fp).is_none() {
                    match results.query_cert(&fp).await {
                        Ok(details) => self.graph.add_cert(CertNode::new(
                            details.fingerprint,
                            details.domains,
                            details.cdn,
                        )),
                        Err(e) => {
                            debug!(fingerprint = %fp, error = %e, "certificate fetch failed");
                            continue;
                        }
                    }
                }
                self.graph.add_cert_found(&fp, self.source.name());
                self.graph
                    .add_cert_fingerprint(&node.domain, self.source.name(), fp);
            }
        }

        true
    }
}

/// Single consumer of the output queue. Runs until the queue is closed and
/// drained, keeping stdout interleaving deterministic.
async fn sink_loop(mut rx: mpsc::Receiver<DomainNode>, opts: CrawlOptions, psl: Arc<List>) {
    while let Some(node) = rx.recv().await {
        if opts.json {
            if opts.details {
                eprintln!("{}", node);
            }
            continue;
        }

        if opts.details {
            println!("{}", node);
        } else {
            println!("{}", node.domain);
        }

        if opts.check_ns {
            let target = host::registrable_parent(&psl, &node.domain)
                .unwrap_or_else(|| node.domain.clone());
            match dns::has_nameservers(&target, opts.timeout).await {
                Ok(true) => {}
                Ok(false) => println!("Missing NS: {}", node.domain),
                Err(e) => debug!(domain = %node.domain, error = %e, "NS check failed"),
            }
        }
    }
}
