// Certificate sources - the pluggable backends the crawler queries
//
// A source answers "which certificates reference this hostname" either by
// talking to the host itself (http, smtp) or by asking a certificate
// transparency aggregator (crtsh, google).

mod crtsh;
mod google;
mod http;
mod smtp;
mod tls;

pub use crtsh::CrtShSource;
pub use google::GoogleCtSource;
pub use http::HttpSource;
pub use smtp::SmtpSource;

use crate::error::GraphError;
use crate::fingerprint::Fingerprint;
use crate::status::StatusMap;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Names accepted by the `driver` flag, in the order they are documented.
pub const DRIVERS: &[&str] = &["http", "smtp", "crtsh", "google"];

/// Details of a single certificate as reported by a source.
#[derive(Debug, Clone)]
pub struct CertResult {
    pub fingerprint: Fingerprint,
    /// Deduplicated lowercase names from the CN and SAN list.
    pub domains: Vec<String>,
    pub cdn: bool,
}

/// The answer to a single hostname query.
#[async_trait]
pub trait QueryResult: Send + Sync {
    /// Hostname to status observations made during the query. Always carries
    /// an entry for the queried host.
    fn status(&self) -> StatusMap;

    /// Hostnames the source wants injected into the frontier that are not
    /// SANs of any certificate (e.g. MX exchanges).
    fn related(&self) -> Vec<String>;

    /// Hostname to the fingerprints seen for it. The queried host is always
    /// a key; some sources report other hostnames as well.
    fn fingerprints(&self) -> HashMap<String, Vec<Fingerprint>>;

    /// Full details for one fingerprint. May cost a second network
    /// round-trip depending on the backend.
    async fn query_cert(&self, fp: &Fingerprint) -> Result<CertResult>;
}

/// A backend that maps hostnames to certificates.
#[async_trait]
pub trait CertSource: Send + Sync {
    /// Short identifier used in status maps and `found` sets.
    fn name(&self) -> &'static str;

    /// Query one hostname. Network failures against the host itself are
    /// folded into the result's status map; an `Err` means the query could
    /// not be made at all.
    async fn query(&self, host: &str) -> Result<Box<dyn QueryResult>>;
}

/// Construction parameters shared by every source.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub timeout: Duration,
    pub save_dir: Option<PathBuf>,
    pub ct_subdomains: bool,
    pub ct_expired: bool,
}

/// Build the source selected by `name`.
pub fn source_for_name(name: &str, opts: &SourceOptions) -> Result<Arc<dyn CertSource>> {
    match name {
        "http" => Ok(Arc::new(HttpSource::new(opts))),
        "smtp" => Ok(Arc::new(SmtpSource::new(opts))),
        "crtsh" => Ok(Arc::new(CrtShSource::new(opts))),
        "google" => Ok(Arc::new(GoogleCtSource::new(opts))),
        other => Err(GraphError::ConfigError {
            message: format!("unknown driver name: {} (expected one of {})", other, DRIVERS.join(", ")),
        }),
    }
}

/// Persist a DER certificate as `<dir>/<FINGERPRINT>.pem`.
///
/// Writes go through a temp file and a rename so concurrent workers never
/// observe a partial file; an already-present file is left untouched.
pub fn save_certificate(dir: &Path, fp: &Fingerprint, der: &[u8]) -> Result<()> {
    let final_path = dir.join(format!("{}.pem", fp.hex()));
    if final_path.exists() {
        return Ok(());
    }

    let encoded = pem::encode(&pem::Pem::new("CERTIFICATE", der.to_vec()));
    let tmp_path = dir.join(format!(".{}.pem.tmp", fp.hex()));
    std::fs::write(&tmp_path, encoded)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Best-effort persistence used from query paths, where a full disk is not a
/// reason to abort a crawl.
pub(crate) fn save_certificate_logged(dir: &Path, fp: &Fingerprint, der: &[u8]) {
    if let Err(e) = save_certificate(dir, fp, der) {
        debug!(fingerprint = %fp, error = %e, "failed to save certificate");
    }
}

/// A self-contained query answer for sources that learn everything they will
/// ever know during the initial query.
pub(crate) struct PrefetchedResult {
    pub status: StatusMap,
    pub related: Vec<String>,
    pub fingerprints: HashMap<String, Vec<Fingerprint>>,
    pub certs: HashMap<Fingerprint, CertResult>,
}

#[async_trait]
impl QueryResult for PrefetchedResult {
    fn status(&self) -> StatusMap {
        self.status.clone()
    }

    fn related(&self) -> Vec<String> {
        self.related.clone()
    }

    fn fingerprints(&self) -> HashMap<String, Vec<Fingerprint>> {
        self.fingerprints.clone()
    }

    async fn query_cert(&self, fp: &Fingerprint) -> Result<CertResult> {
        self.certs
            .get(fp)
            .cloned()
            .ok_or_else(|| GraphError::CertNotFound {
                fingerprint: fp.hex(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_driver_rejected() {
        let err = source_for_name("gopher", &SourceOptions::default()).err().unwrap();
        assert!(err.to_string().contains("gopher"));
    }

    #[test]
    fn test_all_documented_drivers_construct() {
        let opts = SourceOptions {
            timeout: Duration::from_secs(1),
            ..Default::default()
        };
        for name in DRIVERS {
            let source = source_for_name(name, &opts).unwrap();
            assert_eq!(&source.name(), name);
        }
    }

    #[test]
    fn test_save_certificate_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fp = Fingerprint::from_der(b"saved cert");
        save_certificate(dir.path(), &fp, b"saved cert").unwrap();

        let path = dir.path().join(format!("{}.pem", fp.hex()));
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.starts_with("-----BEGIN CERTIFICATE-----"));

        save_certificate(dir.path(), &fp, b"different bytes").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }
}
