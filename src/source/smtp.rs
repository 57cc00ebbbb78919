// Direct SMTP source - STARTTLS against host:25, plus MX discovery

use super::tls;
use super::{CertResult, CertSource, PrefetchedResult, QueryResult, SourceOptions};
use crate::dns;
use crate::error::GraphError;
use crate::graph::is_cdn_cert;
use crate::host;
use crate::status::{DomainStatus, StatusMap};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const SMTP_PORT: u16 = 25;
const EHLO_NAME: &str = "certgraph.invalid";

/// Queries a host over SMTP: connect to port 25, negotiate STARTTLS, read
/// the peer chain. The domain's MX exchanges are reported as related hosts.
pub struct SmtpSource {
    timeout: Duration,
    save_dir: Option<PathBuf>,
}

impl SmtpSource {
    pub fn new(opts: &SourceOptions) -> Self {
        Self {
            timeout: opts.timeout,
            save_dir: opts.save_dir.clone(),
        }
    }

    async fn fetch_leaf(&self, host: &str) -> Result<tls::ChainCert> {
        let mut stream = tls::dial(host, SMTP_PORT, self.timeout).await?;
        timeout(self.timeout, negotiate_starttls(&mut stream))
            .await
            .map_err(|_| GraphError::Timeout {
                duration: self.timeout,
            })??;
        let mut chain = tls::handshake_chain(stream, host, self.timeout).await?;
        Ok(chain.remove(0))
    }
}

#[async_trait]
impl CertSource for SmtpSource {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn query(&self, host: &str) -> Result<Box<dyn QueryResult>> {
        let host = host::normalize(host);

        let related = match dns::mx_hosts(&host, self.timeout).await {
            Ok(hosts) => hosts,
            Err(e) => {
                debug!(domain = %host, error = %e, "MX lookup failed");
                Vec::new()
            }
        };

        let mut status = StatusMap::new();
        let mut fingerprints = HashMap::new();
        let mut certs = HashMap::new();

        match self.fetch_leaf(&host).await {
            Ok(leaf) => {
                let observed = if leaf.expired {
                    DomainStatus::Expired
                } else {
                    DomainStatus::Good
                };
                status.insert(host.clone(), observed);

                if let Some(dir) = &self.save_dir {
                    super::save_certificate_logged(dir, &leaf.fingerprint, &leaf.der);
                }

                fingerprints.insert(host.clone(), vec![leaf.fingerprint]);
                certs.insert(
                    leaf.fingerprint,
                    CertResult {
                        fingerprint: leaf.fingerprint,
                        cdn: is_cdn_cert(leaf.domains.iter()),
                        domains: leaf.domains,
                    },
                );
            }
            Err(e) => {
                debug!(domain = %host, error = %e, "smtp probe failed");
                status.insert(host.clone(), DomainStatus::from_error(&e));
                fingerprints.insert(host.clone(), Vec::new());
            }
        }

        Ok(Box::new(PrefetchedResult {
            status,
            related,
            fingerprints,
            certs,
        }))
    }
}

/// Drive the SMTP dialogue up to the point where TLS can start.
async fn negotiate_starttls(stream: &mut TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream);

    let (code, _line) = read_response(&mut reader).await?;
    if code != 220 {
        return Err(starttls_error(format!(
            "greeting failed: expected 220, got {}",
            code
        )));
    }

    let ehlo = format!("EHLO {}\r\n", EHLO_NAME);
    reader.get_mut().write_all(ehlo.as_bytes()).await?;
    reader.get_mut().flush().await?;

    // EHLO responses are multi-line: 250-... continues, 250 ... ends.
    let mut starttls_supported = false;
    loop {
        let (code, line) = read_response(&mut reader).await?;
        if code != 250 {
            return Err(starttls_error(format!(
                "EHLO failed: expected 250, got {}",
                code
            )));
        }
        if line.to_uppercase().contains("STARTTLS") {
            starttls_supported = true;
        }
        if line.as_bytes().get(3) == Some(&b' ') {
            break;
        }
    }

    if !starttls_supported {
        return Err(starttls_error("server does not support STARTTLS".into()));
    }

    reader.get_mut().write_all(b"STARTTLS\r\n").await?;
    reader.get_mut().flush().await?;

    let (code, _line) = read_response(&mut reader).await?;
    if code != 220 {
        return Err(starttls_error(format!(
            "STARTTLS failed: expected 220, got {}",
            code
        )));
    }

    Ok(())
}

async fn read_response<S>(reader: &mut BufReader<&mut S>) -> Result<(u16, String)>
where
    S: AsyncRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    parse_response_line(&line)
}

fn parse_response_line(line: &str) -> Result<(u16, String)> {
    let code: u16 = line
        .get(0..3)
        .and_then(|prefix| prefix.parse().ok())
        .ok_or_else(|| starttls_error(format!("invalid status code in {:?}", line)))?;
    Ok((code, line.to_string()))
}

fn starttls_error(details: String) -> GraphError {
    GraphError::StarttlsError { details }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_line() {
        let (code, line) = parse_response_line("250-mail.example.com\r\n").unwrap();
        assert_eq!(code, 250);
        assert!(line.starts_with("250-"));
    }

    #[test]
    fn test_parse_response_rejects_short_line() {
        assert!(parse_response_line("25").is_err());
        assert!(parse_response_line("abc ok").is_err());
    }

    #[test]
    fn test_continuation_detection() {
        let (_, line) = parse_response_line("250 STARTTLS\r\n").unwrap();
        assert_eq!(&line[3..4], " ");
        let (_, line) = parse_response_line("250-SIZE 52428800\r\n").unwrap();
        assert_eq!(&line[3..4], "-");
    }
}
