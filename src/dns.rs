// DNS helpers - resolution, MX discovery, NS registration probe

use crate::error::GraphError;
use crate::Result;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;

fn resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
}

/// Resolve a hostname to its IP addresses.
pub async fn resolve_ips(hostname: &str, limit: Duration) -> Result<Vec<IpAddr>> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let lookup = timeout(limit, resolver().lookup_ip(hostname))
        .await
        .map_err(|_| GraphError::Timeout { duration: limit })?
        .map_err(|e| GraphError::DnsResolutionFailed {
            hostname: hostname.to_string(),
            details: e.to_string(),
        })?;

    let ips: Vec<IpAddr> = lookup.iter().collect();
    if ips.is_empty() {
        return Err(GraphError::DnsResolutionFailed {
            hostname: hostname.to_string(),
            details: "no addresses found".to_string(),
        });
    }
    Ok(ips)
}

/// Look up the MX exchange hostnames for a domain, sorted by preference.
pub async fn mx_hosts(domain: &str, limit: Duration) -> Result<Vec<String>> {
    let lookup = timeout(limit, resolver().mx_lookup(domain))
        .await
        .map_err(|_| GraphError::Timeout { duration: limit })?;

    let lookup = match lookup {
        Ok(l) => l,
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(GraphError::DnsResolutionFailed {
                hostname: domain.to_string(),
                details: e.to_string(),
            });
        }
    };

    let mut records: Vec<(u16, String)> = lookup
        .iter()
        .map(|mx| {
            let host = mx.exchange().to_utf8();
            (mx.preference(), crate::host::normalize(&host))
        })
        .filter(|(_, host)| !host.is_empty())
        .collect();
    records.sort();

    let mut seen = std::collections::HashSet::new();
    Ok(records
        .into_iter()
        .filter(|(_, host)| seen.insert(host.clone()))
        .map(|(_, host)| host)
        .collect())
}

/// Whether a domain has NS records, i.e. appears to be registered.
///
/// NXDOMAIN and empty answers both report `false`; other resolver failures
/// are errors so the caller can tell "unregistered" from "lookup broke".
pub async fn has_nameservers(domain: &str, limit: Duration) -> Result<bool> {
    let lookup = timeout(limit, resolver().ns_lookup(domain))
        .await
        .map_err(|_| GraphError::Timeout { duration: limit })?;

    match lookup {
        Ok(l) => Ok(l.iter().next().is_some()),
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(false),
        Err(e) => Err(GraphError::DnsResolutionFailed {
            hostname: domain.to_string(),
            details: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literal_skips_lookup() {
        let ips = resolve_ips("192.0.2.7", Duration::from_secs(1)).await.unwrap();
        assert_eq!(ips, vec!["192.0.2.7".parse::<IpAddr>().unwrap()]);
    }
}
