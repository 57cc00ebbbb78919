// Hostname normalization and registrable-parent helpers

use publicsuffix::{List, Psl};
use url::Url;

/// Normalize a hostname: lowercase, surrounding whitespace and the trailing
/// dot stripped.
pub fn normalize(host: &str) -> String {
    host.trim().trim_end_matches('.').to_lowercase()
}

/// Parse a user-supplied seed into a bare hostname.
///
/// URLs yield their host component; anything that does not parse as a URL
/// with a host is kept as-is after normalization.
pub fn normalize_seed(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('.');
    let host = if trimmed.contains("://") {
        Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    };
    host.to_lowercase()
}

/// Canonicalize a certificate name for use as a graph neighbor.
///
/// Wildcard names collapse to their bare parent: `*.example.com` becomes
/// `example.com`, which a source can actually query.
pub fn canonicalize_san(name: &str) -> String {
    let name = normalize(name);
    match name.strip_prefix("*.") {
        Some(parent) => parent.to_string(),
        None => name,
    }
}

/// Registrable parent (TLD+1) of a hostname: one label below the matched
/// public suffix. `None` when the public suffix list has no answer.
pub fn registrable_parent(list: &List, host: &str) -> Option<String> {
    let host = normalize(host);
    let domain = list.domain(host.as_bytes())?;
    let parent = String::from_utf8_lossy(domain.as_bytes()).into_owned();
    if parent.is_empty() {
        None
    } else {
        Some(parent)
    }
}

/// Count the distinct registrable parents among a certificate's names.
///
/// Names with no public-suffix answer count as themselves, so an unknown
/// suffix still contributes to the total.
pub fn registrable_parent_count<'a, I>(list: &List, names: I) -> usize
where
    I: IntoIterator<Item = &'a String>,
{
    let mut parents = std::collections::BTreeSet::new();
    for name in names {
        let name = canonicalize_san(name);
        if name.is_empty() {
            continue;
        }
        let parent = registrable_parent(list, &name).unwrap_or(name);
        parents.insert(parent);
    }
    parents.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_trailing_dot() {
        assert_eq!(normalize("A.Test."), "a.test");
        assert_eq!(normalize("  b.test "), "b.test");
    }

    #[test]
    fn test_seed_plain_hostname() {
        assert_eq!(normalize_seed("Example.COM"), "example.com");
    }

    #[test]
    fn test_seed_trailing_dot() {
        assert_eq!(normalize_seed("a.test."), "a.test");
    }

    #[test]
    fn test_seed_url_with_port_and_path() {
        assert_eq!(normalize_seed("https://a.test:443/path"), "a.test");
    }

    #[test]
    fn test_seed_unparseable_url_falls_back() {
        assert_eq!(normalize_seed("://nonsense"), "://nonsense");
    }

    #[test]
    fn test_wildcard_canonicalization() {
        assert_eq!(canonicalize_san("*.Example.com"), "example.com");
        assert_eq!(canonicalize_san("www.example.com."), "www.example.com");
    }

    #[test]
    fn test_parent_count_collapses_wildcards() {
        let list = List::new();
        // The .test TLD has no public-suffix entry, so each name falls back
        // to itself; the wildcard collapses onto a.test.
        let names = vec![
            "a.test".to_string(),
            "b.a.test".to_string(),
            "*.a.test".to_string(),
        ];
        assert_eq!(registrable_parent_count(&list, names.iter()), 2);
    }
}
