//! Pure functions over URLs: depth accounting, normalization, and
//! include/exclude matching (spec §4.4).
//!
//! Kept dependency-free of the rest of the engine on purpose — these are the
//! functions spec §8's round-trip properties are phrased against, so they
//! need to be trivially unit-testable in isolation.

use regex::Regex;
use url::Url;

/// Number of non-empty path segments in `url`.
///
/// `urlDepth("https://h/a/b/c") == 3`.
#[must_use]
pub fn url_depth(url: &str) -> u32 {
    let Ok(parsed) = Url::parse(url) else {
        return 0;
    };
    parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count() as u32)
        .unwrap_or(0)
}

/// `adjustedMaxDepth(seed, configured) == urlDepth(seed) + configured`.
#[must_use]
pub fn adjusted_max_depth(seed: &str, configured: u32) -> u32 {
    url_depth(seed) + configured
}

/// Strip fragment, lowercase host, drop trailing slash (except root), and
/// collapse a leading `www.` so `//www.host/` and `//host/` compare equal.
///
/// The canonical (non-normalized) URL is what gets fetched; `normalize` only
/// produces the comparison key used for the lock set.
#[must_use]
pub fn normalize(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    parsed.set_fragment(None);

    let host = parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    let scheme = parsed.scheme();
    let port = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    let query = parsed
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    format!("{scheme}://{host}{port}{path}{query}")
}

/// Host of `url`, with a leading `www.` collapsed, for external-link gating.
#[must_use]
pub fn comparable_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Path component of `url`, the surface include/exclude regexes are applied
/// to (spec §3: "regex sets are applied to the URL's path component only").
#[must_use]
pub fn path_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

/// True if `path` passes the include/exclude policy (spec §4.2 steps 4-5):
/// rejected if any exclude matches; if includes is non-empty, accepted only
/// when at least one include matches.
#[must_use]
pub fn matches_include_exclude(path: &str, includes: &[Regex], excludes: &[Regex]) -> bool {
    if excludes.iter().any(|re| re.is_match(path)) {
        return false;
    }
    if includes.is_empty() {
        return true;
    }
    includes.iter().any(|re| re.is_match(path))
}

/// `originUrl` is absolute `http(s)` (spec §4.1 validation).
#[must_use]
pub fn is_valid_seed_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_depth_counts_segments() {
        assert_eq!(url_depth("https://h/a/b/c"), 3);
        assert_eq!(url_depth("https://h/"), 0);
        assert_eq!(url_depth("https://h"), 0);
    }

    #[test]
    fn adjusted_max_depth_adds_seed_depth() {
        assert_eq!(adjusted_max_depth("https://h/a/b", 2), 4);
    }

    #[test]
    fn normalize_is_idempotent() {
        let u = "https://WWW.Example.com/a/b/?x=1#frag";
        let once = normalize(u);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_collapses_www_for_comparison() {
        assert_eq!(normalize("https://www.example.com/a"), normalize("https://example.com/a"));
    }

    #[test]
    fn normalize_preserves_root_slash() {
        assert_eq!(normalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn include_exclude_semantics() {
        let includes = vec![Regex::new("^/docs").unwrap()];
        let excludes = vec![Regex::new("/private").unwrap()];
        assert!(matches_include_exclude("/docs/a", &includes, &excludes));
        assert!(!matches_include_exclude("/docs/private/x", &includes, &excludes));
        assert!(!matches_include_exclude("/blog/a", &includes, &excludes));
    }

    #[test]
    fn no_includes_accepts_everything_not_excluded() {
        let excludes = vec![Regex::new("/private").unwrap()];
        assert!(matches_include_exclude("/blog/a", &[], &excludes));
        assert!(!matches_include_exclude("/private/x", &[], &excludes));
    }
}
