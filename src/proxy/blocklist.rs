//! Host blocklist matching
//!
//! A host is blocked when it equals a pattern or is a sub-domain of one
//! (`ads.example.com` blocks `x.ads.example.com`). Matching is
//! case-insensitive, ignores a `:port` suffix and a trailing root dot. A
//! pattern never matches a host that merely ends with the same characters
//! (`bad.com` does not block `notbad.com`).

use crate::common::strip_port;

/// Check whether `host` is covered by any of `patterns`
///
/// Empty or whitespace-only patterns are ignored.
pub fn is_blocked(host: &str, patterns: &[String]) -> bool {
    let host = strip_port(host.trim()).trim_end_matches('.');
    if host.is_empty() {
        return false;
    }

    patterns
        .iter()
        .map(|pattern| pattern.trim().trim_end_matches('.'))
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| matches_pattern(host, pattern))
}

fn matches_pattern(host: &str, pattern: &str) -> bool {
    let (host, pattern) = (host.as_bytes(), pattern.as_bytes());
    if host.len() < pattern.len() {
        return false;
    }

    let suffix_start = host.len() - pattern.len();
    host[suffix_start..].eq_ignore_ascii_case(pattern)
        && (suffix_start == 0 || host[suffix_start - 1] == b'.')
}
