//! Small helpers shared by the crawl core and the CLI

use url::Url;

/// Shorten `s` to at most `max_len` bytes for log lines, marking the cut with "..."
///
/// The cut always lands on a char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    const ELLIPSIS: &str = "...";
    let mut end = max_len.saturating_sub(ELLIPSIS.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], ELLIPSIS)
}

/// Lower-cased host of `url`, if it parses and has one
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Whether `host` is `domain` itself or one of its subdomains
///
/// `domain` may carry a leading dot; an empty domain matches every host.
pub fn in_domain(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.').as_bytes();
    let host = host.as_bytes();
    if domain.is_empty() || host.eq_ignore_ascii_case(domain) {
        return true;
    }
    let Some(dot) = host.len().checked_sub(domain.len() + 1) else {
        return false;
    };
    host[dot] == b'.' && host[dot + 1..].eq_ignore_ascii_case(domain)
}
