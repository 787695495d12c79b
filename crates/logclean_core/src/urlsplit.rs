// urlsplit.rs: lenient URL splitting and query-string parsing for log referers
//
// Log referers are frequently not valid URLs (bare hosts, truncated values,
// junk), so this never rejects input: every string splits into five parts.
use percent_encoding::percent_decode_str;

use crate::value::QueryMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitUrl<'a> {
    pub scheme: String,
    pub netloc: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub fragment: &'a str,
}

fn is_scheme_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

/// Split `scheme://netloc/path?query#fragment`. A leading `word:` only counts
/// as a scheme when what follows the colon is not a bare port number.
pub fn split_url(url: &str) -> SplitUrl<'_> {
    let mut rest = url;
    let mut scheme = String::new();
    if let Some(colon) = url.find(':') {
        let candidate = &url[..colon];
        let after = &url[colon + 1..];
        let starts_alpha = candidate.as_bytes().first().map_or(false, |b| b.is_ascii_alphabetic());
        let port_like = !after.is_empty() && after.bytes().all(|b| b.is_ascii_digit());
        if starts_alpha && candidate.bytes().all(is_scheme_char) && !port_like {
            scheme = candidate.to_ascii_lowercase();
            rest = after;
        }
    }

    let mut netloc = "";
    if let Some(after_slashes) = rest.strip_prefix("//") {
        let end = after_slashes.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(after_slashes.len());
        netloc = &after_slashes[..end];
        rest = &after_slashes[end..];
    }

    let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    SplitUrl { scheme, netloc, path, query, fragment }
}

/// Hostname part of a netloc: userinfo and port dropped, lowercased.
pub fn hostname(netloc: &str) -> String {
    let host = netloc.rsplit_once('@').map_or(netloc, |(_, h)| h);
    if let (Some(open), Some(close)) = (host.find('['), host.find(']')) {
        if open < close {
            return host[open + 1..close].to_lowercase();
        }
    }
    host.split(':').next().unwrap_or("").to_lowercase()
}

fn unquote_plus(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse `a=1&b=2;a=3` into `{a: [1, 3], b: [2]}`. Pairs without `=` and
/// pairs with an empty value are dropped.
pub fn parse_query(query: &str) -> QueryMap {
    let mut out = QueryMap::new();
    for pair in query.split(|c: char| c == '&' || c == ';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        out.entry(unquote_plus(name)).or_default().push(unquote_plus(value));
    }
    out
}

/// `a.b.com` -> `com.b.a`
pub fn colten(host: &str) -> String {
    host.rsplit('.').collect::<Vec<_>>().join(".")
}

/// Last two labels of the host: `sub.example.com` -> `example.com`.
pub fn site(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_full_url() {
        let u = split_url("HTTP://user:pw@Sub.Example.com:8080/p/a?x=1&y=2#frag");
        assert_eq!(u.scheme, "http");
        assert_eq!(u.netloc, "user:pw@Sub.Example.com:8080");
        assert_eq!(u.path, "/p/a");
        assert_eq!(u.query, "x=1&y=2");
        assert_eq!(u.fragment, "frag");
        assert_eq!(hostname(u.netloc), "sub.example.com");
    }

    #[test]
    fn test_split_without_scheme() {
        let u = split_url("example.com/page?q=1");
        assert_eq!(u.scheme, "");
        assert_eq!(u.netloc, "");
        assert_eq!(u.path, "example.com/page");
        assert_eq!(u.query, "q=1");

        // host:port is not a scheme
        let u = split_url("example.com:8080");
        assert_eq!(u.scheme, "");
        assert_eq!(u.path, "example.com:8080");

        let u = split_url("undef://example.com:8080");
        assert_eq!(u.scheme, "undef");
        assert_eq!(hostname(u.netloc), "example.com");
    }

    #[test]
    fn test_hostname_edge_cases() {
        assert_eq!(hostname(""), "");
        assert_eq!(hostname("[::1]:443"), "::1");
        assert_eq!(hostname("a@b@host"), "host");
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query("a=1&b=x+y;a=%32&flag&empty=");
        assert_eq!(q.get("a").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(q.get("b").unwrap(), &vec!["x y".to_string()]);
        assert!(!q.contains_key("flag"));
        assert!(!q.contains_key("empty"));
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_colten_and_site() {
        assert_eq!(colten("a.b.com"), "com.b.a");
        assert_eq!(colten(""), "");
        assert_eq!(site("sub.example.com"), "example.com");
        assert_eq!(site("localhost"), "localhost");
        assert_eq!(site(""), "");
    }
}
