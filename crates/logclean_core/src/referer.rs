// referer.rs: structured breakdown of referer URLs (plain, nested `dl`, with file)
use crate::error::FormatError;
use crate::pipeline::{Pipeline, Step};
use crate::urlsplit::{colten, hostname, parse_query, site, split_url};
use crate::value::{Cleaned, NestedReferer, RefererFileInfo, RefererInfo};

pub const REFERER_LENGTH_LIMIT: usize = 1024;

/// Query parameter that carries an embedded referer.
pub const NESTED_REFERER_PARAM: &str = "dl";

/// Steps every referer variant runs before URL parsing.
pub fn referer_prefix() -> Pipeline {
    Pipeline::new(vec![
        Step::recursive(Step::UrlDecode),
        Step::Escape,
        Step::Limit(REFERER_LENGTH_LIMIT),
    ])
}

struct UrlParts {
    scheme: String,
    host: String,
    path: String,
    query: String,
}

fn url_parts(value: &str) -> UrlParts {
    let owned: String;
    let mut u = split_url(value);
    if u.scheme.is_empty() {
        // bare hosts like `example.com/x` only yield a netloc behind a scheme
        owned = format!("undef://{}", value);
        u = split_url(&owned);
    }
    UrlParts {
        host: hostname(u.netloc),
        path: u.path.to_string(),
        query: u.query.to_string(),
        scheme: u.scheme,
    }
}

/// Parse an already-prefixed referer string.
pub fn parse_referer(value: &str) -> RefererInfo {
    let parts = url_parts(value);
    RefererInfo {
        colten: colten(&parts.host),
        site: site(&parts.host),
        query: parse_query(&parts.query),
        netloc: parts.host,
        path: parts.path,
        scheme: parts.scheme,
    }
}

/// The plain referer field: prefix steps, then [`parse_referer`].
pub fn clean_referer(raw: Cleaned) -> Result<Cleaned, FormatError> {
    match referer_prefix().run(raw)? {
        Cleaned::Null => Ok(Cleaned::Null),
        Cleaned::Text(s) => Ok(Cleaned::Referer(parse_referer(&s))),
        other => Err(FormatError::NotText(other.kind())),
    }
}

/// Base fields plus `ref`: the first `dl` query value run through the plain
/// referer field. A referer without a query still yields its base fields.
pub fn parse_nested_referer(value: &str) -> Result<NestedReferer, FormatError> {
    let base = parse_referer(value);
    let nested = match base.query.get(NESTED_REFERER_PARAM).and_then(|v| v.first()) {
        Some(dl) => match clean_referer(Cleaned::Text(dl.clone()))? {
            Cleaned::Referer(info) => Some(info),
            _ => None,
        },
        None => None,
    };
    Ok(NestedReferer { base, nested })
}

/// `(dirname, filename, fileext)` of a URL path. Basenames of two characters
/// or fewer are never split into name and extension.
pub fn split_path(path: &str) -> (String, String, String) {
    if path.chars().count() <= 1 {
        return (String::new(), String::new(), String::new());
    }
    let cut = path.rfind('/').map_or(0, |i| i + 1);
    let (head, base) = path.split_at(cut);
    let dirname = if !head.is_empty() && !head.bytes().all(|b| b == b'/') {
        head.trim_end_matches('/')
    } else {
        head
    };
    if base.chars().count() <= 2 {
        return (dirname.to_string(), base.to_string(), String::new());
    }
    // a dot preceded only by dots (".htaccess") does not start an extension
    match base.rfind('.') {
        Some(dot) if base[..dot].bytes().any(|b| b != b'.') => {
            (dirname.to_string(), base[..dot].to_string(), base[dot..].to_string())
        }
        _ => (dirname.to_string(), base.to_string(), String::new()),
    }
}

pub fn parse_referer_with_file(value: &str) -> RefererFileInfo {
    let parts = url_parts(value);
    let (dirname, filename, fileext) = split_path(&parts.path);
    RefererFileInfo {
        colten: colten(&parts.host),
        site: site(&parts.host),
        query: parse_query(&parts.query),
        netloc: parts.host,
        scheme: parts.scheme,
        dirname,
        filename,
        fileext,
    }
}
