// cleaners.rs: single-purpose value transforms composed by field pipelines
use memchr::memchr;
use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::error::FormatError;
use crate::value::Cleaned;

fn text(v: Cleaned) -> Result<String, FormatError> {
    match v {
        Cleaned::Text(s) => Ok(s),
        other => Err(FormatError::NotText(other.kind())),
    }
}

/// Strict dotted-quad check: four octets, 1-3 digits each, value <= 255.
pub fn is_ipv4(s: &str) -> bool {
    let mut octets = 0usize;
    for part in s.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if part.parse::<u16>().map_or(true, |n| n > 255) {
            return false;
        }
    }
    octets == 4
}

pub fn validate_ipv4(v: Cleaned) -> Result<Cleaned, FormatError> {
    let s = text(v)?;
    if is_ipv4(&s) {
        Ok(Cleaned::Text(s))
    } else {
        Err(FormatError::InvalidIpv4(s))
    }
}

pub fn coerce_int(v: Cleaned) -> Result<Cleaned, FormatError> {
    match v {
        Cleaned::Text(s) if s.is_empty() => Ok(Cleaned::Null),
        Cleaned::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Cleaned::Int)
            .map_err(|_| FormatError::NotAnInteger(s)),
        Cleaned::Int(n) => Ok(Cleaned::Int(n)),
        // in range, so the cast only truncates toward zero
        Cleaned::Float(f) if f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(Cleaned::Int(f.trunc() as i64)),
        Cleaned::Float(f) => Err(FormatError::NotAnInteger(f.to_string())),
        Cleaned::Null => Ok(Cleaned::Null),
        other => Err(FormatError::NotText(other.kind())),
    }
}

pub fn coerce_float(v: Cleaned) -> Result<Cleaned, FormatError> {
    let f = match v {
        Cleaned::Text(s) if s.is_empty() => return Ok(Cleaned::Null),
        Cleaned::Text(s) => s.trim().parse::<f64>().map_err(|_| FormatError::NotANumber(s))?,
        Cleaned::Int(n) => n as f64,
        Cleaned::Float(f) => f,
        Cleaned::Null => return Ok(Cleaned::Null),
        other => return Err(FormatError::NotText(other.kind())),
    };
    if f.is_finite() {
        Ok(Cleaned::Float(f))
    } else {
        Ok(Cleaned::Null)
    }
}

/// Maps the `undefined` sentinel (any case) to null; everything else passes.
pub fn null_sentinel(v: Cleaned) -> Cleaned {
    match v {
        Cleaned::Text(s) if s.eq_ignore_ascii_case("undefined") => Cleaned::Null,
        other => other,
    }
}

pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() => {
                out.push_str(&format!("\\u{{{:x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

pub fn escape(v: Cleaned) -> Result<Cleaned, FormatError> {
    Ok(Cleaned::Text(escape_str(&text(v)?)))
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

pub fn flatten_lines(v: Cleaned) -> Result<Cleaned, FormatError> {
    let s = text(v)?;
    if !s.chars().any(is_line_break) {
        return Ok(Cleaned::Text(s));
    }
    Ok(Cleaned::Text(s.chars().filter(|c| !is_line_break(*c)).collect()))
}

/// One pass of `%XX` decoding followed by lossy UTF-8 repair.
/// `+` is left alone.
pub fn percent_decode_once(s: &str) -> String {
    if memchr(b'%', s.as_bytes()).is_none() {
        return s.to_string();
    }
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

pub fn url_decode(v: Cleaned) -> Result<Cleaned, FormatError> {
    Ok(Cleaned::Text(percent_decode_once(&text(v)?)))
}

pub fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn limit_length(v: Cleaned, limit: usize) -> Result<Cleaned, FormatError> {
    let s = text(v)?;
    Ok(Cleaned::Text(truncate_chars(&s, limit).to_string()))
}

pub fn match_regex(v: Cleaned, re: &Regex) -> Result<Cleaned, FormatError> {
    let s = text(v)?;
    if re.is_match(&s) {
        Ok(Cleaned::Text(s))
    } else {
        Err(FormatError::PatternMismatch { value: s, pattern: re.as_str().to_string() })
    }
}

pub fn lowercase(v: Cleaned) -> Result<Cleaned, FormatError> {
    Ok(Cleaned::Text(text(v)?.to_lowercase()))
}
