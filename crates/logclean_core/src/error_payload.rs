// error_payload.rs: split combined `code<sep>message` error columns
use crate::pipeline::{Pipeline, Step};
use crate::value::ErrorRecord;

/// Separators tried in order; the first one present wins.
const SEPARATORS: [&str; 3] = [",", "%2C", "_"];

pub fn error_prefix() -> Pipeline {
    Pipeline::new(vec![Step::recursive(Step::UrlDecode), Step::Escape])
}

/// Parse an already-prefixed error value. `error_type` names the column the
/// value came from (e.g. `upstream_error`).
pub fn parse_error_payload(value: &str, error_type: &str) -> ErrorRecord {
    let mut record = ErrorRecord { name: error_type.to_string(), code: None, msg: None };

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(code) = value.parse::<i64>() {
            record.code = Some(code);
            return record;
        }
    }

    let split = SEPARATORS.iter().find_map(|sep| value.split_once(*sep));
    match split.and_then(|(code, msg)| code.trim().parse::<i64>().ok().map(|c| (c, msg))) {
        Some((code, msg)) => {
            record.code = Some(code);
            record.msg = Some(msg.to_string());
        }
        None => record.msg = Some(value.to_string()),
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Cleaned;

    fn rec(name: &str, code: Option<i64>, msg: Option<&str>) -> ErrorRecord {
        ErrorRecord { name: name.into(), code, msg: msg.map(str::to_string) }
    }

    #[test]
    fn test_numeric_code_only() {
        assert_eq!(parse_error_payload("404", "http"), rec("http", Some(404), None));
    }

    #[test]
    fn test_separator_priority() {
        assert_eq!(
            parse_error_payload("500,internal fail", "upstream_error"),
            rec("upstream_error", Some(500), Some("internal fail"))
        );
        assert_eq!(parse_error_payload("502%2Cbad gateway", "e"), rec("e", Some(502), Some("bad gateway")));
        assert_eq!(parse_error_payload("503_busy_now", "e"), rec("e", Some(503), Some("busy_now")));
        // comma wins over underscore even when the comma split is not numeric
        assert_eq!(parse_error_payload("a_1,b", "e"), rec("e", None, Some("a_1,b")));
    }

    #[test]
    fn test_unparseable_falls_back_to_message() {
        assert_eq!(parse_error_payload("garbage", "e"), rec("e", None, Some("garbage")));
        assert_eq!(parse_error_payload("", "e"), rec("e", None, Some("")));
        assert_eq!(
            parse_error_payload("99999999999999999999", "e"),
            rec("e", None, Some("99999999999999999999"))
        );
    }

    #[test]
    fn test_prefix_decodes_before_split() {
        let v = error_prefix().run(Cleaned::Text("500%252Cinternal%20fail".into())).unwrap();
        assert_eq!(v, Cleaned::Text("500,internal fail".into()));
    }
}
