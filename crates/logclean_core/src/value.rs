// value.rs: raw and cleaned value model handed to / returned from field pipelines
use serde::Serialize;
use std::collections::BTreeMap;

/// A value flowing through a field pipeline. Raw input is usually `Text`;
/// timestamp-like columns may arrive already numeric.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Cleaned {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Referer(RefererInfo),
    NestedReferer(NestedReferer),
    RefererFile(RefererFileInfo),
    Error(ErrorRecord),
    City(CityInfo),
    Area(AreaInfo),
}

impl Cleaned {
    pub fn is_null(&self) -> bool {
        matches!(self, Cleaned::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cleaned::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Cleaned::Null => "null",
            Cleaned::Int(_) => "int",
            Cleaned::Float(_) => "float",
            Cleaned::Text(_) => "text",
            Cleaned::Referer(_) | Cleaned::NestedReferer(_) | Cleaned::RefererFile(_) => "referer",
            Cleaned::Error(_) => "error",
            Cleaned::City(_) | Cleaned::Area(_) => "geo",
        }
    }
}

impl From<&str> for Cleaned {
    fn from(s: &str) -> Self {
        Cleaned::Text(s.to_string())
    }
}

impl From<String> for Cleaned {
    fn from(s: String) -> Self {
        Cleaned::Text(s)
    }
}

impl From<i64> for Cleaned {
    fn from(v: i64) -> Self {
        Cleaned::Int(v)
    }
}

impl From<f64> for Cleaned {
    fn from(v: f64) -> Self {
        Cleaned::Float(v)
    }
}

impl<T: Into<Cleaned>> From<Option<T>> for Cleaned {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cleaned::Null)
    }
}

pub type QueryMap = BTreeMap<String, Vec<String>>;

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct RefererInfo {
    pub scheme: String,
    pub netloc: String,
    pub colten: String,
    pub path: String,
    pub query: QueryMap,
    pub site: String,
}

/// Referer carrying a second referer embedded in its `dl` query parameter.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct NestedReferer {
    #[serde(flatten)]
    pub base: RefererInfo,
    #[serde(rename = "ref")]
    pub nested: Option<RefererInfo>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct RefererFileInfo {
    pub scheme: String,
    pub netloc: String,
    pub colten: String,
    pub dirname: String,
    pub filename: String,
    pub fileext: String,
    pub query: QueryMap,
    pub site: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CityInfo {
    pub id: Option<u32>,
    pub title: Option<String>,
    pub title_ru: Option<String>,
}

/// Region (first subdivision) or country projection.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AreaInfo {
    pub id: Option<u32>,
    pub iso_code: Option<String>,
    pub title: Option<String>,
    pub title_ru: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_shapes() {
        assert_eq!(serde_json::to_string(&Cleaned::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Cleaned::Int(7)).unwrap(), "7");

        let err = Cleaned::Error(ErrorRecord { name: "http".into(), code: Some(404), msg: None });
        assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"name":"http","code":404}"#);

        let nested = Cleaned::NestedReferer(NestedReferer {
            base: RefererInfo { scheme: "http".into(), ..Default::default() },
            nested: None,
        });
        let v = serde_json::to_value(&nested).unwrap();
        assert_eq!(v["scheme"], "http");
        assert!(v.get("ref").unwrap().is_null());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Cleaned::from(None::<&str>), Cleaned::Null);
        assert_eq!(Cleaned::from(Some("x")), Cleaned::Text("x".into()));
    }
}
