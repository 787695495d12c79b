// fields.rs: concrete field types = step list + leaf parser
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FormatError;
use crate::error_payload::{error_prefix, parse_error_payload};
use crate::geo::{empty_projection, GeoEnricher, GeoProjection};
use crate::pipeline::{Pipeline, Step};
use crate::referer::{parse_nested_referer, parse_referer, parse_referer_with_file, referer_prefix};
use crate::value::Cleaned;

pub const USER_AGENT_LENGTH_LIMIT: usize = 1024;

/// 8-4-4-4-12 hex digits, hyphens optional, any case.
pub const GUID_PATTERN: &str = r"(?i)^[0-9a-f]{8}-?(?:[0-9a-f]{4}-?){3}[0-9a-f]{12}$";

static GUID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(GUID_PATTERN).expect("GUID pattern compiles"));

/// Names accepted by [`FieldSpec::builtin`] and in column schemas.
pub const BUILTIN_FIELD_TYPES: &[&str] = &[
    "guid",
    "float",
    "char",
    "timestamp",
    "user_agent",
    "int",
    "nullable_int",
    "ipv4",
    "referer",
    "referer_nesting",
    "referer_with_file",
    "error",
    "geo_city",
    "geo_region",
    "geo_country",
    "geo_isp",
    "geo_asn",
    "geo_connection_type",
];

/// What happens to the pipeline output once every step has run.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// The pipeline output is the cleaned value.
    Value,
    Referer,
    NestedReferer,
    RefererWithFile,
    /// Error payload labelled with the given error type.
    Error(String),
    Geo(GeoProjection),
}

/// A named, reusable cleaning definition. Immutable once built; share it
/// freely between workers.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    pipeline: Pipeline,
    leaf: Leaf,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, steps: Vec<Step>, leaf: Leaf) -> Self {
        Self { name: name.into(), pipeline: Pipeline::new(steps), leaf }
    }

    fn with_pipeline(name: &str, pipeline: Pipeline, leaf: Leaf) -> Self {
        Self { name: name.to_string(), pipeline, leaf }
    }

    pub fn log_guid() -> Self {
        Self::new("guid", vec![Step::Nullable, Step::Regex(GUID_RE.clone()), Step::Lower], Leaf::Value)
    }

    pub fn log_float() -> Self {
        Self::new("float", vec![Step::Nullable, Step::Float], Leaf::Value)
    }

    pub fn log_char() -> Self {
        Self::new("char", vec![Step::Nullable, Step::recursive(Step::UrlDecode)], Leaf::Value)
    }

    /// Accepts float or integer text (or numbers) and yields whole seconds.
    pub fn timestamp() -> Self {
        Self::new("timestamp", vec![Step::Float, Step::Int], Leaf::Value)
    }

    pub fn user_agent() -> Self {
        Self::new(
            "user_agent",
            vec![Step::UrlDecode, Step::Escape, Step::Limit(USER_AGENT_LENGTH_LIMIT)],
            Leaf::Value,
        )
    }

    pub fn int() -> Self {
        Self::new("int", vec![Step::Int], Leaf::Value)
    }

    pub fn nullable_int() -> Self {
        Self::new("nullable_int", vec![Step::Nullable, Step::Int], Leaf::Value)
    }

    pub fn ipv4() -> Self {
        Self::new("ipv4", vec![Step::Ipv4], Leaf::Value)
    }

    pub fn referer() -> Self {
        Self::with_pipeline("referer", referer_prefix(), Leaf::Referer)
    }

    pub fn referer_nesting() -> Self {
        Self::with_pipeline("referer_nesting", referer_prefix(), Leaf::NestedReferer)
    }

    pub fn referer_with_file() -> Self {
        Self::with_pipeline("referer_with_file", referer_prefix(), Leaf::RefererWithFile)
    }

    pub fn error(error_type: impl Into<String>) -> Self {
        Self::with_pipeline("error", error_prefix(), Leaf::Error(error_type.into()))
    }

    pub fn geo(projection: GeoProjection) -> Self {
        Self::new(projection.as_str(), vec![Step::Ipv4], Leaf::Geo(projection))
    }

    /// Look up a built-in field type by name. `error_type` labels `error`
    /// fields and is ignored otherwise.
    pub fn builtin(name: &str, error_type: Option<&str>) -> Option<Self> {
        let spec = match name {
            "guid" => Self::log_guid(),
            "float" => Self::log_float(),
            "char" => Self::log_char(),
            "timestamp" => Self::timestamp(),
            "user_agent" => Self::user_agent(),
            "int" => Self::int(),
            "nullable_int" => Self::nullable_int(),
            "ipv4" => Self::ipv4(),
            "referer" => Self::referer(),
            "referer_nesting" => Self::referer_nesting(),
            "referer_with_file" => Self::referer_with_file(),
            "error" => Self::error(error_type.unwrap_or("error")),
            "geo_city" => Self::geo(GeoProjection::City),
            "geo_region" => Self::geo(GeoProjection::Region),
            "geo_country" => Self::geo(GeoProjection::Country),
            "geo_isp" => Self::geo(GeoProjection::Isp),
            "geo_asn" => Self::geo(GeoProjection::Asn),
            "geo_connection_type" => Self::geo(GeoProjection::ConnectionType),
            _ => return None,
        };
        Some(spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        self.pipeline.steps()
    }

    pub fn leaf(&self) -> &Leaf {
        &self.leaf
    }

    pub fn is_geo(&self) -> bool {
        matches!(self.leaf, Leaf::Geo(_))
    }

    /// Clean without geo databases; geo fields degrade to their empty value.
    pub fn clean(&self, raw: impl Into<Cleaned>) -> Result<Cleaned, FormatError> {
        self.clean_with(raw, None)
    }

    pub fn clean_with(&self, raw: impl Into<Cleaned>, geo: Option<&mut GeoEnricher>) -> Result<Cleaned, FormatError> {
        let v = self.pipeline.run(raw.into())?;
        if self.leaf == Leaf::Value || v.is_null() {
            return Ok(v);
        }
        let Cleaned::Text(s) = v else {
            return Err(FormatError::NotText(v.kind()));
        };
        Ok(match &self.leaf {
            Leaf::Value => Cleaned::Text(s),
            Leaf::Referer => Cleaned::Referer(parse_referer(&s)),
            Leaf::NestedReferer => Cleaned::NestedReferer(parse_nested_referer(&s)?),
            Leaf::RefererWithFile => Cleaned::RefererFile(parse_referer_with_file(&s)),
            Leaf::Error(error_type) => Cleaned::Error(parse_error_payload(&s, error_type)),
            Leaf::Geo(projection) => match geo {
                Some(enricher) => enricher.project(&s, *projection),
                None => empty_projection(*projection),
            },
        })
    }
}
