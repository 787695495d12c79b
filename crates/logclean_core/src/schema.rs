// schema.rs: column -> field type schema, custom field types, loader and cache
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::info;

use crate::error::SchemaError;
use crate::fields::{FieldSpec, Leaf};
use crate::pipeline::Step;

#[derive(Deserialize)]
pub struct SchemaRoot {
    #[serde(rename = "log2db", default)]
    pub log2db: Log2DbSchema,
}

#[derive(Deserialize, Default)]
pub struct Log2DbSchema {
    /// Custom field types declared as step lists; these shadow built-ins.
    #[serde(default)]
    pub field_types: HashMap<String, Vec<StepDef>>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnDef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum ColumnDef {
    Type(String),
    Obj {
        #[serde(rename = "type")]
        field_type: String,
        /// Raw column to read; defaults to the column's own name.
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        error_type: Option<String>,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum StepDef {
    Name(String),
    Limit { limit: usize },
    Regex { regex: String },
}

impl StepDef {
    pub fn to_step(&self) -> Result<Step, SchemaError> {
        let step = match self {
            StepDef::Name(name) => match name.as_str() {
                "nullable" => Step::Nullable,
                "ipv4" => Step::Ipv4,
                "int" => Step::Int,
                "float" => Step::Float,
                "escaped" => Step::Escape,
                "multiline" => Step::MultiLine,
                "urldecode" => Step::UrlDecode,
                "recursive_urldecode" => Step::recursive(Step::UrlDecode),
                "lower" => Step::Lower,
                "guid" => Step::Regex(Regex::new(crate::fields::GUID_PATTERN).map_err(|source| {
                    SchemaError::InvalidRegex { pattern: crate::fields::GUID_PATTERN.to_string(), source }
                })?),
                other => return Err(SchemaError::InvalidStep(other.to_string())),
            },
            StepDef::Limit { limit } => Step::Limit(*limit),
            StepDef::Regex { regex } => Step::Regex(
                Regex::new(regex).map_err(|source| SchemaError::InvalidRegex { pattern: regex.clone(), source })?,
            ),
        };
        Ok(step)
    }
}

pub(crate) fn sanitize_identifier(name: &str) -> String {
    let mut s = name.trim().to_lowercase();
    s = s.replace(' ', "_").replace('/', "_").replace('-', "_");
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' { out.push(ch); } else { out.push('_'); }
    }
    let starts_ok = out.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok {
        out.insert(0, '_');
    }
    out
}

/// One output column: where its raw value comes from and how it is cleaned.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub column: String,
    pub source: String,
    pub field: FieldSpec,
}

#[derive(Debug)]
pub struct LoadedSchema {
    pub path: String,
    pub mtime: Option<SystemTime>,
    pub columns: Vec<ColumnSpec>,
}

impl LoadedSchema {
    pub fn has_geo_columns(&self) -> bool {
        self.columns.iter().any(|c| c.field.is_geo())
    }
}

pub static SCHEMA_CACHE: Lazy<RwLock<Option<Arc<LoadedSchema>>>> = Lazy::new(|| RwLock::new(None));

fn resolve_field(
    column: &str,
    field_type: &str,
    error_type: Option<&str>,
    custom: &HashMap<String, Vec<StepDef>>,
) -> Result<FieldSpec, SchemaError> {
    if let Some(defs) = custom.get(field_type) {
        let steps = defs.iter().map(StepDef::to_step).collect::<Result<Vec<_>, _>>()?;
        return Ok(FieldSpec::new(field_type, steps, Leaf::Value));
    }
    // error columns are labelled with their own name unless told otherwise
    FieldSpec::builtin(field_type, Some(error_type.unwrap_or(column))).ok_or_else(|| SchemaError::UnknownFieldType {
        column: column.to_string(),
        field_type: field_type.to_string(),
    })
}

fn build_columns(root: SchemaRoot) -> Result<Vec<ColumnSpec>, SchemaError> {
    let Log2DbSchema { field_types, columns } = root.log2db;
    let mut out: Vec<ColumnSpec> = Vec::with_capacity(columns.len());
    for (name, def) in columns.into_iter() {
        let (field_type, source, error_type) = match def {
            ColumnDef::Type(t) => (t, None, None),
            ColumnDef::Obj { field_type, source, error_type } => (field_type, source, error_type),
        };
        let field = resolve_field(&name, &field_type, error_type.as_deref(), &field_types)?;
        out.push(ColumnSpec {
            column: sanitize_identifier(&name),
            source: source.unwrap_or_else(|| name.clone()),
            field,
        });
    }
    Ok(out)
}

fn read_mtime(path: &Path) -> Option<SystemTime> { fs::metadata(path).ok().and_then(|m| m.modified().ok()) }

pub fn schema_from_json(json: &str) -> Result<Vec<ColumnSpec>, SchemaError> {
    let root: SchemaRoot = serde_json::from_str(json)?;
    build_columns(root)
}

pub fn load_schema_internal(schema_path: &str) -> Result<LoadedSchema, SchemaError> {
    let data = fs::read_to_string(schema_path)
        .map_err(|source| SchemaError::Io { path: schema_path.to_string(), source })?;
    let columns = schema_from_json(&data)?;
    let mtime = read_mtime(Path::new(schema_path));
    info!(path = schema_path, columns = columns.len(), "loaded column schema");
    Ok(LoadedSchema { path: schema_path.to_string(), mtime, columns })
}

/// Load `schema_path` into [`SCHEMA_CACHE`] unless the cached copy is the same
/// file with the same mtime. Returns the current schema.
pub fn ensure_schema_loaded(schema_path: &str) -> Result<Arc<LoadedSchema>, SchemaError> {
    let mut guard = SCHEMA_CACHE.write().unwrap_or_else(|e| e.into_inner());
    if let Some(ls) = guard.as_ref() {
        if ls.path == schema_path && read_mtime(Path::new(schema_path)) == ls.mtime {
            return Ok(ls.clone());
        }
    }
    let loaded = Arc::new(load_schema_internal(schema_path)?);
    *guard = Some(loaded.clone());
    Ok(loaded)
}

pub fn cached_schema() -> Option<Arc<LoadedSchema>> {
    SCHEMA_CACHE.read().unwrap_or_else(|e| e.into_inner()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoProjection;
    use crate::value::Cleaned;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Remote Addr"), "remote_addr");
        assert_eq!(sanitize_identifier("http-referer"), "http_referer");
        assert_eq!(sanitize_identifier("9bad"), "_9bad");
        assert_eq!(sanitize_identifier(""), "_");
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{
          "log2db": {
            "field_types": {
              "message": ["nullable", "multiline", "escaped", {"limit": 8}]
            },
            "columns": {
              "http_referer": "referer_nesting",
              "Country": {"type": "geo_country", "source": "remote_addr"},
              "upstream_status": {"type": "error", "error_type": "upstream_error"},
              "cache_status": {"type": "error"},
              "message": "message"
            }
          }
        }"#;
        let cols = schema_from_json(json).expect("schema");
        assert_eq!(cols.len(), 5);
        let by_name: HashMap<&str, &ColumnSpec> = cols.iter().map(|c| (c.column.as_str(), c)).collect();

        let country = by_name["country"];
        assert_eq!(country.source, "remote_addr");
        assert_eq!(country.field.leaf(), &Leaf::Geo(GeoProjection::Country));

        assert_eq!(by_name["upstream_status"].field.leaf(), &Leaf::Error("upstream_error".into()));
        assert_eq!(by_name["cache_status"].field.leaf(), &Leaf::Error("cache_status".into()));
        assert_eq!(by_name["http_referer"].source, "http_referer");

        let msg = &by_name["message"].field;
        assert_eq!(msg.steps().len(), 4);
        assert_eq!(msg.clean("line one\nline two"), Ok(Cleaned::Text("line one".into())));
        assert_eq!(msg.clean("undefined"), Ok(Cleaned::Null));
    }

    #[test]
    fn test_schema_errors() {
        let unknown = r#"{"log2db": {"columns": {"a": "no_such_type"}}}"#;
        assert!(matches!(schema_from_json(unknown), Err(SchemaError::UnknownFieldType { .. })));

        let bad_step = r#"{"log2db": {"field_types": {"t": ["explode"]}, "columns": {"a": "t"}}}"#;
        assert!(matches!(schema_from_json(bad_step), Err(SchemaError::InvalidStep(_))));

        let bad_regex = r#"{"log2db": {"field_types": {"t": [{"regex": "("}]}, "columns": {"a": "t"}}}"#;
        assert!(matches!(schema_from_json(bad_regex), Err(SchemaError::InvalidRegex { .. })));

        assert!(matches!(schema_from_json("{"), Err(SchemaError::Json(_))));
        assert!(matches!(load_schema_internal("/nonexistent/schema.json"), Err(SchemaError::Io { .. })));
    }

    #[test]
    fn test_ensure_schema_loaded_from_file() {
        let tmp = std::env::temp_dir().join("logclean_core_test_schema.json");
        fs::write(&tmp, r#"{"log2db": {"columns": {"ua": "user_agent", "ts": "timestamp"}}}"#).unwrap();
        let path = tmp.to_str().unwrap();

        let first = ensure_schema_loaded(path).expect("schema load");
        assert_eq!(first.columns.len(), 2);
        assert!(!first.has_geo_columns());
        let again = ensure_schema_loaded(path).expect("schema reuse");
        assert!(Arc::ptr_eq(&first, &again));
        assert!(cached_schema().is_some());

        // a rewritten file with a new mtime is picked up on the next call
        fs::write(&tmp, r#"{"log2db": {"columns": {"ua": "user_agent", "ts": "timestamp", "ip": "ipv4"}}}"#).unwrap();
        let file = fs::OpenOptions::new().write(true).open(&tmp).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000)).unwrap();
        let reloaded = ensure_schema_loaded(path).expect("schema reload");
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.columns.len(), 3);
    }
}
