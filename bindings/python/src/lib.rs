// PyO3 bindings for logclean_core
use once_cell::sync::Lazy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyModule};
use pyo3::IntoPyObjectExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use logclean_core as core;

use core::{Cleaned, FieldSpec, GeoEnricher, GeoLookup, LoadedSchema, RecordCleaner, SCHEMA_CACHE};

// Parallel iterators for batch cleaning
use rayon::prelude::*;

/// Records handed to one rayon task; each task owns its own geo memo slots.
const BATCH_CHUNK: usize = 512;

static GEO_DB: Lazy<RwLock<Option<Arc<dyn GeoLookup>>>> = Lazy::new(|| RwLock::new(None));

// Sequential callers share one cleaner so geo memoization carries across calls.
static RECORD_CLEANER: Lazy<Mutex<Option<RecordCleaner>>> = Lazy::new(|| Mutex::new(None));
static VALUE_ENRICHER: Lazy<Mutex<Option<GeoEnricher>>> = Lazy::new(|| Mutex::new(None));

fn to_py_err(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn current_schema() -> PyResult<Arc<LoadedSchema>> {
    core::cached_schema()
        .ok_or_else(|| PyValueError::new_err("No schema loaded. Call load_schema() first."))
}

fn current_geo() -> Option<Arc<dyn GeoLookup>> {
    GEO_DB.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn reset_cleaners() {
    *RECORD_CLEANER.lock().unwrap_or_else(|e| e.into_inner()) = None;
    *VALUE_ENRICHER.lock().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Run `f` with the shared cleaner, rebuilding it when the cached schema changed.
fn with_record_cleaner<T>(f: impl FnOnce(&mut RecordCleaner) -> PyResult<T>) -> PyResult<T> {
    let schema = current_schema()?;
    let mut guard = RECORD_CLEANER.lock().unwrap_or_else(|e| e.into_inner());
    let stale = guard.as_ref().map_or(true, |c| !Arc::ptr_eq(c.schema(), &schema));
    if stale {
        *guard = Some(RecordCleaner::new(schema, current_geo()));
    }
    match guard.as_mut() {
        Some(cleaner) => f(cleaner),
        None => Err(PyValueError::new_err("record cleaner unavailable")),
    }
}

fn py_to_raw(v: &Bound<'_, PyAny>) -> PyResult<Cleaned> {
    if v.is_none() {
        return Ok(Cleaned::Null);
    }
    if let Ok(s) = v.extract::<String>() {
        return Ok(Cleaned::Text(s));
    }
    // bool is an int subclass in Python; keep it out of the integer branch
    if let Ok(b) = v.downcast::<PyBool>() {
        return Ok(core::raw_from_bool(b.is_true()));
    }
    if let Ok(i) = v.extract::<i64>() {
        return Ok(Cleaned::Int(i));
    }
    if let Ok(f) = v.extract::<f64>() {
        return Ok(Cleaned::Float(f));
    }
    Ok(Cleaned::Text(v.str()?.to_string()))
}

fn dict_to_raw(d: &Bound<'_, PyDict>) -> PyResult<HashMap<String, Cleaned>> {
    let mut out = HashMap::with_capacity(d.len());
    for (k, v) in d.iter() {
        out.insert(k.extract::<String>()?, py_to_raw(&v)?);
    }
    Ok(out)
}

fn json_to_py(py: Python<'_>, v: &Value) -> PyResult<Py<PyAny>> {
    match v {
        Value::Null => Ok(py.None()),
        Value::Bool(b) => b.into_py_any(py),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_py_any(py)
            } else if let Some(u) = n.as_u64() {
                u.into_py_any(py)
            } else {
                n.as_f64().unwrap_or(f64::NAN).into_py_any(py)
            }
        }
        Value::String(s) => s.as_str().into_py_any(py),
        Value::Array(items) => {
            let elems = items.iter().map(|x| json_to_py(py, x)).collect::<PyResult<Vec<_>>>()?;
            Ok(PyList::new(py, elems)?.into_any().unbind())
        }
        Value::Object(map) => {
            let d = PyDict::new(py);
            for (k, x) in map {
                let key = pyo3::types::PyString::intern(py, k);
                d.set_item(key, json_to_py(py, x)?)?;
            }
            Ok(d.into_any().unbind())
        }
    }
}

/// Convert any cleaned output to Python through its serde JSON shape.
fn to_py<T: Serialize>(py: Python<'_>, v: &T) -> PyResult<Py<PyAny>> {
    let json = serde_json::to_value(v).map_err(to_py_err)?;
    json_to_py(py, &json)
}

fn load_schema_into_cache(schema_path: &str) -> Result<usize, core::SchemaError> {
    let loaded = core::load_schema_internal(schema_path)?;
    let columns = loaded.columns.len();
    let mut guard = SCHEMA_CACHE.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(Arc::new(loaded));
    Ok(columns)
}

fn load_geo_into_cache(path: &str) -> Result<usize, core::GeoDbError> {
    let db = core::StaticGeoDb::from_file(path)?;
    let entries = db.len();
    *GEO_DB.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(db));
    reset_cleaners();
    Ok(entries)
}

/// Load a column schema from a JSON file path. Returns True on success.
/// Raises ValueError if the file cannot be read, parsed, or names an unknown field type.
#[pyfunction]
#[pyo3(text_signature = "(schema_path)")]
fn load_schema(schema_path: &str) -> PyResult<bool> {
    load_schema_into_cache(schema_path).map_err(to_py_err)?;
    Ok(true)
}

/// Return current schema loader status and metadata.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn get_schema_status(py: Python) -> PyResult<Py<PyDict>> {
    use std::time::SystemTime;
    let d = PyDict::new(py);
    match core::cached_schema() {
        Some(ls) => {
            d.set_item("loaded", true)?;
            d.set_item("path", ls.path.clone())?;
            d.set_item("columns", ls.columns.iter().map(|c| c.column.as_str()).collect::<Vec<_>>())?;
            d.set_item("geo_columns", ls.has_geo_columns())?;
            match ls.mtime.map(|mt| mt.duration_since(SystemTime::UNIX_EPOCH)) {
                Some(Ok(dur)) => {
                    let ms: i64 = (dur.as_secs() as i64) * 1000 + (dur.subsec_millis() as i64);
                    d.set_item("mtime_epoch_ms", ms)?;
                }
                _ => d.set_item("mtime_epoch_ms", py.None())?,
            }
        }
        None => {
            d.set_item("loaded", false)?;
            d.set_item("path", py.None())?;
            d.set_item("columns", py.None())?;
            d.set_item("geo_columns", false)?;
            d.set_item("mtime_epoch_ms", py.None())?;
        }
    }
    d.set_item("geo_loaded", current_geo().is_some())?;
    Ok(d.unbind())
}

/// Load an offline geo table (`{"city": {...}, "isp": {...}, "connection_type": {...}}`)
/// used by geo_* field types. Returns the number of entries loaded.
#[pyfunction]
#[pyo3(text_signature = "(path)")]
fn load_geo_json(path: &str) -> PyResult<usize> {
    load_geo_into_cache(path).map_err(to_py_err)
}

/// Clean a single raw value with a built-in field type.
/// Raises ValueError when the value fails validation.
#[pyfunction]
#[pyo3(signature = (value, field_type, error_type=None))]
fn clean_value(
    py: Python,
    value: &Bound<'_, PyAny>,
    field_type: &str,
    error_type: Option<&str>,
) -> PyResult<Py<PyAny>> {
    let spec = FieldSpec::builtin(field_type, error_type)
        .ok_or_else(|| PyValueError::new_err(format!("Unknown field type: {}", field_type)))?;
    let raw = py_to_raw(value)?;
    let cleaned = if spec.is_geo() {
        let mut guard = VALUE_ENRICHER.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = current_geo().map(GeoEnricher::new);
        }
        spec.clean_with(raw, guard.as_mut())
    } else {
        spec.clean(raw)
    };
    to_py(py, &cleaned.map_err(to_py_err)?)
}

/// Clean one raw record (dict of column -> value) with the loaded schema.
/// Returns a dict of output column -> cleaned value.
#[pyfunction]
#[pyo3(text_signature = "(record)")]
fn clean_record(py: Python, record: &Bound<'_, PyDict>) -> PyResult<Py<PyAny>> {
    let raw = dict_to_raw(record)?;
    let cleaned = with_record_cleaner(|c| c.clean_record(&raw).map_err(to_py_err))?;
    to_py(py, &cleaned)
}

/// Clean one raw record with the schema at the given path. The schema is
/// loaded into the cache on first use and reloaded when the file's mtime changes.
#[pyfunction]
#[pyo3(text_signature = "(record, schema_path)")]
fn clean_record_with_schema(py: Python, record: &Bound<'_, PyDict>, schema_path: &str) -> PyResult<Py<PyAny>> {
    core::ensure_schema_loaded(schema_path).map_err(to_py_err)?;
    clean_record(py, record)
}

/// Clean a batch of raw records in parallel and return cleaned dicts in input order.
/// Python objects are converted up front; cleaning runs in Rayon tasks that
/// each own a cleaner over the shared geo database.
#[pyfunction]
#[pyo3(text_signature = "(records)")]
fn clean_records_batch(py: Python, records: &Bound<'_, PyList>) -> PyResult<Vec<Py<PyAny>>> {
    let schema = current_schema()?;
    let geo = current_geo();
    let raws: Vec<HashMap<String, Cleaned>> = records
        .iter()
        .map(|item| dict_to_raw(item.downcast::<PyDict>()?))
        .collect::<PyResult<_>>()?;

    let chunks: Vec<Result<Vec<BTreeMap<String, Cleaned>>, core::RecordError>> = raws
        .par_chunks(BATCH_CHUNK)
        .map(|chunk| {
            let mut cleaner = RecordCleaner::new(schema.clone(), geo.clone());
            chunk.iter().map(|r| cleaner.clean_record(r)).collect::<Result<Vec<_>, _>>()
        })
        .collect();

    let mut out: Vec<Py<PyAny>> = Vec::with_capacity(raws.len());
    for chunk in chunks {
        for rec in chunk.map_err(to_py_err)? {
            out.push(to_py(py, &rec)?);
        }
    }
    Ok(out)
}

/// Clean an NDJSON file of raw records into an NDJSON file of cleaned records.
/// Returns the number of records written.
#[pyfunction]
#[pyo3(text_signature = "(input_path, output_path)")]
fn clean_file_to_ndjson(input_path: &str, output_path: &str) -> PyResult<usize> {
    use std::io::{BufReader, BufWriter};
    let infile = std::fs::File::open(input_path).map_err(to_py_err)?;
    let outfile = std::fs::File::create(output_path).map_err(to_py_err)?;
    let reader = BufReader::new(infile);
    let writer = BufWriter::new(outfile);
    let count = with_record_cleaner(|c| core::clean_ndjson(c, reader, writer).map_err(to_py_err))?;
    info!(input_path, output_path, count, "cleaned ndjson file");
    Ok(count)
}

/// List the built-in field type names accepted by clean_value() and schemas.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn list_field_types() -> PyResult<Vec<&'static str>> {
    Ok(core::BUILTIN_FIELD_TYPES.to_vec())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    if let Ok(filter) = std::env::var("LOGCLEAN_LOG") {
        // a host application may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[pymodule]
#[pyo3(module = "logclean_rs")]
fn logclean_rs(_py: Python, m: &Bound<PyModule>) -> PyResult<()> {
    m.add(
        "__doc__",
        "Web-log field cleaning library.\n\n\
        Features:\n\
        - Schema-driven record cleaning (column -> field type)\n\
        - Referer, error payload and geolocation field parsers\n\
        - Fast Rust core with Python bindings\n\n\
        Quick start:\n\
        >>> import logclean_rs as lc\n\
        >>> lc.load_schema('path/to/schema.json')\n\
        >>> lc.clean_record({'remote_addr': '1.2.3.4', 'http_referer': 'example.com/x'})\n\
        >>> lc.clean_value('undefined', 'nullable_int')",
    )?;

    init_tracing();

    m.add_function(wrap_pyfunction!(load_schema, m)?)?;
    m.add_function(wrap_pyfunction!(get_schema_status, m)?)?;
    m.add_function(wrap_pyfunction!(load_geo_json, m)?)?;
    m.add_function(wrap_pyfunction!(clean_value, m)?)?;
    m.add_function(wrap_pyfunction!(clean_record, m)?)?;
    m.add_function(wrap_pyfunction!(clean_record_with_schema, m)?)?;
    m.add_function(wrap_pyfunction!(clean_records_batch, m)?)?;
    m.add_function(wrap_pyfunction!(clean_file_to_ndjson, m)?)?;
    m.add_function(wrap_pyfunction!(list_field_types, m)?)?;

    // Optional: preload schema and geo table from env vars for a faster startup in hot paths.
    if let Ok(path) = std::env::var("LOGCLEAN_PRELOAD_SCHEMA") {
        if let Err(e) = load_schema_into_cache(&path) {
            warn!(path = path.as_str(), error = %e, "schema preload failed");
        }
    }
    if let Ok(path) = std::env::var("LOGCLEAN_GEO_JSON") {
        if let Err(e) = load_geo_into_cache(&path) {
            warn!(path = path.as_str(), error = %e, "geo table preload failed");
        }
    }

    Ok(())
}
