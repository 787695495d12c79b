// record.rs: clean a raw column->value map using a loaded schema
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::RecordError;
use crate::geo::{GeoEnricher, GeoLookup};
use crate::schema::LoadedSchema;
use crate::value::Cleaned;

/// Applies every column of a schema to raw records. Holds the geo memo slots,
/// so each worker needs its own cleaner.
#[derive(Debug)]
pub struct RecordCleaner {
    schema: Arc<LoadedSchema>,
    geo: Option<GeoEnricher>,
}

impl RecordCleaner {
    pub fn new(schema: Arc<LoadedSchema>, geo: Option<Arc<dyn GeoLookup>>) -> Self {
        Self { schema, geo: geo.map(GeoEnricher::new) }
    }

    pub fn schema(&self) -> &Arc<LoadedSchema> {
        &self.schema
    }

    pub fn geo_lookups(&self) -> u64 {
        self.geo.as_ref().map_or(0, GeoEnricher::lookups)
    }

    pub fn clean_record<V>(&mut self, record: &HashMap<String, V>) -> Result<BTreeMap<String, Cleaned>, RecordError>
    where
        V: Clone + Into<Cleaned>,
    {
        let mut out = BTreeMap::new();
        for col in self.schema.columns.iter() {
            let raw: Cleaned = record.get(&col.source).cloned().map_or(Cleaned::Null, Into::into);
            let cleaned = col
                .field
                .clean_with(raw, self.geo.as_mut())
                .map_err(|e| RecordError::field(col.column.as_str(), e))?;
            out.insert(col.column.clone(), cleaned);
        }
        Ok(out)
    }
}

/// Booleans enter pipelines as their text form, whichever surface they came from.
pub fn raw_from_bool(b: bool) -> Cleaned {
    Cleaned::Text(b.to_string())
}

/// Raw JSON scalars as cleaner input. Nested values are passed as their JSON text.
pub fn raw_from_json(v: Value) -> Cleaned {
    match v {
        Value::Null => Cleaned::Null,
        Value::String(s) => Cleaned::Text(s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Cleaned::Int(i),
            None => n.as_f64().map_or(Cleaned::Null, Cleaned::Float),
        },
        Value::Bool(b) => raw_from_bool(b),
        other => Cleaned::Text(other.to_string()),
    }
}

/// Read one raw JSON object per line and write one cleaned object per line.
/// Blank lines are skipped. Returns the number of records written.
pub fn clean_ndjson<R: BufRead, W: Write>(
    cleaner: &mut RecordCleaner,
    reader: R,
    mut writer: W,
) -> Result<usize, RecordError> {
    let mut written = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: HashMap<String, Value> =
            serde_json::from_str(&line).map_err(|source| RecordError::Json { line: idx + 1, source })?;
        let record: HashMap<String, Cleaned> = raw.into_iter().map(|(k, v)| (k, raw_from_json(v))).collect();
        let cleaned = cleaner.clean_record(&record)?;
        serde_json::to_writer(&mut writer, &cleaned).map_err(|source| RecordError::Json { line: idx + 1, source })?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    debug!(written, geo_lookups = cleaner.geo_lookups(), "cleaned ndjson stream");
    Ok(written)
}
